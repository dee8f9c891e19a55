// Copyright 2022 Oxide Computer Company

use crate::handle::EntryHandle;
use crate::key::{keyset_matches, lpm_len, MatchKey, Selector};

use super::LookupStructure;

struct Record {
    handle: EntryHandle,
    key: MatchKey,
    priority: u32,
    seq: u64,
}

/// Longest-prefix match: among entries whose non-LPM fields also match, the
/// one with the longest LPM prefix wins regardless of priority (distilled
/// spec's match-type table: "longest prefix wins; priority ignored").
/// Entries tied on prefix length fall back to priority, then insertion
/// order, the same two-stage `prune_entries_by_lpm` then
/// `sort_entries_by_priority` pipeline `lang/p4rs/src/table.rs` runs.
#[derive(Default)]
pub struct LpmLookup {
    entries: Vec<Record>,
}

impl LpmLookup {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LookupStructure for LpmLookup {
    fn insert(&mut self, handle: EntryHandle, key: MatchKey, priority: u32, seq: u64) {
        self.entries.push(Record {
            handle,
            key,
            priority,
            seq,
        });
    }

    fn remove(&mut self, handle: EntryHandle) {
        self.entries.retain(|e| e.handle != handle);
    }

    fn find_conflict(&self, key: &MatchKey, _priority: u32) -> Option<EntryHandle> {
        self.entries.iter().find(|e| &e.key == key).map(|e| e.handle)
    }

    fn find_exact(&self, key: &MatchKey, _priority: u32) -> Option<EntryHandle> {
        self.find_conflict(key, 0)
    }

    fn classify(&self, selector: &Selector) -> Option<EntryHandle> {
        self.entries
            .iter()
            .filter(|e| keyset_matches(selector, &e.key))
            .max_by_key(|e| {
                (
                    lpm_len(&e.key).unwrap_or(0),
                    e.priority,
                    std::cmp::Reverse(e.seq),
                )
            })
            .map(|e| e.handle)
    }
}
