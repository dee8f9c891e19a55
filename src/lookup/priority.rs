// Copyright 2022 Oxide Computer Company

//! Shared scan-and-rank logic behind [`super::TernaryLookup`] and
//! [`super::RangeLookup`]: both match types select, among all entries whose
//! per-field keys match the selector, the one with the highest priority,
//! breaking ties by insertion order. This is a direct generalization of
//! `lang/p4rs/src/table.rs`'s `Table::match_selector` +
//! `sort_entries_by_priority`, which already implement exactly this scan for
//! a single fixed keyset shape.

use crate::handle::EntryHandle;
use crate::key::{keyset_matches, MatchKey, Selector};

struct Record {
    handle: EntryHandle,
    key: MatchKey,
    priority: u32,
    seq: u64,
}

#[derive(Default)]
pub(super) struct PriorityScan {
    entries: Vec<Record>,
}

impl PriorityScan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, handle: EntryHandle, key: MatchKey, priority: u32, seq: u64) {
        self.entries.push(Record {
            handle,
            key,
            priority,
            seq,
        });
    }

    pub fn remove(&mut self, handle: EntryHandle) {
        self.entries.retain(|e| e.handle != handle);
    }

    pub fn find_conflict(&self, key: &MatchKey, priority: u32) -> Option<EntryHandle> {
        self.entries
            .iter()
            .find(|e| &e.key == key && e.priority == priority)
            .map(|e| e.handle)
    }

    pub fn find_exact(&self, key: &MatchKey, priority: u32) -> Option<EntryHandle> {
        self.find_conflict(key, priority)
    }

    pub fn classify(&self, selector: &Selector) -> Option<EntryHandle> {
        self.entries
            .iter()
            .filter(|e| keyset_matches(selector, &e.key))
            // distilled spec I4: highest priority wins; ties broken by
            // earliest insertion (lowest sequence number).
            .max_by_key(|e| (e.priority, std::cmp::Reverse(e.seq)))
            .map(|e| e.handle)
    }
}
