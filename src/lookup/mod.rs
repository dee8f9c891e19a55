// Copyright 2022 Oxide Computer Company

//! Lookup structures.
//!
//! The distilled spec treats the lookup-structure implementation itself —
//! hash table, trie, ternary/range tree — as an external, pluggable concern:
//! "the match-unit implementation is free to choose hash, trie, or linear
//! sweep so long as [the per-match-type] semantics hold." This module
//! specifies the [`LookupStructure`] seam plus one concrete implementation
//! per match type, built the same way `lang/p4rs/src/table.rs`'s own
//! `Table::match_selector` already does it: a direct, brute-force-where-
//! necessary matcher that is obviously correct, with indexing (a `HashMap`)
//! used only where the match semantics make it free (exact).

mod exact;
mod lpm;
mod priority;
mod range;
mod ternary;

pub use exact::ExactLookup;
pub use lpm::LpmLookup;
pub use range::RangeLookup;
pub use ternary::TernaryLookup;

use crate::handle::EntryHandle;
use crate::key::{MatchKey, Selector};

/// A classifier over one match unit's installed entries. Implementations
/// own their own copy of each entry's key (the same way a real hash table or
/// trie would need to anyway) — the match unit itself is the source of
/// truth for the value and metadata associated with a handle.
pub trait LookupStructure: Send + Sync {
    /// Record a new entry. `seq` is a monotonically increasing insertion
    /// sequence number, used by ternary/range to break priority ties in
    /// insertion order (distilled spec I4).
    fn insert(&mut self, handle: EntryHandle, key: MatchKey, priority: u32, seq: u64);

    fn remove(&mut self, handle: EntryHandle);

    /// An existing entry that conflicts with `(key, priority)` per this
    /// match type's admission rule (exact: same key; ternary/range: same
    /// key+mask+priority; LPM: same prefix).
    fn find_conflict(&self, key: &MatchKey, priority: u32) -> Option<EntryHandle>;

    /// The handle whose key equals `key` (and, for ternary/range, whose
    /// priority equals `priority`) — the inverse of `insert`, used by
    /// `retrieve_handle`.
    fn find_exact(&self, key: &MatchKey, priority: u32) -> Option<EntryHandle>;

    /// Classify a packet-derived selector to the winning handle, applying
    /// this match type's priority/ordering semantics.
    fn classify(&self, selector: &Selector) -> Option<EntryHandle>;
}

/// Instantiate the lookup structure named by a `match_type` string
/// (`"exact" | "lpm" | "ternary" | "range"`), mirroring the anonymous-
/// namespace `create_match_unit` factory helper in the source this was
/// distilled from. An unrecognized match type is a programming error.
pub fn create(match_type: &str) -> Box<dyn LookupStructure> {
    match match_type {
        "exact" => Box::new(ExactLookup::new()),
        "lpm" => Box::new(LpmLookup::new()),
        "ternary" => Box::new(TernaryLookup::new()),
        "range" => Box::new(RangeLookup::new()),
        other => panic!("invalid match type: {other}"),
    }
}
