// Copyright 2022 Oxide Computer Company

use super::priority::PriorityScan;
use super::LookupStructure;
use crate::handle::EntryHandle;
use crate::key::{MatchKey, Selector};

/// Ternary match: any number of entries may match a given selector
/// (`Ternary::Masked`/`Ternary::DontCare` fields overlap freely), so the
/// classifier must rank every match by priority and hand back the winner.
/// See [`super::priority::PriorityScan`] for the shared scan.
#[derive(Default)]
pub struct TernaryLookup {
    scan: PriorityScan,
}

impl TernaryLookup {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LookupStructure for TernaryLookup {
    fn insert(&mut self, handle: EntryHandle, key: MatchKey, priority: u32, seq: u64) {
        self.scan.insert(handle, key, priority, seq);
    }

    fn remove(&mut self, handle: EntryHandle) {
        self.scan.remove(handle);
    }

    fn find_conflict(&self, key: &MatchKey, priority: u32) -> Option<EntryHandle> {
        self.scan.find_conflict(key, priority)
    }

    fn find_exact(&self, key: &MatchKey, priority: u32) -> Option<EntryHandle> {
        self.scan.find_exact(key, priority)
    }

    fn classify(&self, selector: &Selector) -> Option<EntryHandle> {
        self.scan.classify(selector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{Key, Ternary};
    use num::bigint::BigUint;

    fn tk(value: u32, mask: u32) -> MatchKey {
        vec![Key::Ternary(Ternary::Masked(
            BigUint::from(value),
            BigUint::from(mask),
            8,
        ))]
    }

    #[test]
    fn highest_priority_wins_on_overlap() {
        let mut lu = TernaryLookup::new();
        // both entries match selector 0x0a: low priority is a broader mask
        lu.insert(1, tk(0x00, 0x00), 1, 0);
        lu.insert(2, tk(0x0a, 0xff), 5, 1);
        assert_eq!(lu.classify(&vec![BigUint::from(0x0au32)]), Some(2));
    }

    #[test]
    fn equal_priority_breaks_on_insertion_order() {
        let mut lu = TernaryLookup::new();
        lu.insert(1, tk(0x00, 0x00), 3, 0);
        lu.insert(2, tk(0x00, 0x00), 3, 1);
        // both match everything at equal priority; earliest insertion wins
        assert_eq!(lu.classify(&vec![BigUint::from(0x0au32)]), Some(1));
    }

    #[test]
    fn conflict_requires_same_key_and_priority() {
        let mut lu = TernaryLookup::new();
        lu.insert(1, tk(0x0a, 0xff), 2, 0);
        assert_eq!(lu.find_conflict(&tk(0x0a, 0xff), 2), Some(1));
        assert_eq!(lu.find_conflict(&tk(0x0a, 0xff), 3), None);
    }
}
