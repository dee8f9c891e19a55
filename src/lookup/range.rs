// Copyright 2022 Oxide Computer Company

use super::priority::PriorityScan;
use super::LookupStructure;
use crate::handle::EntryHandle;
use crate::key::{MatchKey, Selector};

/// Range match: like ternary, intervals may overlap, so classification is
/// priority-ranked the same way. Range containment itself is handled by
/// `key_matches` on `Key::Range`; this structure only ranks the candidates
/// it returns.
#[derive(Default)]
pub struct RangeLookup {
    scan: PriorityScan,
}

impl RangeLookup {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LookupStructure for RangeLookup {
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
    use crate::key::{BigUintKey, Key};
    use num::bigint::BigUint;

    fn bk(v: u32) -> BigUintKey {
        BigUintKey {
            value: v.into(),
            width: 16,
        }
    }

    fn rk(lo: u32, hi: u32) -> MatchKey {
        vec![Key::Range(bk(lo), bk(hi))]
    }

    #[test]
    fn selector_inside_range_hits() {
        let mut lu = RangeLookup::new();
        lu.insert(1, rk(10, 20), 0, 0);
        assert_eq!(lu.classify(&vec![BigUint::from(15u32)]), Some(1));
        assert_eq!(lu.classify(&vec![BigUint::from(25u32)]), None);
    }

    #[test]
    fn overlapping_ranges_rank_by_priority() {
        let mut lu = RangeLookup::new();
        lu.insert(1, rk(0, 100), 1, 0);
        lu.insert(2, rk(10, 20), 9, 1);
        assert_eq!(lu.classify(&vec![BigUint::from(15u32)]), Some(2));
    }
}
