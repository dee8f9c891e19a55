// Copyright 2022 Oxide Computer Company

use std::collections::HashMap;

use num::bigint::BigUint;

use super::LookupStructure;
use crate::handle::EntryHandle;
use crate::key::{Key, MatchKey, Selector};

fn project(key: &MatchKey) -> Vec<BigUint> {
    key.iter()
        .map(|k| match k {
            Key::Exact(x) => x.value.clone(),
            other => panic!("exact match unit given a non-exact key field: {other:?}"),
        })
        .collect()
}

/// Exact match: O(1) lookup by hashing the projected field values. At most
/// one entry may match a given key (distilled spec I6), so this is a
/// straightforward `HashMap`, matching the table's own documented note that
/// the match-unit is free to choose a hash table where the semantics allow
/// it.
#[derive(Default)]
pub struct ExactLookup {
    by_value: HashMap<Vec<BigUint>, EntryHandle>,
}

impl ExactLookup {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LookupStructure for ExactLookup {
    fn insert(&mut self, handle: EntryHandle, key: MatchKey, _priority: u32, _seq: u64) {
        self.by_value.insert(project(&key), handle);
    }

    fn remove(&mut self, handle: EntryHandle) {
        self.by_value.retain(|_, h| *h != handle);
    }

    fn find_conflict(&self, key: &MatchKey, _priority: u32) -> Option<EntryHandle> {
        self.by_value.get(&project(key)).copied()
    }

    fn find_exact(&self, key: &MatchKey, _priority: u32) -> Option<EntryHandle> {
        self.by_value.get(&project(key)).copied()
    }

    fn classify(&self, selector: &Selector) -> Option<EntryHandle> {
        self.by_value.get(selector).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::BigUintKey;

    fn ek(v: u32) -> MatchKey {
        vec![Key::Exact(BigUintKey {
            value: v.into(),
            width: 4,
        })]
    }

    #[test]
    fn duplicate_key_is_a_conflict() {
        let mut lu = ExactLookup::new();
        lu.insert(0, ek(10), 0, 0);
        assert_eq!(lu.find_conflict(&ek(10), 0), Some(0));
        assert_eq!(lu.find_conflict(&ek(11), 0), None);
    }

    #[test]
    fn classify_hits_on_value_equality() {
        let mut lu = ExactLookup::new();
        lu.insert(5, ek(0x0a), 0, 0);
        assert_eq!(lu.classify(&vec![BigUint::from(0x0au32)]), Some(5));
        assert_eq!(lu.classify(&vec![BigUint::from(0x0bu32)]), None);
    }

    #[test]
    fn remove_forgets_the_handle() {
        let mut lu = ExactLookup::new();
        lu.insert(1, ek(1), 0, 0);
        lu.remove(1);
        assert_eq!(lu.classify(&vec![BigUint::from(1u32)]), None);
    }
}
