// Copyright 2022 Oxide Computer Company

//! The match unit (C1): owns entries keyed by match-key, hands back a handle
//! and value on hit, and carries each entry's metadata (counter, optional
//! direct meter, TTL). Parameterized over the stored value type `V`
//! (`ActionEntry` for direct tables, `IndirectIndex` for indirect/indirect-WS
//! ones) and, via the [`crate::lookup`] factory, over the match type's
//! lookup strategy.
//!
//! Storage is a slab: a `Vec<Slot<V>>` plus a free list of reclaimed indices,
//! so a deleted entry's index can be reused without disturbing the handles of
//! entries that remain live. Each slot carries its own generation counter,
//! bumped on every delete, so a reissued handle is never equal to the one it
//! replaced (distilled spec I1, I2's handle half).

use std::sync::Arc;

use crate::control_flow::ObjectCatalog;
use crate::error::{MatchErrorCode, SerializationError};
use crate::handle::{entry_index, generation, pack_handle, EntryHandle};
use crate::key::{MatchKey, Selector};
use crate::lookup::{self, LookupStructure};
use crate::meta::EntryMeta;
use crate::meter::Meter;
use crate::serial::{EntryValue, LineReader};

struct Slot<V> {
    value: Option<V>,
    key: Option<MatchKey>,
    priority: u32,
    generation: u8,
    meta: EntryMeta,
}

impl<V> Slot<V> {
    fn empty() -> Self {
        Self {
            value: None,
            key: None,
            priority: 0,
            generation: 0,
            meta: EntryMeta::new(),
        }
    }
}

pub struct MatchUnit<V> {
    match_type: String,
    size: usize,
    slots: Vec<Slot<V>>,
    free: Vec<u32>,
    classifier: Box<dyn LookupStructure>,
    meters: Option<Vec<Arc<dyn Meter>>>,
    next_seq: u64,
    num_entries: usize,
    /// The keyset shape (field count) established by the first entry ever
    /// admitted; every later `add_entry` must match it. `None` until the
    /// first admission. All entries of one match unit share a single keyset
    /// shape in the source this was distilled from (one compiled table has
    /// one fixed set of match fields); `BAD_MATCH_KEY` is this crate's
    /// runtime check for a caller that got that shape wrong.
    key_shape: Option<usize>,
}

impl<V: EntryValue> MatchUnit<V> {
    pub fn new(match_type: &str, size: usize) -> Self {
        Self {
            match_type: match_type.to_string(),
            size,
            slots: Vec::new(),
            free: Vec::new(),
            classifier: lookup::create(match_type),
            meters: None,
            next_seq: 0,
            num_entries: 0,
            key_shape: None,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn num_entries(&self) -> usize {
        self.num_entries
    }

    fn validate(&self, handle: EntryHandle) -> Result<usize, MatchErrorCode> {
        let index = entry_index(handle) as usize;
        let slot = self.slots.get(index).ok_or(MatchErrorCode::InvalidHandle)?;
        if slot.value.is_none() {
            return Err(MatchErrorCode::InvalidHandle);
        }
        if slot.generation != generation(handle) {
            return Err(MatchErrorCode::ExpiredHandle);
        }
        Ok(index)
    }

    /// Admits `key → value` at `priority`, rejecting exact duplicates (I6)
    /// or exact `(key, mask, priority)` overlaps (ternary/range), per the
    /// per-match-type conflict rule each [`LookupStructure`] enforces.
    /// `BAD_MATCH_KEY` if `key`'s field count doesn't match the keyset shape
    /// established by this unit's first entry.
    pub fn add_entry(
        &mut self,
        key: MatchKey,
        value: V,
        priority: u32,
    ) -> Result<EntryHandle, MatchErrorCode> {
        match self.key_shape {
            Some(shape) if shape != key.len() => return Err(MatchErrorCode::BadMatchKey),
            Some(_) => {}
            None => self.key_shape = Some(key.len()),
        }
        if self.classifier.find_conflict(&key, priority).is_some() {
            return Err(MatchErrorCode::DuplicateEntry);
        }
        let index = match self.free.pop() {
            Some(i) => i,
            None => {
                if self.slots.len() >= self.size {
                    return Err(MatchErrorCode::TableFull);
                }
                self.slots.push(Slot::empty());
                (self.slots.len() - 1) as u32
            }
        };
        let seq = self.next_seq;
        self.next_seq += 1;
        let slot_generation = self.slots[index as usize].generation;
        let handle = pack_handle(index, slot_generation);
        self.classifier.insert(handle, key.clone(), priority, seq);
        let slot = &mut self.slots[index as usize];
        slot.value = Some(value);
        slot.key = Some(key);
        slot.priority = priority;
        slot.meta = EntryMeta::new();
        self.num_entries += 1;
        Ok(handle)
    }

    /// Replaces the value of a live entry in place; `EntryMeta` (counter,
    /// TTL, last-hit timestamp) is preserved.
    pub fn modify_entry(&mut self, handle: EntryHandle, value: V) -> Result<(), MatchErrorCode> {
        let index = self.validate(handle)?;
        self.slots[index].value = Some(value);
        Ok(())
    }

    pub fn delete_entry(&mut self, handle: EntryHandle) -> Result<(), MatchErrorCode> {
        let index = self.validate(handle)?;
        self.classifier.remove(handle);
        let slot = &mut self.slots[index];
        slot.value = None;
        slot.key = None;
        slot.meta = EntryMeta::new();
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index as u32);
        self.num_entries -= 1;
        Ok(())
    }

    /// Pure read: classify `selector` and hand back the winning entry, if
    /// any. Never fails — a miss is `None`, not an error.
    pub fn lookup(&self, selector: &Selector) -> Option<(EntryHandle, &V)> {
        let handle = self.classifier.classify(selector)?;
        let index = entry_index(handle) as usize;
        let value = self.slots.get(index)?.value.as_ref()?;
        Some((handle, value))
    }

    /// Inverse of `add_entry` by key equality (and, for ternary/range,
    /// priority).
    pub fn retrieve_handle(
        &self,
        key: &MatchKey,
        priority: u32,
    ) -> Result<EntryHandle, MatchErrorCode> {
        self.classifier
            .find_exact(key, priority)
            .ok_or(MatchErrorCode::InvalidHandle)
    }

    pub fn get_entry(&self, handle: EntryHandle) -> Result<(&MatchKey, &V, u32), MatchErrorCode> {
        let index = self.validate(handle)?;
        let slot = &self.slots[index];
        Ok((
            slot.key.as_ref().expect("validated slot has a key"),
            slot.value.as_ref().expect("validated slot has a value"),
            slot.priority,
        ))
    }

    pub fn get_value(&self, handle: EntryHandle) -> Result<&V, MatchErrorCode> {
        Ok(self.get_entry(handle)?.1)
    }

    pub fn dump_match_entry(&self, handle: EntryHandle) -> Result<String, MatchErrorCode> {
        let (key, value, priority) = self.get_entry(handle)?;
        let mut out = format!("{key:?} (priority {priority}) -> ");
        value.serialize(&mut out);
        Ok(out)
    }

    pub fn get_entry_meta(&self, handle: EntryHandle) -> Result<&EntryMeta, MatchErrorCode> {
        let index = self.validate(handle)?;
        Ok(&self.slots[index].meta)
    }

    pub fn get_meter(&self, handle: EntryHandle) -> Result<Arc<dyn Meter>, MatchErrorCode> {
        let index = self.validate(handle)?;
        let meters = self.meters.as_ref().ok_or(MatchErrorCode::MetersDisabled)?;
        meters
            .get(index)
            .cloned()
            .ok_or(MatchErrorCode::MetersDisabled)
    }

    pub fn set_entry_ttl(&mut self, handle: EntryHandle, timeout_ms: u32) -> Result<(), MatchErrorCode> {
        let index = self.validate(handle)?;
        self.slots[index].meta.set_timeout_ms(timeout_ms);
        Ok(())
    }

    /// Appends handles of entries whose ageing clock has expired. Read-only:
    /// the caller (the table's ageing façade, ultimately the controller)
    /// decides whether and when to delete.
    pub fn sweep_entries(&self, now_ms: u64) -> Vec<EntryHandle> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.value.is_some() && slot.meta.is_expired(now_ms))
            .map(|(index, slot)| pack_handle(index as u32, slot.generation))
            .collect()
    }

    /// Binds a per-entry meter array sized to this unit's capacity. The
    /// table's `with_meters` flag gates whether this is ever called.
    pub fn set_direct_meters(&mut self, meters: Vec<Arc<dyn Meter>>) -> Result<(), MatchErrorCode> {
        if meters.len() != self.size {
            return Err(MatchErrorCode::Error);
        }
        self.meters = Some(meters);
        Ok(())
    }

    pub fn reset_counters(&self) {
        for slot in &self.slots {
            slot.meta.counter.reset();
        }
    }

    pub fn reset_state(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.classifier = lookup::create(&self.match_type);
        self.meters = None;
        self.next_seq = 0;
        self.num_entries = 0;
        self.key_shape = None;
    }

    /// Stable iteration over currently-live handles, in slot order. The
    /// table's `handles_begin`/`handles_end` (C8) expose this directly.
    pub fn handles(&self) -> impl Iterator<Item = EntryHandle> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.value.is_some())
            .map(|(index, slot)| pack_handle(index as u32, slot.generation))
    }

    pub fn serialize(&self, out: &mut String) {
        out.push_str(&format!("{}\n", self.num_entries));
        for handle in self.handles() {
            let (key, value, priority) = self
                .get_entry(handle)
                .expect("handle came from our own live iterator");
            out.push_str(
                &serde_json::to_string(key).expect("MatchKey serializes to JSON without error"),
            );
            out.push('\n');
            out.push_str(&format!("{priority}\n"));
            value.serialize(out);
        }
    }

    pub fn deserialize(
        &mut self,
        reader: &mut LineReader<'_>,
        catalog: &dyn ObjectCatalog,
    ) -> Result<(), SerializationError> {
        let count = reader.next_u32()?;
        for _ in 0..count {
            let key_line = reader.next_line()?;
            let key: MatchKey = serde_json::from_str(key_line)
                .map_err(|e| SerializationError::Malformed(e.to_string()))?;
            let priority = reader.next_u32()?;
            let value = V::deserialize(reader, catalog)?;
            self.add_entry(key, value, priority)
                .map_err(|_| SerializationError::Malformed("duplicate entry on restore".into()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionData, ActionEntry, ActionFnEntry, EmptyActionFn};
    use crate::key::{BigUintKey, Key};
    use num::bigint::BigUint;

    fn ek(v: u32) -> MatchKey {
        vec![Key::Exact(BigUintKey {
            value: v.into(),
            width: 8,
        })]
    }

    fn entry() -> ActionEntry {
        ActionEntry::new(
            ActionFnEntry::new(Arc::new(EmptyActionFn), ActionData::default()),
            None,
        )
    }

    #[test]
    fn add_then_lookup_hits() {
        let mut mu: MatchUnit<ActionEntry> = MatchUnit::new("exact", 4);
        let h = mu.add_entry(ek(10), entry(), 0).unwrap();
        let (found, _) = mu.lookup(&vec![BigUint::from(10u32)]).unwrap();
        assert_eq!(found, h);
    }

    #[test]
    fn mismatched_key_shape_is_rejected() {
        let mut mu: MatchUnit<ActionEntry> = MatchUnit::new("exact", 4);
        mu.add_entry(ek(10), entry(), 0).unwrap();
        let two_field_key = vec![
            Key::Exact(BigUintKey {
                value: 11u32.into(),
                width: 8,
            }),
            Key::Exact(BigUintKey {
                value: 12u32.into(),
                width: 8,
            }),
        ];
        assert_eq!(
            mu.add_entry(two_field_key, entry(), 0).unwrap_err(),
            MatchErrorCode::BadMatchKey
        );
    }

    #[test]
    fn duplicate_exact_key_is_rejected() {
        let mut mu: MatchUnit<ActionEntry> = MatchUnit::new("exact", 4);
        mu.add_entry(ek(10), entry(), 0).unwrap();
        assert_eq!(
            mu.add_entry(ek(10), entry(), 0).unwrap_err(),
            MatchErrorCode::DuplicateEntry
        );
    }

    #[test]
    fn full_table_rejects_additions() {
        let mut mu: MatchUnit<ActionEntry> = MatchUnit::new("exact", 1);
        mu.add_entry(ek(1), entry(), 0).unwrap();
        assert_eq!(
            mu.add_entry(ek(2), entry(), 0).unwrap_err(),
            MatchErrorCode::TableFull
        );
    }

    #[test]
    fn delete_bumps_generation_on_reissue() {
        let mut mu: MatchUnit<ActionEntry> = MatchUnit::new("exact", 1);
        let h0 = mu.add_entry(ek(1), entry(), 0).unwrap();
        mu.delete_entry(h0).unwrap();
        assert_eq!(mu.get_entry(h0).unwrap_err(), MatchErrorCode::InvalidHandle);
        let h1 = mu.add_entry(ek(2), entry(), 0).unwrap();
        assert_eq!(entry_index(h0), entry_index(h1));
        assert_ne!(h0, h1);
    }

    #[test]
    fn expired_handle_distinct_from_invalid() {
        let mut mu: MatchUnit<ActionEntry> = MatchUnit::new("exact", 1);
        let h0 = mu.add_entry(ek(1), entry(), 0).unwrap();
        mu.delete_entry(h0).unwrap();
        mu.add_entry(ek(2), entry(), 0).unwrap();
        assert_eq!(mu.get_entry(h0).unwrap_err(), MatchErrorCode::ExpiredHandle);
    }

    #[test]
    fn sweep_reports_only_expired_entries() {
        let mut mu: MatchUnit<ActionEntry> = MatchUnit::new("exact", 2);
        let h = mu.add_entry(ek(1), entry(), 0).unwrap();
        mu.set_entry_ttl(h, 100).unwrap();
        assert!(mu.sweep_entries(50).is_empty());
        mu.get_entry_meta(h).unwrap().touch(0);
        assert_eq!(mu.sweep_entries(200), vec![h]);
        mu.delete_entry(h).unwrap();
        assert!(mu.sweep_entries(200).is_empty());
    }
}
