// Copyright 2022 Oxide Computer Company

//! The indirect match table (C5): value type is an `IndirectIndex` into a
//! shared `ActionProfile`. Every lookup — hit or default — re-resolves
//! through the profile and rewrites `next_node` for this table's own graph,
//! because two tables may share one profile but must each impose their own
//! next-node graph (distilled spec §9).

use std::collections::HashMap;
use std::sync::Arc;

use slog::{debug, Logger};

use crate::action::{ActionEntry, ActionId};
use crate::control_flow::ControlFlowNode;
use crate::error::MatchErrorCode;
use crate::handle::EntryHandle;
use crate::key::{MatchKey, Selector};
use crate::packet::Packet;
use crate::profile::{ActionProfile, IndirectIndex, MbrHandle};

use super::{get_next_node, MatchTableAbstract, ValueResolver};

struct IndirectResolver {
    profile: Arc<dyn ActionProfile>,
}

impl ValueResolver<IndirectIndex> for IndirectResolver {
    fn resolve(
        &self,
        value: &IndirectIndex,
        pkt: &dyn Packet,
        next_nodes: &HashMap<ActionId, Arc<ControlFlowNode>>,
        next_node_hit: Option<&Arc<ControlFlowNode>>,
    ) -> ActionEntry {
        let mut entry = self.profile.lookup(pkt, *value);
        entry.next_node = Some(get_next_node(entry.action.id(), next_nodes, next_node_hit));
        entry
    }
}

pub struct MatchTableIndirect {
    pub(crate) abstract_table: MatchTableAbstract<IndirectIndex>,
    pub(crate) profile: Arc<dyn ActionProfile>,
}

impl MatchTableIndirect {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn create(
        name: impl Into<String>,
        match_type: &str,
        size: usize,
        next_nodes: HashMap<ActionId, Arc<ControlFlowNode>>,
        next_node_miss_default: Arc<ControlFlowNode>,
        with_counters: bool,
        with_ageing: bool,
        with_meters: bool,
        key_builder: Box<dyn Fn(&dyn Packet) -> Selector + Send + Sync>,
        profile: Arc<dyn ActionProfile>,
        log: Logger,
    ) -> Self {
        let resolver = Box::new(IndirectResolver {
            profile: profile.clone(),
        });
        Self {
            abstract_table: MatchTableAbstract::new(
                name,
                match_type,
                size,
                next_nodes,
                next_node_miss_default,
                with_counters,
                with_ageing,
                with_meters,
                key_builder,
                resolver,
                log,
            ),
            profile,
        }
    }

    pub fn inner(&self) -> &MatchTableAbstract<IndirectIndex> {
        &self.abstract_table
    }

    pub fn apply_action(&self, pkt: &mut dyn Packet) -> Arc<ControlFlowNode> {
        self.abstract_table.apply_action(pkt)
    }

    /// Ref-count discipline: validate, increment, then install; revert the
    /// increment if the match unit rejects the entry (distilled spec §7).
    pub fn add_entry(
        &self,
        key: MatchKey,
        mbr: MbrHandle,
        priority: u32,
    ) -> Result<EntryHandle, MatchErrorCode> {
        if !self.profile.is_valid_mbr(mbr) {
            return Err(MatchErrorCode::InvalidMbrHandle);
        }
        let idx = IndirectIndex::Member(mbr);
        self.profile.ref_count_increase(idx);
        let mut state = self.abstract_table.state.write().expect("table lock poisoned");
        let result = state.match_unit.add_entry(key, idx, priority);
        if result.is_err() {
            self.profile.ref_count_decrease(idx);
        }
        debug!(self.abstract_table.log(), "add_entry"; "ok" => result.is_ok());
        result
    }

    /// Decrement-then-increment discipline: decrement the old index first,
    /// validate the new one, increment it, then replace — restoring both
    /// ref counts if the match unit rejects the new value (distilled spec §7).
    pub fn modify_entry(&self, handle: EntryHandle, mbr: MbrHandle) -> Result<(), MatchErrorCode> {
        let mut state = self.abstract_table.state.write().expect("table lock poisoned");
        let old_idx = *state.match_unit.get_value(handle)?;
        self.profile.ref_count_decrease(old_idx);
        if !self.profile.is_valid_mbr(mbr) {
            self.profile.ref_count_increase(old_idx);
            return Err(MatchErrorCode::InvalidMbrHandle);
        }
        let new_idx = IndirectIndex::Member(mbr);
        self.profile.ref_count_increase(new_idx);
        match state.match_unit.modify_entry(handle, new_idx) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.profile.ref_count_decrease(new_idx);
                self.profile.ref_count_increase(old_idx);
                Err(e)
            }
        }
    }

    pub fn delete_entry(&self, handle: EntryHandle) -> Result<(), MatchErrorCode> {
        let mut state = self.abstract_table.state.write().expect("table lock poisoned");
        let idx = *state.match_unit.get_value(handle)?;
        state.match_unit.delete_entry(handle)?;
        self.profile.ref_count_decrease(idx);
        Ok(())
    }

    pub fn set_default_member(&self, mbr: MbrHandle) -> Result<(), MatchErrorCode> {
        if !self.profile.is_valid_mbr(mbr) {
            return Err(MatchErrorCode::InvalidMbrHandle);
        }
        let idx = IndirectIndex::Member(mbr);
        let mut state = self.abstract_table.state.write().expect("table lock poisoned");
        if let Some(old) = state.default_value.take() {
            self.profile.ref_count_decrease(old);
        }
        self.profile.ref_count_increase(idx);
        state.default_value = Some(idx);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionData, ActionFnEntry, EmptyActionFn};
    use crate::key::{BigUintKey, Key};
    use crate::packet::Phv;
    use num::bigint::BigUint;
    use std::collections::HashMap as Map;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Mutex;

    struct FakeProfile {
        valid_mbrs: Vec<MbrHandle>,
        ref_counts: Mutex<HashMap<IndirectIndex, i64>>,
        hits: AtomicI64,
    }

    impl ActionProfile for FakeProfile {
        fn is_valid_mbr(&self, h: MbrHandle) -> bool {
            self.valid_mbrs.contains(&h)
        }
        fn is_valid_grp(&self, _h: crate::profile::GrpHandle) -> bool {
            false
        }
        fn group_is_empty(&self, _h: crate::profile::GrpHandle) -> bool {
            true
        }
        fn ref_count_increase(&self, idx: IndirectIndex) {
            *self.ref_counts.lock().unwrap().entry(idx).or_insert(0) += 1;
        }
        fn ref_count_decrease(&self, idx: IndirectIndex) {
            *self.ref_counts.lock().unwrap().entry(idx).or_insert(0) -= 1;
        }
        fn lookup(&self, _pkt: &dyn Packet, _idx: IndirectIndex) -> ActionEntry {
            self.hits.fetch_add(1, Ordering::SeqCst);
            ActionEntry::new(
                ActionFnEntry::new(Arc::new(EmptyActionFn), ActionData::default()),
                None,
            )
        }
        fn dump_entry(&self, idx: IndirectIndex) -> String {
            format!("{idx}")
        }
    }

    struct FakePhv(Map<(String, usize), u64>);
    impl Phv for FakePhv {
        fn set_field(&mut self, header: &str, offset: usize, value: u64) {
            self.0.insert((header.to_string(), offset), value);
        }
        fn get_field(&self, header: &str, offset: usize) -> Option<u64> {
            self.0.get(&(header.to_string(), offset)).copied()
        }
    }

    struct FakePacket {
        phv: FakePhv,
        entry_index: u32,
    }

    impl Packet for FakePacket {
        fn phv_mut(&mut self) -> &mut dyn Phv {
            &mut self.phv
        }
        fn packet_id(&self) -> u64 {
            0
        }
        fn copy_id(&self) -> u64 {
            0
        }
        fn set_entry_index(&mut self, index: u32) {
            self.entry_index = index;
        }
        fn len_bytes(&self) -> usize {
            1
        }
    }

    fn ek(v: u32) -> MatchKey {
        vec![Key::Exact(BigUintKey {
            value: v.into(),
            width: 8,
        })]
    }

    fn table(profile: Arc<dyn ActionProfile>, selector_value: u32) -> MatchTableIndirect {
        MatchTableIndirect::create(
            "t",
            "exact",
            16,
            HashMap::new(),
            Arc::new(ControlFlowNode::new("miss")),
            false,
            false,
            false,
            Box::new(move |_pkt: &dyn Packet| vec![BigUint::from(selector_value)]),
            profile,
            crate::logging::root_logger(),
        )
    }

    #[test]
    fn add_entry_rejects_invalid_member() {
        let profile = Arc::new(FakeProfile {
            valid_mbrs: vec![],
            ref_counts: Mutex::new(HashMap::new()),
            hits: AtomicI64::new(0),
        });
        let t = table(profile, 0x0a);
        assert_eq!(
            t.add_entry(ek(0x0a), 7, 0).unwrap_err(),
            MatchErrorCode::InvalidMbrHandle
        );
    }

    #[test]
    fn add_entry_increments_ref_count_once_per_entry() {
        let profile = Arc::new(FakeProfile {
            valid_mbrs: vec![1],
            ref_counts: Mutex::new(HashMap::new()),
            hits: AtomicI64::new(0),
        });
        let t = table(profile.clone(), 0x0a);
        t.add_entry(ek(0x0a), 1, 0).unwrap();
        t.add_entry(ek(0x0b), 1, 0).unwrap();
        assert_eq!(
            profile.ref_counts.lock().unwrap()[&IndirectIndex::Member(1)],
            2
        );
    }

    #[test]
    fn delete_entry_decrements_ref_count() {
        let profile = Arc::new(FakeProfile {
            valid_mbrs: vec![1],
            ref_counts: Mutex::new(HashMap::new()),
            hits: AtomicI64::new(0),
        });
        let t = table(profile.clone(), 0x0a);
        let h = t.add_entry(ek(0x0a), 1, 0).unwrap();
        t.delete_entry(h).unwrap();
        assert_eq!(
            profile.ref_counts.lock().unwrap()[&IndirectIndex::Member(1)],
            0
        );
    }

    #[test]
    fn hit_rewrites_next_node_through_the_profile() {
        let profile = Arc::new(FakeProfile {
            valid_mbrs: vec![1],
            ref_counts: Mutex::new(HashMap::new()),
            hits: AtomicI64::new(0),
        });
        let mut next_nodes = HashMap::new();
        next_nodes.insert(crate::action::EMPTY_ACTION_ID, Arc::new(ControlFlowNode::new("n1")));
        let t = MatchTableIndirect::create(
            "t",
            "exact",
            16,
            next_nodes,
            Arc::new(ControlFlowNode::new("miss")),
            false,
            false,
            false,
            Box::new(move |_pkt: &dyn Packet| vec![BigUint::from(0x0au32)]),
            profile.clone(),
            crate::logging::root_logger(),
        );
        t.add_entry(ek(0x0a), 1, 0).unwrap();
        let mut pkt = FakePacket {
            phv: FakePhv(Map::new()),
            entry_index: 0,
        };
        let node = t.apply_action(&mut pkt);
        assert_eq!(node.name(), "n1");
        assert_eq!(profile.hits.load(Ordering::SeqCst), 1);
    }
}
