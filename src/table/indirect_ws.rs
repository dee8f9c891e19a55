// Copyright 2022 Oxide Computer Company

//! The indirect-with-selection match table (C6): extends C5 with group
//! indices, composed rather than re-deriving C5's member-handling logic
//! (distilled spec §9's composition-over-inheritance note).

use std::collections::HashMap;
use std::sync::Arc;

use slog::Logger;

use crate::action::ActionId;
use crate::control_flow::ControlFlowNode;
use crate::error::MatchErrorCode;
use crate::handle::EntryHandle;
use crate::key::{MatchKey, Selector};
use crate::packet::Packet;
use crate::profile::{ActionProfile, GrpHandle, IndirectIndex, MbrHandle};

use super::indirect::MatchTableIndirect;
use super::MatchTableAbstract;

pub struct MatchTableIndirectWS {
    base: MatchTableIndirect,
}

impl MatchTableIndirectWS {
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
        Self {
            base: MatchTableIndirect::create(
                name,
                match_type,
                size,
                next_nodes,
                next_node_miss_default,
                with_counters,
                with_ageing,
                with_meters,
                key_builder,
                profile,
                log,
            ),
        }
    }

    pub fn inner(&self) -> &MatchTableAbstract<IndirectIndex> {
        self.base.inner()
    }

    pub fn apply_action(&self, pkt: &mut dyn Packet) -> Arc<ControlFlowNode> {
        self.base.apply_action(pkt)
    }

    pub fn add_entry(
        &self,
        key: MatchKey,
        mbr: MbrHandle,
        priority: u32,
    ) -> Result<EntryHandle, MatchErrorCode> {
        self.base.add_entry(key, mbr, priority)
    }

    pub fn modify_entry(&self, handle: EntryHandle, mbr: MbrHandle) -> Result<(), MatchErrorCode> {
        self.base.modify_entry(handle, mbr)
    }

    pub fn delete_entry(&self, handle: EntryHandle) -> Result<(), MatchErrorCode> {
        self.base.delete_entry(handle)
    }

    pub fn set_default_member(&self, mbr: MbrHandle) -> Result<(), MatchErrorCode> {
        self.base.set_default_member(mbr)
    }

    /// Validates the group before admission: an unknown group is
    /// `INVALID_GRP_HANDLE`, an empty one is `EMPTY_GRP` — both leave the
    /// table unchanged (scenario 6).
    pub fn add_entry_ws(
        &self,
        key: MatchKey,
        grp: GrpHandle,
        priority: u32,
    ) -> Result<EntryHandle, MatchErrorCode> {
        let profile = &self.base.profile;
        if !profile.is_valid_grp(grp) {
            return Err(MatchErrorCode::InvalidGrpHandle);
        }
        if profile.group_is_empty(grp) {
            return Err(MatchErrorCode::EmptyGrp);
        }
        let idx = IndirectIndex::Group(grp);
        profile.ref_count_increase(idx);
        let mut state = self.base.abstract_table.state.write().expect("table lock poisoned");
        let result = state.match_unit.add_entry(key, idx, priority);
        if result.is_err() {
            profile.ref_count_decrease(idx);
        }
        result
    }

    pub fn modify_entry_ws(&self, handle: EntryHandle, grp: GrpHandle) -> Result<(), MatchErrorCode> {
        let profile = &self.base.profile;
        let mut state = self.base.abstract_table.state.write().expect("table lock poisoned");
        let old_idx = *state.match_unit.get_value(handle)?;
        profile.ref_count_decrease(old_idx);
        if !profile.is_valid_grp(grp) {
            profile.ref_count_increase(old_idx);
            return Err(MatchErrorCode::InvalidGrpHandle);
        }
        if profile.group_is_empty(grp) {
            profile.ref_count_increase(old_idx);
            return Err(MatchErrorCode::EmptyGrp);
        }
        let new_idx = IndirectIndex::Group(grp);
        profile.ref_count_increase(new_idx);
        match state.match_unit.modify_entry(handle, new_idx) {
            Ok(()) => Ok(()),
            Err(e) => {
                profile.ref_count_decrease(new_idx);
                profile.ref_count_increase(old_idx);
                Err(e)
            }
        }
    }

    pub fn set_default_group(&self, grp: GrpHandle) -> Result<(), MatchErrorCode> {
        let profile = &self.base.profile;
        if !profile.is_valid_grp(grp) {
            return Err(MatchErrorCode::InvalidGrpHandle);
        }
        if profile.group_is_empty(grp) {
            return Err(MatchErrorCode::EmptyGrp);
        }
        let idx = IndirectIndex::Group(grp);
        let mut state = self.base.abstract_table.state.write().expect("table lock poisoned");
        if let Some(old) = state.default_value.take() {
            profile.ref_count_decrease(old);
        }
        profile.ref_count_increase(idx);
        state.default_value = Some(idx);
        Ok(())
    }

    /// Reports the field the stored index doesn't use as its type's max
    /// sentinel, mirroring the original's `std::numeric_limits<...>::max()`
    /// reporting for whichever of member/group an indirect-WS entry leaves
    /// unused.
    pub fn mbr_and_grp(idx: IndirectIndex) -> (MbrHandle, GrpHandle) {
        match idx {
            IndirectIndex::Member(m) => (m, GrpHandle::MAX),
            IndirectIndex::Group(g) => (MbrHandle::MAX, g),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionData, ActionEntry, ActionFnEntry, EmptyActionFn};
    use crate::key::{BigUintKey, Key};
    use crate::packet::Phv;
    use num::bigint::BigUint;
    use std::collections::HashMap as Map;
    use std::sync::Mutex;

    struct FakeProfile {
        empty_grps: Vec<GrpHandle>,
        valid_grps: Vec<GrpHandle>,
        ref_counts: Mutex<HashMap<IndirectIndex, i64>>,
    }

    impl ActionProfile for FakeProfile {
        fn is_valid_mbr(&self, _h: MbrHandle) -> bool {
            false
        }
        fn is_valid_grp(&self, h: GrpHandle) -> bool {
            self.valid_grps.contains(&h)
        }
        fn group_is_empty(&self, h: GrpHandle) -> bool {
            self.empty_grps.contains(&h)
        }
        fn ref_count_increase(&self, idx: IndirectIndex) {
            *self.ref_counts.lock().unwrap().entry(idx).or_insert(0) += 1;
        }
        fn ref_count_decrease(&self, idx: IndirectIndex) {
            *self.ref_counts.lock().unwrap().entry(idx).or_insert(0) -= 1;
        }
        fn lookup(&self, _pkt: &dyn Packet, _idx: IndirectIndex) -> ActionEntry {
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
        fn set_field(&mut self, _h: &str, _o: usize, _v: u64) {}
        fn get_field(&self, _h: &str, _o: usize) -> Option<u64> {
            None
        }
    }
    struct FakePacket(FakePhv);
    impl Packet for FakePacket {
        fn phv_mut(&mut self) -> &mut dyn Phv {
            &mut self.0
        }
        fn packet_id(&self) -> u64 {
            0
        }
        fn copy_id(&self) -> u64 {
            0
        }
        fn set_entry_index(&mut self, _index: u32) {}
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

    #[test]
    fn add_entry_ws_rejects_empty_group() {
        let profile = Arc::new(FakeProfile {
            empty_grps: vec![9],
            valid_grps: vec![9],
            ref_counts: Mutex::new(HashMap::new()),
        });
        let t = MatchTableIndirectWS::create(
            "t",
            "exact",
            16,
            HashMap::new(),
            Arc::new(ControlFlowNode::new("miss")),
            false,
            false,
            false,
            Box::new(|_pkt: &dyn Packet| vec![BigUint::from(0u32)]),
            profile,
            crate::logging::root_logger(),
        );
        assert_eq!(
            t.add_entry_ws(ek(1), 9, 0).unwrap_err(),
            MatchErrorCode::EmptyGrp
        );
        assert_eq!(t.inner().get_entries().len(), 0);
    }

    #[test]
    fn add_entry_ws_rejects_unknown_group() {
        let profile = Arc::new(FakeProfile {
            empty_grps: vec![],
            valid_grps: vec![],
            ref_counts: Mutex::new(HashMap::new()),
        });
        let t = MatchTableIndirectWS::create(
            "t",
            "exact",
            16,
            HashMap::new(),
            Arc::new(ControlFlowNode::new("miss")),
            false,
            false,
            false,
            Box::new(|_pkt: &dyn Packet| vec![BigUint::from(0u32)]),
            profile,
            crate::logging::root_logger(),
        );
        assert_eq!(
            t.add_entry_ws(ek(1), 3, 0).unwrap_err(),
            MatchErrorCode::InvalidGrpHandle
        );
    }

    #[test]
    fn mbr_and_grp_reports_unused_field_as_max() {
        assert_eq!(
            MatchTableIndirectWS::mbr_and_grp(IndirectIndex::Member(4)),
            (4, GrpHandle::MAX)
        );
        assert_eq!(
            MatchTableIndirectWS::mbr_and_grp(IndirectIndex::Group(4)),
            (MbrHandle::MAX, 4)
        );
    }
}
