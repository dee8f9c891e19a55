// Copyright 2022 Oxide Computer Company

//! The direct match table (C4): value type is `ActionEntry`, baked in full
//! (action, data, next node) at `add_entry`/`modify_entry`/`set_default_*`
//! time, so the hot path only ever clones an already-resolved entry.

use std::collections::HashMap;
use std::sync::Arc;

use slog::{debug, o, Logger};

use crate::action::{ActionData, ActionEntry, ActionFn, ActionFnEntry, ActionId};
use crate::control_flow::ControlFlowNode;
use crate::error::MatchErrorCode;
use crate::handle::EntryHandle;
use crate::key::{MatchKey, Selector};
use crate::packet::Packet;

use super::{get_next_node, get_next_node_default, MatchTableAbstract, ValueResolver};

struct DirectResolver;

impl ValueResolver<ActionEntry> for DirectResolver {
    fn resolve(
        &self,
        value: &ActionEntry,
        _pkt: &dyn Packet,
        _next_nodes: &HashMap<ActionId, Arc<ControlFlowNode>>,
        _next_node_hit: Option<&Arc<ControlFlowNode>>,
    ) -> ActionEntry {
        // Already fully resolved at insertion time; see `get_next_node` call
        // sites below.
        value.clone()
    }
}

pub struct MatchTable {
    abstract_table: MatchTableAbstract<ActionEntry>,
}

impl MatchTable {
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
        log: Logger,
    ) -> Self {
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
                Box::new(DirectResolver),
                log,
            ),
        }
    }

    pub fn inner(&self) -> &MatchTableAbstract<ActionEntry> {
        &self.abstract_table
    }

    pub fn apply_action(&self, pkt: &mut dyn Packet) -> Arc<ControlFlowNode> {
        self.abstract_table.apply_action(pkt)
    }

    pub fn add_entry(
        &self,
        key: MatchKey,
        action_fn: Arc<dyn ActionFn>,
        action_data: ActionData,
        priority: u32,
    ) -> Result<EntryHandle, MatchErrorCode> {
        let next_node = get_next_node(
            action_fn.id(),
            self.abstract_table.next_nodes(),
            self.abstract_table.next_node_hit(),
        );
        let entry = ActionEntry::new(ActionFnEntry::new(action_fn, action_data), Some(next_node));
        let mut state = self.abstract_table.state.write().expect("table lock poisoned");
        let result = state.match_unit.add_entry(key, entry, priority);
        debug!(self.abstract_table.log(), "add_entry"; "ok" => result.is_ok());
        result
    }

    pub fn modify_entry(
        &self,
        handle: EntryHandle,
        action_fn: Arc<dyn ActionFn>,
        action_data: ActionData,
    ) -> Result<(), MatchErrorCode> {
        let next_node = get_next_node(
            action_fn.id(),
            self.abstract_table.next_nodes(),
            self.abstract_table.next_node_hit(),
        );
        let entry = ActionEntry::new(ActionFnEntry::new(action_fn, action_data), Some(next_node));
        let mut state = self.abstract_table.state.write().expect("table lock poisoned");
        state.match_unit.modify_entry(handle, entry)
    }

    pub fn delete_entry(&self, handle: EntryHandle) -> Result<(), MatchErrorCode> {
        let mut state = self.abstract_table.state.write().expect("table lock poisoned");
        state.match_unit.delete_entry(handle)
    }

    /// Initial install of the default entry. `is_const` permanently blocks
    /// further replacement of the default (I3). A double-const-default call
    /// (the default entry is already const) is a programming error, not a
    /// recoverable condition: the original's `MatchTable::set_default_entry`
    /// is `assert(!const_default_entry);`, not a returned error code, and the
    /// distilled spec groups this with the factory's unknown-match-type case
    /// as something that "abort[s]" — so this panics rather than returning
    /// `DefaultEntryIsConst`, matching `lookup::create`'s precedent for an
    /// invariant violation a caller could otherwise silently ignore.
    pub fn set_default_entry(
        &self,
        action_fn: Arc<dyn ActionFn>,
        action_data: ActionData,
        is_const: bool,
    ) -> Result<(), MatchErrorCode> {
        let mut state = self.abstract_table.state.write().expect("table lock poisoned");
        assert!(
            !state.const_default_entry,
            "set_default_entry called again on a table whose default entry is already const"
        );
        let action_id = action_fn.id();
        let next_node = get_next_node_default(
            action_id,
            self.abstract_table.next_nodes(),
            state.next_node_miss.as_ref(),
        );
        state.default_value = Some(ActionEntry::new(
            ActionFnEntry::new(action_fn, action_data),
            Some(next_node.clone()),
        ));
        state.const_default_entry = is_const;
        if !state.next_node_miss_frozen {
            state.next_node_miss = Some(next_node);
        }
        Ok(())
    }

    /// Locks `const_default_action` to `action_fn`'s id without touching the
    /// default entry/value itself — a standalone operation independent of
    /// `set_default_entry`, matching the original's
    /// `MatchTable::set_const_default_action_fn` (`assert(!const_default_action);
    /// const_default_action = const_default_action_fn;`). Once set,
    /// `set_default_action` rejects any later call naming a different action
    /// (I3) while the default entry itself remains freely replaceable.
    pub fn set_const_default_action_fn(&self, action_fn: Arc<dyn ActionFn>) {
        let mut state = self.abstract_table.state.write().expect("table lock poisoned");
        assert!(
            state.const_default_action.is_none(),
            "set_const_default_action_fn called twice on the same table"
        );
        state.const_default_action = Some(action_fn.id());
    }

    /// Replaces the default action, rejecting the change if `const_default_entry`
    /// is set (I3) or if `const_default_action` names a different action
    /// (I3). Recomputes `next_node_miss` via `get_next_node_default` unless
    /// frozen by `set_next_node_miss` (I7).
    pub fn set_default_action(
        &self,
        action_fn: Arc<dyn ActionFn>,
        action_data: ActionData,
    ) -> Result<(), MatchErrorCode> {
        let mut state = self.abstract_table.state.write().expect("table lock poisoned");
        if state.const_default_entry {
            return Err(MatchErrorCode::DefaultEntryIsConst);
        }
        let action_id = action_fn.id();
        if let Some(const_id) = state.const_default_action {
            if const_id != action_id {
                return Err(MatchErrorCode::DefaultActionIsConst);
            }
        }
        let next_node = get_next_node_default(
            action_id,
            self.abstract_table.next_nodes(),
            state.next_node_miss.as_ref(),
        );
        state.default_value = Some(ActionEntry::new(
            ActionFnEntry::new(action_fn, action_data),
            Some(next_node.clone()),
        ));
        if !state.next_node_miss_frozen {
            state.next_node_miss = Some(next_node);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionData, EmptyActionFn};
    use crate::key::{BigUintKey, Key};
    use crate::packet::Phv;
    use num::bigint::BigUint;
    use std::collections::HashMap as Map;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct CountingAction {
        id: ActionId,
        name: &'static str,
        calls: AtomicU32,
    }

    impl ActionFn for CountingAction {
        fn id(&self) -> ActionId {
            self.id
        }
        fn name(&self) -> &str {
            self.name
        }
        fn call(&self, _data: &ActionData, _pkt: &mut dyn Packet) {
            self.calls.fetch_add(1, Ordering::SeqCst);
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
        len: usize,
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
            self.len
        }
    }

    fn ek(v: u32) -> MatchKey {
        vec![Key::Exact(BigUintKey {
            value: v.into(),
            width: 8,
        })]
    }

    fn table(selector_value: u32) -> MatchTable {
        let mut next_nodes = HashMap::new();
        next_nodes.insert(1u32, Arc::new(ControlFlowNode::new("n1")));
        MatchTable::create(
            "t",
            "exact",
            16,
            next_nodes,
            Arc::new(ControlFlowNode::new("miss")),
            true,
            false,
            false,
            Box::new(move |_pkt: &dyn Packet| vec![BigUint::from(selector_value)]),
            crate::logging::root_logger(),
        )
    }

    fn packet(len: usize) -> FakePacket {
        FakePacket {
            phv: FakePhv(Map::new()),
            entry_index: 0,
            len,
        }
    }

    #[test]
    fn exact_hit_executes_action_and_returns_its_node() {
        let t = table(0x0a);
        let action = Arc::new(CountingAction {
            id: 1,
            name: "a",
            calls: AtomicU32::new(0),
        });
        let h = t
            .add_entry(ek(0x0a), action.clone(), ActionData(vec![1]), 0)
            .unwrap();
        let mut pkt = packet(64);
        let node = t.apply_action(&mut pkt);
        assert_eq!(node.name(), "n1");
        assert_eq!(action.calls.load(Ordering::SeqCst), 1);
        assert_eq!(t.inner().query_counters(h).unwrap(), (64, 1));
    }

    #[test]
    fn miss_with_no_default_uses_miss_node() {
        let t = table(0x0b);
        let mut pkt = packet(10);
        let node = t.apply_action(&mut pkt);
        assert_eq!(node.name(), "miss");
        assert_eq!(pkt.entry_index, crate::handle::INVALID_ENTRY_INDEX);
    }

    #[test]
    fn get_default_entry_reports_no_default_entry_until_one_is_set() {
        let t = table(0x0b);
        assert_eq!(
            t.inner().get_default_entry().unwrap_err(),
            MatchErrorCode::NoDefaultEntry
        );
        t.set_default_entry(Arc::new(EmptyActionFn), ActionData::default(), false)
            .unwrap();
        assert!(t.inner().get_default_entry().is_ok());
    }

    #[test]
    fn const_default_entry_rejects_further_changes() {
        let t = table(0x0b);
        let d = Arc::new(EmptyActionFn);
        t.set_default_entry(d.clone(), ActionData::default(), true)
            .unwrap();
        let other = Arc::new(CountingAction {
            id: 1,
            name: "a",
            calls: AtomicU32::new(0),
        });
        assert_eq!(
            t.set_default_action(other, ActionData::default())
                .unwrap_err(),
            MatchErrorCode::DefaultEntryIsConst
        );
    }

    #[test]
    #[should_panic(expected = "already const")]
    fn set_default_entry_twice_const_panics() {
        let t = table(0x0b);
        let d = Arc::new(EmptyActionFn);
        t.set_default_entry(d.clone(), ActionData::default(), true)
            .unwrap();
        let _ = t.set_default_entry(d, ActionData::default(), true);
    }

    #[test]
    fn const_default_action_locks_action_but_not_the_entry() {
        let t = table(0x0b);
        let a = Arc::new(CountingAction {
            id: 1,
            name: "a",
            calls: AtomicU32::new(0),
        });
        t.set_default_entry(a.clone(), ActionData::default(), false)
            .unwrap();
        t.set_const_default_action_fn(a.clone());

        // same action id, different data: allowed.
        t.set_default_action(a, ActionData::default()).unwrap();

        // different action id: rejected.
        let other = Arc::new(CountingAction {
            id: 2,
            name: "b",
            calls: AtomicU32::new(0),
        });
        assert_eq!(
            t.set_default_action(other, ActionData::default())
                .unwrap_err(),
            MatchErrorCode::DefaultActionIsConst
        );
    }
}
