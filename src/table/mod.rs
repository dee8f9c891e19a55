// Copyright 2022 Oxide Computer Company

//! The abstract match table (C3): the reader/writer-locked common machinery
//! shared by the direct, indirect, and indirect-WS variants (`direct.rs`,
//! `indirect.rs`, `indirect_ws.rs`). Polymorphism over the stored value type
//! (`ActionEntry` vs `IndirectIndex`) and over how a stored value resolves to
//! the `ActionEntry` actually executed on a hit is modeled by composition —
//! a small [`ValueResolver`] trait object — rather than a class hierarchy,
//! per the distilled spec's own design note.

pub mod direct;
mod factory;
pub mod indirect;
pub mod indirect_ws;

pub use factory::{create_direct, create_indirect, create_indirect_ws};

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use slog::{debug, o, Logger};

use crate::action::{ActionEntry, ActionId};
use crate::control_flow::{ControlFlowNode, ObjectCatalog};
use crate::dtrace::p4rs_provider;
use crate::error::{MatchErrorCode, SerializationError};
use crate::handle::{entry_index, EntryHandle, INVALID_ENTRY_INDEX};
use crate::key::{MatchKey, Selector};
use crate::match_unit::MatchUnit;
use crate::meta::CounterValue;
use crate::meter::{MeterErrorCode, RateConfig};
use crate::packet::{now_ms, Packet};
use crate::serial::{EntryValue, LineReader, NULL_SENTINEL};

/// Resolves this table's own action→node map honoring the `next_node_hit`
/// override, used both to bake a direct entry's `next_node` at insertion
/// time and to rewrite an indirect entry's `next_node` on every lookup.
/// Panics if `action_id` has no mapped node — an unmapped action id is a
/// construction-time programming error, not a runtime condition.
pub(crate) fn get_next_node(
    action_id: ActionId,
    next_nodes: &HashMap<ActionId, Arc<ControlFlowNode>>,
    next_node_hit: Option<&Arc<ControlFlowNode>>,
) -> Arc<ControlFlowNode> {
    next_node_hit.cloned().unwrap_or_else(|| {
        next_nodes
            .get(&action_id)
            .cloned()
            .expect("action id has no mapped next node")
    })
}

/// As [`get_next_node`], but honoring `next_node_miss` instead of
/// `next_node_hit` — used only by `set_default_action` to (re)derive
/// `next_node_miss` for the new default action (distilled spec §9's
/// documented hit/miss asymmetry).
pub(crate) fn get_next_node_default(
    action_id: ActionId,
    next_nodes: &HashMap<ActionId, Arc<ControlFlowNode>>,
    next_node_miss: Option<&Arc<ControlFlowNode>>,
) -> Arc<ControlFlowNode> {
    next_node_miss.cloned().unwrap_or_else(|| {
        next_nodes
            .get(&action_id)
            .cloned()
            .expect("action id has no mapped next node")
    })
}

/// Resolves a match unit's stored value, on either a hit or a default-index
/// miss, to the `ActionEntry` actually executed. Direct tables store
/// `ActionEntry` already baked at insertion time and just clone it; indirect
/// tables store an `IndirectIndex` and must consult the action profile and
/// rewrite `next_node` per this table's own graph on every call (distilled
/// spec §4.4, §9 "next-node rebinding on every indirect hit").
pub trait ValueResolver<V>: Send + Sync {
    fn resolve(
        &self,
        value: &V,
        pkt: &dyn Packet,
        next_nodes: &HashMap<ActionId, Arc<ControlFlowNode>>,
        next_node_hit: Option<&Arc<ControlFlowNode>>,
    ) -> ActionEntry;
}

/// The mutable state guarded by the table's single reader/writer lock: the
/// match unit itself, plus the default value and the const/freeze flags that
/// must be observed atomically with it.
pub(crate) struct TableState<V> {
    pub match_unit: MatchUnit<V>,
    pub default_value: Option<V>,
    pub const_default_entry: bool,
    pub const_default_action: Option<ActionId>,
    pub next_node_miss: Option<Arc<ControlFlowNode>>,
    pub next_node_miss_frozen: bool,
}

/// Common fields and behavior of every match table variant. Embedded by
/// `MatchTable`/`MatchTableIndirect`/`MatchTableIndirectWS`, which add only
/// the handful of methods their own value type requires.
pub struct MatchTableAbstract<V> {
    name: String,
    pub(crate) state: RwLock<TableState<V>>,
    next_nodes: HashMap<ActionId, Arc<ControlFlowNode>>,
    next_node_hit: Option<Arc<ControlFlowNode>>,
    next_node_miss_default: Arc<ControlFlowNode>,
    with_counters: bool,
    with_ageing: bool,
    with_meters: bool,
    meter_target: Option<(String, usize)>,
    key_builder: Box<dyn Fn(&dyn Packet) -> Selector + Send + Sync>,
    resolver: Box<dyn ValueResolver<V>>,
    log: Logger,
}

impl<V: EntryValue> MatchTableAbstract<V> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: impl Into<String>,
        match_type: &str,
        size: usize,
        next_nodes: HashMap<ActionId, Arc<ControlFlowNode>>,
        next_node_miss_default: Arc<ControlFlowNode>,
        with_counters: bool,
        with_ageing: bool,
        with_meters: bool,
        key_builder: Box<dyn Fn(&dyn Packet) -> Selector + Send + Sync>,
        resolver: Box<dyn ValueResolver<V>>,
        log: Logger,
    ) -> Self {
        let name = name.into();
        let log = log.new(o!("table" => name.clone()));
        Self {
            state: RwLock::new(TableState {
                match_unit: MatchUnit::new(match_type, size),
                default_value: None,
                const_default_entry: false,
                const_default_action: None,
                next_node_miss: None,
                next_node_miss_frozen: false,
            }),
            next_nodes,
            next_node_hit: None,
            next_node_miss_default,
            with_counters,
            with_ageing,
            with_meters,
            meter_target: None,
            key_builder,
            resolver,
            name,
            log,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_meter_target(&mut self, header: impl Into<String>, offset: usize) {
        self.meter_target = Some((header.into(), offset));
    }

    /// The fast path (distilled spec §4.2): one read lock held across
    /// lookup, meter execution, and action execution, so that the resolved
    /// `ActionEntry`'s borrowed state never outlives the entry it came from.
    pub fn apply_action(&self, pkt: &mut dyn Packet) -> Arc<ControlFlowNode> {
        let state = self.state.read().expect("table lock poisoned");
        let selector = (self.key_builder)(pkt);
        let hit = state.match_unit.lookup(&selector);

        let (is_hit, handle, resolved) = match hit {
            Some((handle, value)) => {
                let entry = self.resolver.resolve(
                    value,
                    pkt,
                    &self.next_nodes,
                    self.next_node_hit.as_ref(),
                );
                (true, Some(handle), entry)
            }
            None => {
                let entry = match &state.default_value {
                    Some(value) => self.resolver.resolve(
                        value,
                        pkt,
                        &self.next_nodes,
                        self.next_node_hit.as_ref(),
                    ),
                    None => ActionEntry::empty(state.next_node_miss.clone()),
                };
                (false, None, entry)
            }
        };

        pkt.set_entry_index(match handle {
            Some(h) => entry_index(h),
            None => INVALID_ENTRY_INDEX,
        });

        if is_hit {
            let handle = handle.expect("hit always carries a handle");
            if self.with_meters {
                if let Ok(meter) = state.match_unit.get_meter(handle) {
                    let color = meter.execute(pkt);
                    if let Some((header, offset)) = &self.meter_target {
                        pkt.phv_mut().set_field(header, *offset, color);
                    }
                }
            }
            if self.with_counters {
                if let Ok(meta) = state.match_unit.get_entry_meta(handle) {
                    meta.counter.increment(pkt.len_bytes() as u64);
                    if self.with_ageing {
                        meta.touch(now_ms());
                    }
                }
            }
            p4rs_provider::table_hit!(|| &self.name);
        } else {
            p4rs_provider::table_miss!(|| &self.name);
        }

        let next_node = if is_hit {
            resolved
                .next_node
                .clone()
                .expect("a resolved hit entry always carries a next node")
        } else {
            resolved.next_node.clone().unwrap_or_else(|| {
                state
                    .next_node_miss
                    .clone()
                    .unwrap_or_else(|| self.next_node_miss_default.clone())
            })
        };
        resolved.action.call(pkt);
        next_node
    }

    pub fn get_entry(&self, handle: EntryHandle) -> Result<(MatchKey, V, u32), MatchErrorCode> {
        let state = self.state.read().expect("table lock poisoned");
        let (key, value, priority) = state.match_unit.get_entry(handle)?;
        Ok((key.clone(), value.clone(), priority))
    }

    pub fn get_entry_from_key(
        &self,
        key: &MatchKey,
        priority: u32,
    ) -> Result<EntryHandle, MatchErrorCode> {
        let state = self.state.read().expect("table lock poisoned");
        state.match_unit.retrieve_handle(key, priority)
    }

    pub fn get_entries(&self) -> Vec<(EntryHandle, MatchKey, V, u32)> {
        let state = self.state.read().expect("table lock poisoned");
        state
            .match_unit
            .handles()
            .map(|h| {
                let (key, value, priority) = state
                    .match_unit
                    .get_entry(h)
                    .expect("handle came from our own live iterator");
                (h, key.clone(), value.clone(), priority)
            })
            .collect()
    }

    /// `NO_DEFAULT_ENTRY` if none has been installed, mirroring
    /// `MatchTable(Indirect(WS))::get_default_entry` in the source this was
    /// distilled from (each checks its own "is a default set" flag and
    /// returns this code rather than an empty success).
    pub fn get_default_entry(&self) -> Result<V, MatchErrorCode> {
        let state = self.state.read().expect("table lock poisoned");
        state.default_value.clone().ok_or(MatchErrorCode::NoDefaultEntry)
    }

    pub fn set_entry_ttl(&self, handle: EntryHandle, timeout_ms: u32) -> Result<(), MatchErrorCode> {
        let mut state = self.state.write().expect("table lock poisoned");
        state.match_unit.set_entry_ttl(handle, timeout_ms)
    }

    /// Advisory: appends expired handles without deleting them (distilled
    /// spec §4.1, §5 "ageing sweep"). Requires `with_ageing`.
    pub fn sweep_entries(&self, now_ms: u64) -> Result<Vec<EntryHandle>, MatchErrorCode> {
        if !self.with_ageing {
            return Err(MatchErrorCode::AgeingDisabled);
        }
        let state = self.state.read().expect("table lock poisoned");
        Ok(state.match_unit.sweep_entries(now_ms))
    }

    pub fn query_counters(
        &self,
        handle: EntryHandle,
    ) -> Result<(CounterValue, CounterValue), MatchErrorCode> {
        if !self.with_counters {
            return Err(MatchErrorCode::CountersDisabled);
        }
        let state = self.state.read().expect("table lock poisoned");
        Ok(state.match_unit.get_entry_meta(handle)?.counter.query())
    }

    /// Takes the table's *read* lock, mirroring the original's actual
    /// behavior rather than its `lock_write`-labeled-but-`lock_read` intent
    /// (see `DESIGN.md`'s open-question note); safe because `Counter`'s
    /// fields are atomics, not because of the lock mode.
    pub fn write_counters(
        &self,
        handle: EntryHandle,
        bytes: CounterValue,
        packets: CounterValue,
    ) -> Result<(), MatchErrorCode> {
        if !self.with_counters {
            return Err(MatchErrorCode::CountersDisabled);
        }
        let state = self.state.read().expect("table lock poisoned");
        state.match_unit.get_entry_meta(handle)?.counter.write(bytes, packets);
        Ok(())
    }

    pub fn reset_counters(&self) -> Result<(), MatchErrorCode> {
        if !self.with_counters {
            return Err(MatchErrorCode::CountersDisabled);
        }
        let state = self.state.write().expect("table lock poisoned");
        state.match_unit.reset_counters();
        Ok(())
    }

    pub fn set_meter_rates(
        &self,
        handle: EntryHandle,
        configs: &[RateConfig],
    ) -> Result<MeterErrorCode, MatchErrorCode> {
        if !self.with_meters {
            return Err(MatchErrorCode::MetersDisabled);
        }
        let state = self.state.read().expect("table lock poisoned");
        Ok(state.match_unit.get_meter(handle)?.set_rates(configs))
    }

    pub fn get_meter_rates(&self, handle: EntryHandle) -> Result<Vec<RateConfig>, MatchErrorCode> {
        if !self.with_meters {
            return Err(MatchErrorCode::MetersDisabled);
        }
        let state = self.state.read().expect("table lock poisoned");
        Ok(state.match_unit.get_meter(handle)?.get_rates())
    }

    pub fn set_direct_meters(&self, meters: Vec<Arc<dyn crate::meter::Meter>>) -> Result<(), MatchErrorCode> {
        let mut state = self.state.write().expect("table lock poisoned");
        state.match_unit.set_direct_meters(meters)
    }

    pub fn reset_state(&self) {
        let mut state = self.state.write().expect("table lock poisoned");
        state.match_unit.reset_state();
        state.default_value = None;
        state.const_default_entry = false;
        state.const_default_action = None;
        state.next_node_miss = None;
        state.next_node_miss_frozen = false;
        debug!(self.log, "table reset");
    }

    pub fn handles(&self) -> Vec<EntryHandle> {
        let state = self.state.read().expect("table lock poisoned");
        state.match_unit.handles().collect()
    }

    pub fn set_next_node(&mut self, action_id: ActionId, node: Arc<ControlFlowNode>) {
        self.next_nodes.insert(action_id, node);
    }

    pub fn set_next_node_hit(&mut self, node: Arc<ControlFlowNode>) {
        self.next_node_hit = Some(node);
    }

    /// Freezes `next_node_miss` at `node`: subsequent
    /// `set_next_node_miss_default` calls become no-ops (I7).
    pub fn set_next_node_miss(&self, node: Arc<ControlFlowNode>) {
        let mut state = self.state.write().expect("table lock poisoned");
        state.next_node_miss = Some(node);
        state.next_node_miss_frozen = true;
    }

    /// No-op once `set_next_node_miss` has frozen the field (I7).
    pub fn set_next_node_miss_default(&self, node: Arc<ControlFlowNode>) {
        let mut state = self.state.write().expect("table lock poisoned");
        if !state.next_node_miss_frozen {
            state.next_node_miss = Some(node);
        }
    }

    pub(crate) fn next_nodes(&self) -> &HashMap<ActionId, Arc<ControlFlowNode>> {
        &self.next_nodes
    }

    pub(crate) fn next_node_hit(&self) -> Option<&Arc<ControlFlowNode>> {
        self.next_node_hit.as_ref()
    }

    pub(crate) fn log(&self) -> &Logger {
        &self.log
    }

    /// `name '\n' (miss_node_name | "__NULL__") '\n' <variant serialization>`
    /// (distilled spec §6).
    pub fn serialize(&self) -> String {
        let state = self.state.read().expect("table lock poisoned");
        let mut out = String::new();
        out.push_str(&self.name);
        out.push('\n');
        match &state.next_node_miss {
            Some(n) => out.push_str(n.name()),
            None => out.push_str(NULL_SENTINEL),
        }
        out.push('\n');
        state.match_unit.serialize(&mut out);
        out
    }

    pub fn deserialize(
        &self,
        text: &str,
        catalog: &dyn ObjectCatalog,
    ) -> Result<(), SerializationError> {
        let mut reader = LineReader::new(text);
        let found_name = reader.next_token()?;
        if found_name != self.name {
            return Err(SerializationError::NameMismatch {
                expected: self.name.clone(),
                found: found_name,
            });
        }
        let miss_node = match reader.next_optional_node_name()? {
            Some(n) => Some(catalog.get_control_node(&n).ok_or_else(|| {
                SerializationError::UnknownControlNode(n.clone())
            })?),
            None => None,
        };
        let mut state = self.state.write().expect("table lock poisoned");
        state.match_unit.reset_state();
        state.match_unit.deserialize(&mut reader, catalog)?;
        state.next_node_miss = miss_node.clone();
        state.next_node_miss_frozen = miss_node.is_some();
        Ok(())
    }
}
