// Copyright 2022 Oxide Computer Company

//! The factory (C7). Match-unit strategy selection (`"exact"`, `"lpm"`,
//! `"ternary"`, `"range"`) already lives behind `MatchUnit::new` via
//! `crate::lookup::create`, which panics on an unrecognized match type —
//! the same abort-on-programming-error the source this was distilled from
//! gives its anonymous-namespace `create_match_unit<V>` helper. What remains
//! for this module is table-class selection: one constructor per variant,
//! mirroring the three `*::create` static methods in that source.

use std::collections::HashMap;
use std::sync::Arc;

use slog::Logger;

use crate::action::ActionId;
use crate::control_flow::ControlFlowNode;
use crate::key::Selector;
use crate::packet::Packet;
use crate::profile::ActionProfile;

use super::direct::MatchTable;
use super::indirect::MatchTableIndirect;
use super::indirect_ws::MatchTableIndirectWS;

#[allow(clippy::too_many_arguments)]
pub fn create_direct(
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
) -> MatchTable {
    MatchTable::create(
        name,
        match_type,
        size,
        next_nodes,
        next_node_miss_default,
        with_counters,
        with_ageing,
        with_meters,
        key_builder,
        log,
    )
}

#[allow(clippy::too_many_arguments)]
pub fn create_indirect(
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
) -> MatchTableIndirect {
    MatchTableIndirect::create(
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
    )
}

#[allow(clippy::too_many_arguments)]
pub fn create_indirect_ws(
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
) -> MatchTableIndirectWS {
    MatchTableIndirectWS::create(
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
    )
}
