// Copyright 2022 Oxide Computer Company

//! The action-function executor and action-data representation are out of
//! scope for this crate (the distilled spec lists both as external
//! collaborators); [`ActionFn`] is the narrow contract a match table needs
//! in order to bind, execute, and serialize an action, and [`ActionEntry`]
//! is the `{ action_fn, action_data, next_node }` tuple the spec's data model
//! names directly.

use std::fmt;
use std::sync::Arc;

use crate::control_flow::ControlFlowNode;
use crate::packet::Packet;
use crate::serial::{hex_decode, hex_encode, LineReader, NULL_SENTINEL};

pub type ActionId = u32;

/// Opaque action-data blob. The action function is responsible for
/// interpreting its own bytes; the match-table runtime only ever moves this
/// around and serializes it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ActionData(pub Vec<u8>);

/// One action as installed in a P4 program: an id, a name (for
/// serialization and diagnostics), and the function body itself.
pub trait ActionFn: fmt::Debug + Send + Sync {
    fn id(&self) -> ActionId;
    fn name(&self) -> &str;
    fn call(&self, data: &ActionData, pkt: &mut dyn Packet);
}

/// A no-op action with a reserved id, used for the table-wide "empty" action
/// entry an indirect table returns on a miss with no default set (see
/// `MatchTableIndirect::lookup` in the source this was distilled from).
#[derive(Debug)]
pub struct EmptyActionFn;

pub const EMPTY_ACTION_ID: ActionId = u32::MAX;

impl ActionFn for EmptyActionFn {
    fn id(&self) -> ActionId {
        EMPTY_ACTION_ID
    }
    fn name(&self) -> &str {
        "__empty__"
    }
    fn call(&self, _data: &ActionData, _pkt: &mut dyn Packet) {}
}

/// A bound action function plus its action data: `ActionFn(action_data)`.
#[derive(Clone)]
pub struct ActionFnEntry {
    pub action_fn: Arc<dyn ActionFn>,
    pub action_data: Arc<ActionData>,
}

impl fmt::Debug for ActionFnEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionFnEntry")
            .field("action_fn", &self.action_fn.name())
            .field("action_data", &self.action_data)
            .finish()
    }
}

impl ActionFnEntry {
    pub fn new(action_fn: Arc<dyn ActionFn>, action_data: ActionData) -> Self {
        Self {
            action_fn,
            action_data: Arc::new(action_data),
        }
    }

    pub fn id(&self) -> ActionId {
        self.action_fn.id()
    }

    pub fn call(&self, pkt: &mut dyn Packet) {
        self.action_fn.call(&self.action_data, pkt)
    }

    fn serialize(&self, out: &mut String) {
        out.push_str(self.action_fn.name());
        out.push(' ');
        out.push_str(&hex_encode(&self.action_data.0));
        out.push('\n');
    }
}

/// `{ action_fn, action_data, next_node }` — the value type stored by a
/// direct match unit, and the type an indirect table's action profile
/// ultimately resolves an `IndirectIndex` to.
#[derive(Clone)]
pub struct ActionEntry {
    pub action: ActionFnEntry,
    pub next_node: Option<Arc<ControlFlowNode>>,
}

impl fmt::Debug for ActionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionEntry")
            .field("action", &self.action)
            .field(
                "next_node",
                &self.next_node.as_ref().map(|n| n.name().to_string()),
            )
            .finish()
    }
}

impl ActionEntry {
    pub fn new(action: ActionFnEntry, next_node: Option<Arc<ControlFlowNode>>) -> Self {
        Self { action, next_node }
    }

    /// The shared "empty" entry returned by an indirect table on a miss with
    /// no default set.
    pub fn empty(miss_node: Option<Arc<ControlFlowNode>>) -> Self {
        Self {
            action: ActionFnEntry::new(Arc::new(EmptyActionFn), ActionData::default()),
            next_node: miss_node,
        }
    }

    pub fn serialize(&self, out: &mut String) {
        self.action.serialize(out);
        match &self.next_node {
            Some(n) => out.push_str(n.name()),
            None => out.push_str(NULL_SENTINEL),
        }
        out.push('\n');
    }

    pub fn deserialize(
        reader: &mut LineReader<'_>,
        catalog: &dyn crate::control_flow::ObjectCatalog,
    ) -> Result<Self, crate::error::SerializationError> {
        let action_line = reader.next_line()?;
        let mut parts = action_line.splitn(2, ' ');
        let name = parts.next().unwrap_or_default();
        let data_hex = parts.next().unwrap_or_default();
        let action_fn = catalog
            .get_action(name)
            .ok_or_else(|| crate::error::SerializationError::UnknownAction(name.into()))?;
        let action_data = ActionData(hex_decode(data_hex)?);
        let next_node = match reader.next_optional_node_name()? {
            Some(n) => Some(catalog.get_control_node(&n).ok_or_else(|| {
                crate::error::SerializationError::UnknownControlNode(n.clone())
            })?),
            None => None,
        };
        Ok(Self {
            action: ActionFnEntry::new(action_fn, action_data),
            next_node,
        })
    }
}

impl crate::serial::EntryValue for ActionEntry {
    fn serialize(&self, out: &mut String) {
        ActionEntry::serialize(self, out)
    }

    fn deserialize(
        reader: &mut LineReader<'_>,
        catalog: &dyn crate::control_flow::ObjectCatalog,
    ) -> Result<Self, crate::error::SerializationError> {
        ActionEntry::deserialize(reader, catalog)
    }
}
