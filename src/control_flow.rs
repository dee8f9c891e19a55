// Copyright 2022 Oxide Computer Company

//! The control-flow graph itself is out of scope for this crate: nodes are
//! opaque, named handles resolved through an [`ObjectCatalog`] (the
//! equivalent of bmv2's `P4Objects`).

use std::fmt;
use std::sync::Arc;

use crate::action::ActionFn;

/// An opaque node in the pipeline's control-flow graph. Two nodes are equal
/// iff they share a name — the pipeline/codegen layer that owns the graph is
/// responsible for name uniqueness, the same way bmv2 resolves nodes by name
/// through `P4Objects::get_control_node`.
#[derive(Debug, Clone)]
pub struct ControlFlowNode {
    name: Arc<str>,
}

impl ControlFlowNode {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for ControlFlowNode {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}
impl Eq for ControlFlowNode {}

impl fmt::Display for ControlFlowNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// The catalog a table consults to resolve names back into live objects when
/// deserializing a snapshot. Stands in for bmv2's `P4Objects`.
pub trait ObjectCatalog {
    fn get_control_node(&self, name: &str) -> Option<Arc<ControlFlowNode>>;
    fn get_action(&self, name: &str) -> Option<Arc<dyn ActionFn>>;
}
