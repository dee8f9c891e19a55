// Copyright 2022 Oxide Computer Company

use thiserror::Error;

/// Typed status code returned by every control-plane operation on a match
/// table. The fast path (`apply_action`) never produces one of these: a miss
/// is not an error.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchErrorCode {
    #[error("success")]
    Success,

    #[error("table is full")]
    TableFull,

    #[error("an entry already exists for this key")]
    DuplicateEntry,

    #[error("match key does not match the table's key shape")]
    BadMatchKey,

    #[error("member handle is not valid in the bound action profile")]
    InvalidMbrHandle,

    #[error("group handle is not valid in the bound action profile")]
    InvalidGrpHandle,

    #[error("group is empty")]
    EmptyGrp,

    #[error("handle does not refer to a live entry")]
    InvalidHandle,

    #[error("handle refers to a freed generation of this entry slot")]
    ExpiredHandle,

    #[error("table was not constructed with counters enabled")]
    CountersDisabled,

    #[error("table was not constructed with direct meters bound")]
    MetersDisabled,

    #[error("table was not constructed with ageing enabled")]
    AgeingDisabled,

    #[error("table has no default entry set")]
    NoDefaultEntry,

    #[error("default entry is const and cannot be replaced")]
    DefaultEntryIsConst,

    #[error("default action is const and cannot be replaced by a different action")]
    DefaultActionIsConst,

    #[error("internal error")]
    Error,
}

impl MatchErrorCode {
    pub fn is_success(&self) -> bool {
        matches!(self, MatchErrorCode::Success)
    }
}

/// Failures that can occur while restoring a table from its serialized text
/// form. These are distinct from [`MatchErrorCode`]: they are programmer/
/// tooling-facing (a corrupt snapshot, a catalog that no longer has the nodes
/// or actions referenced by the snapshot) rather than controller-facing, and
/// the core spec treats a deserialize mismatch as an abort condition, which in
/// safe Rust means a `Result` the embedder is expected to propagate or
/// `.unwrap()`, not a code the control plane is meant to handle gracefully.
#[derive(Error, Debug)]
pub enum SerializationError {
    #[error("unexpected end of serialized table data")]
    UnexpectedEof,

    #[error("table name mismatch: expected '{expected}', found '{found}'")]
    NameMismatch { expected: String, found: String },

    #[error("unknown control-flow node '{0}' referenced in serialized data")]
    UnknownControlNode(String),

    #[error("unknown action id '{0}' referenced in serialized data")]
    UnknownAction(String),

    #[error("malformed field in serialized table data: {0}")]
    Malformed(String),
}
