// Copyright 2022 Oxide Computer Company

//! A software match-action runtime for programmable dataplanes: pluggable
//! match units (exact/LPM/ternary/range), direct and indirect match tables
//! (with and without selection groups), counters, direct meters, entry
//! ageing, and a line-oriented serialization format for checkpoint/restore.

pub mod action;
pub mod control_flow;
pub mod dtrace;
pub mod error;
pub mod handle;
pub mod key;
pub mod logging;
pub mod lookup;
pub mod match_unit;
pub mod meta;
pub mod meter;
pub mod packet;
pub mod profile;
pub mod serial;
pub mod table;

pub use error::{MatchErrorCode, SerializationError};
pub use handle::EntryHandle;
pub use key::{BigUintKey, Key, MatchKey, Prefix, Selector, Ternary};
