// Copyright 2022 Oxide Computer Company

//! Action profiles (member/group tables shared by indirect match tables) are
//! an external collaborator: this crate only needs the contract the
//! distilled spec names in §6 — membership/group validation, reference
//! counting, and resolving an index to an [`ActionEntry`].

use std::fmt;

use crate::action::ActionEntry;
use crate::packet::Packet;

pub type MbrHandle = u32;
pub type GrpHandle = u32;

/// A `{ member(mbr_hdl) | group(grp_hdl) }` tagged union — the value type
/// stored by indirect match units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndirectIndex {
    Member(MbrHandle),
    Group(GrpHandle),
}

impl IndirectIndex {
    pub fn is_member(&self) -> bool {
        matches!(self, IndirectIndex::Member(_))
    }

    pub fn is_group(&self) -> bool {
        matches!(self, IndirectIndex::Group(_))
    }

    pub fn member(&self) -> Option<MbrHandle> {
        match self {
            IndirectIndex::Member(m) => Some(*m),
            IndirectIndex::Group(_) => None,
        }
    }

    pub fn group(&self) -> Option<GrpHandle> {
        match self {
            IndirectIndex::Group(g) => Some(*g),
            IndirectIndex::Member(_) => None,
        }
    }
}

impl fmt::Display for IndirectIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndirectIndex::Member(m) => write!(f, "mbr({m})"),
            IndirectIndex::Group(g) => write!(f, "grp({g})"),
        }
    }
}

impl crate::serial::EntryValue for IndirectIndex {
    fn serialize(&self, out: &mut String) {
        match self {
            IndirectIndex::Member(m) => out.push_str(&format!("mbr {m}\n")),
            IndirectIndex::Group(g) => out.push_str(&format!("grp {g}\n")),
        }
    }

    fn deserialize(
        reader: &mut crate::serial::LineReader<'_>,
        _catalog: &dyn crate::control_flow::ObjectCatalog,
    ) -> Result<Self, crate::error::SerializationError> {
        let line = reader.next_line()?;
        let mut parts = line.split_whitespace();
        let tag = parts.next().unwrap_or_default();
        let handle: u32 = parts
            .next()
            .ok_or_else(|| crate::error::SerializationError::Malformed("missing index handle".into()))?
            .parse()
            .map_err(|_| crate::error::SerializationError::Malformed("invalid index handle".into()))?;
        match tag {
            "mbr" => Ok(IndirectIndex::Member(handle)),
            "grp" => Ok(IndirectIndex::Group(handle)),
            other => Err(crate::error::SerializationError::Malformed(format!(
                "unknown indirect index tag '{other}'"
            ))),
        }
    }
}

/// The member/group pool shared by one or more indirect match tables.
///
/// Ref counts must be atomic or guarded by the profile's own lock (the
/// distilled spec's §5): a table invokes `ref_count_increase`/`_decrease`
/// while holding its own write lock, but the profile itself may be shared
/// across tables each taking their own lock independently.
pub trait ActionProfile: Send + Sync {
    fn is_valid_mbr(&self, h: MbrHandle) -> bool;
    fn is_valid_grp(&self, h: GrpHandle) -> bool;
    fn group_is_empty(&self, h: GrpHandle) -> bool;
    fn ref_count_increase(&self, idx: IndirectIndex);
    fn ref_count_decrease(&self, idx: IndirectIndex);
    fn lookup(&self, pkt: &dyn Packet, idx: IndirectIndex) -> ActionEntry;
    fn dump_entry(&self, idx: IndirectIndex) -> String;
}
