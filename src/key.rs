// Copyright 2022 Oxide Computer Company

//! Match keys.
//!
//! A [`Key`] is one field's worth of match specification as stored in an
//! entry (value for exact, value+mask for ternary, prefix for LPM, lo/hi for
//! range). A [`MatchKey`] is the ordered vector of those across a table's
//! keyset. The raw field *values* a packet presents at lookup time — the
//! output of the external match-key builder — are a plain `Vec<BigUint>`:
//! they carry no matching semantics of their own, only the stored [`Key`]
//! side does.

use std::net::IpAddr;

use num::bigint::BigUint;
use num::ToPrimitive;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Hash, Eq, Serialize, Deserialize)]
pub struct BigUintKey {
    pub value: BigUint,
    pub width: usize,
}

#[derive(Debug, Clone, PartialEq, Hash, Eq, Serialize, Deserialize)]
pub enum Key {
    Exact(BigUintKey),
    Range(BigUintKey, BigUintKey),
    Ternary(Ternary),
    Lpm(Prefix),
}

impl Default for Key {
    fn default() -> Self {
        Self::Ternary(Ternary::default())
    }
}

#[derive(Debug, Clone, PartialEq, Hash, Eq, Serialize, Deserialize)]
pub enum Ternary {
    DontCare,
    Value(BigUintKey),
    Masked(BigUint, BigUint, usize),
}

impl Default for Ternary {
    fn default() -> Self {
        Self::DontCare
    }
}

#[derive(Debug, Clone, PartialEq, Hash, Eq, Serialize, Deserialize)]
pub struct Prefix {
    pub addr: IpAddr,
    pub len: u8,
}

/// The ordered vector of per-field [`Key`]s that make up one entry's match
/// specification. `add_entry`/`retrieve_handle`/`get_entry_from_key` all
/// operate on this shape.
pub type MatchKey = Vec<Key>;

/// The raw, unmasked field values a packet presents at lookup time, as
/// produced by the external match-key builder.
pub type Selector = Vec<BigUint>;

pub fn key_matches(selector: &BigUint, key: &Key) -> bool {
    match key {
        Key::Exact(x) => selector == &x.value,
        Key::Range(begin, end) => {
            selector >= &begin.value && selector <= &end.value
        }
        Key::Ternary(t) => match t {
            Ternary::DontCare => true,
            Ternary::Value(x) => selector == &x.value,
            Ternary::Masked(x, m, _) => selector & m == x & m,
        },
        Key::Lpm(p) => match p.addr {
            IpAddr::V6(addr) => {
                assert!(p.len <= 128);
                let key: u128 = addr.into();
                let mask = if p.len == 128 {
                    u128::MAX
                } else if p.len == 0 {
                    0u128
                } else {
                    ((1u128 << p.len) - 1) << (128 - p.len)
                };
                let mask = mask.to_be();
                let selector_v6 = selector.to_u128().unwrap_or(0);
                selector_v6 & mask == key & mask
            }
            IpAddr::V4(addr) => {
                assert!(p.len <= 32);
                let key: u32 = addr.into();
                let mask = if p.len == 32 {
                    u32::MAX
                } else {
                    ((1u32 << p.len) - 1) << (32 - p.len)
                };
                let selector_v4 = selector.to_u32().unwrap_or(0);
                selector_v4 & mask == key & mask
            }
        },
    }
}

pub fn keyset_matches(selector: &[BigUint], key: &[Key]) -> bool {
    if selector.len() != key.len() {
        return false;
    }
    selector
        .iter()
        .zip(key.iter())
        .all(|(s, k)| key_matches(s, k))
}

/// The LPM prefix length of the one `Key::Lpm` field in a keyset, if any. The
/// distilled spec's I5 and the teacher's own `sort_entries`/
/// `prune_entries_by_lpm` both assume at most one LPM field per keyset (the
/// same assumption the prior art attributes to BMv2 itself).
pub fn lpm_len(key: &[Key]) -> Option<u8> {
    key.iter().find_map(|k| match k {
        Key::Lpm(p) => Some(p.len),
        _ => None,
    })
}
