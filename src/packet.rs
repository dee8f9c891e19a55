// Copyright 2022 Oxide Computer Company

//! The packet representation and the header-value vector (PHV) it carries
//! are out of scope for this crate; only the narrow contract a match table
//! needs from them is specified here, mirroring the distilled spec's
//! `Packet`/PHV collaborator contract.

use std::time::{SystemTime, UNIX_EPOCH};

/// The subset of the packet/PHV API a match table needs: a place to write the
/// direct-meter color, packet/copy identifiers for event logging, and the
/// entry-index stamp left behind by `apply_action`.
pub trait Packet {
    fn phv_mut(&mut self) -> &mut dyn Phv;
    fn packet_id(&self) -> u64;
    fn copy_id(&self) -> u64;
    fn set_entry_index(&mut self, index: u32);
    /// Packet length in bytes, for counter accounting.
    fn len_bytes(&self) -> usize;
}

/// The header-value vector: a flat namespace of `(header, offset) -> value`
/// fields a direct meter's color gets written into.
pub trait Phv {
    fn set_field(&mut self, header: &str, offset: usize, value: u64);
    fn get_field(&self, header: &str, offset: usize) -> Option<u64>;
}

/// Milliseconds since the Unix epoch, standing in for the source's
/// `Packet::clock::now()`.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_millis() as u64
}
