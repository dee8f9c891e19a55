// Copyright 2022 Oxide Computer Company

//! Meters are an external collaborator: this crate only needs their
//! invocation contract (execute on hit, configure/report rates), not an
//! implementation of token-bucket metering itself.

use crate::packet::Packet;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateConfig {
    pub info_rate: f64,
    pub burst_size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeterErrorCode {
    Success,
    Error,
}

/// A direct meter instance, owned 1:1 by a match entry. Implementors are
/// responsible for their own interior mutability: `execute` is called
/// through a shared reference while the table holds only its read lock, so
/// concurrent hits on the same entry's meter must not race.
pub trait Meter: Send + Sync {
    fn execute(&self, pkt: &mut dyn Packet) -> u64;
    fn set_rates(&self, configs: &[RateConfig]) -> MeterErrorCode;
    fn get_rates(&self) -> Vec<RateConfig>;
}
