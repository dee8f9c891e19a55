// Copyright 2022 Oxide Computer Company

//! Per-entry metadata: counters, TTL, and the ageing clock.
//!
//! Counters are updated by the data plane under the table's *read* lock (the
//! distilled spec's concurrency model explicitly allows concurrent hits to
//! update different entries without serializing on the table lock), so the
//! individual fields are atomics rather than plain integers.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

pub type CounterValue = u64;

/// Byte/packet counter for one entry. All operations are lock-free; ordering
/// is `Relaxed` because the counter is observational bookkeeping, not a
/// synchronization point between threads — the table's RwLock is what
/// establishes happens-before between a write and a later read of the same
/// entry's other fields.
#[derive(Debug, Default)]
pub struct Counter {
    bytes: AtomicU64,
    packets: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a hit of `n_bytes` (one packet).
    pub fn increment(&self, n_bytes: u64) {
        self.bytes.fetch_add(n_bytes, Ordering::Relaxed);
        self.packets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn query(&self) -> (CounterValue, CounterValue) {
        (
            self.bytes.load(Ordering::Relaxed),
            self.packets.load(Ordering::Relaxed),
        )
    }

    /// Overwrite the counter with controller-supplied values. Per the
    /// distilled spec's open question, `MatchTableAbstract::write_counters`
    /// takes the table's read lock (mirroring the source this was distilled
    /// from, which labels the lock `lock_write` but actually calls
    /// `lock_read` — treated here as deliberate rather than "fixed", per the
    /// instruction not to guess intent on an open question). Safety against
    /// concurrent writers/readers comes from these fields being atomics, not
    /// from the table-level lock mode.
    pub fn write(&self, n_bytes: CounterValue, n_packets: CounterValue) {
        self.bytes.store(n_bytes, Ordering::Relaxed);
        self.packets.store(n_packets, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.write(0, 0);
    }
}

/// Per-entry ageing/TTL state plus the byte/packet counter.
///
/// `timeout_ms == 0` disables ageing for the entry (the default). Both
/// `timeout_ms` and `last_hit_ts_ms` are atomics: the former can be set by a
/// control-plane `set_entry_ttl` call while a concurrent data-plane hit is
/// stamping the latter.
#[derive(Debug, Default)]
pub struct EntryMeta {
    pub counter: Counter,
    timeout_ms: AtomicU32,
    last_hit_ts_ms: AtomicU64,
}

impl EntryMeta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout_ms(&self) -> u32 {
        self.timeout_ms.load(Ordering::Relaxed)
    }

    pub fn set_timeout_ms(&self, ms: u32) {
        self.timeout_ms.store(ms, Ordering::Relaxed);
    }

    pub fn last_hit_ts_ms(&self) -> u64 {
        self.last_hit_ts_ms.load(Ordering::Relaxed)
    }

    /// Stamp the ageing clock on a hit. Called under the table's read lock;
    /// racing with a concurrent `sweep_entries` read is fine by design (the
    /// distilled spec calls sweep "advisory").
    pub fn touch(&self, now_ms: u64) {
        self.last_hit_ts_ms.store(now_ms, Ordering::Relaxed);
    }

    /// Whether this entry is due for ageing as of `now_ms`.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        let timeout = self.timeout_ms();
        timeout > 0 && now_ms.saturating_sub(self.last_hit_ts_ms()) >= timeout as u64
    }
}
