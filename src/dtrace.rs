// Copyright 2022 Oxide Computer Company

//! Fast-path hit/miss telemetry via USDT probes, grounded in the teacher's
//! own `crate::p4rs_provider::match_miss!` probe calls in `table.rs`. These
//! fire unconditionally on every `apply_action`; with no consumer attached
//! they cost a handful of nops, which is why this is the data plane's only
//! observability surface (ordinary `slog` logging is reserved for the
//! control plane, see `logging.rs`).

#[usdt::provider]
pub mod p4rs_provider {
    fn table_hit(table: &str) {}
    fn table_miss(table: &str) {}
}
