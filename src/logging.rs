// Copyright 2022 Oxide Computer Company

//! Control-plane logging, built the way the teacher's declared (but, in the
//! retrieved slice, unused) `slog` stack is meant to be assembled: an async
//! drain over a term decorator, with `slog-envlogger` honoring `RUST_LOG` the
//! same way the rest of the Oxide stack does. The fast path never logs
//! through this — `dtrace.rs`'s USDT probes are the only data-plane
//! observability this crate adds.

use slog::{o, Drain};

/// A table-ready logger. Every `MatchTableAbstract` gets one via
/// `.new(o!("table" => name))` so log lines are attributable to a specific
/// table instance.
pub fn root_logger() -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_envlogger::new(drain).fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    slog::Logger::root(drain, o!())
}
