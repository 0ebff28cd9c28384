//! Ambient logging and metrics wiring shared by every binary in the
//! workspace. Trace/metric *export* to a collector is out of scope; this
//! crate only configures `tracing` output and serves a local `/metrics`
//! endpoint for whatever scrapes it.

pub mod metrics;
pub mod panic_hook;
pub mod tracing;
