//! Hot, authoritative-while-processing state for in-flight batches: per
//! recipient status and `{sent, failed}` counters, backed by Redis and
//! guarded by a sliding-window circuit breaker so a flaky store fails fast
//! instead of stalling every chunk worker on it.
//!
//! The postgres mirror in `database` only needs to catch up periodically;
//! this crate is what the chunk processor actually checks before sending
//! and writes to right after.

pub mod breaker;
pub mod error;
pub mod store;

pub use {
    breaker::{BreakerOpen, CircuitSnapshot, SlidingWindowBreaker},
    error::HotStateError,
    store::{HotStateStore, RecipientResult},
};
