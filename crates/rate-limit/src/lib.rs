//! Composable token-bucket rate limiting for the send dispatcher: a system
//! bucket shared by every tenant, an optional managed-provider bucket
//! shared by every tenant on that provider, and a per-send-config bucket.
//!
//! Acquisition across the whole chain is atomic (one Redis script checks
//! and, only if every bucket can afford it, deducts from all of them), and
//! deliberately fails open on store errors: an outage here is a cost and
//! courtesy control, not a correctness guarantee, so it must not halt
//! delivery the way a hot-state outage is allowed to.

pub mod acquire;
pub mod bucket;
pub mod chain;
pub mod error;
pub mod metrics;
pub mod resolve;

pub use {
    acquire::{acquire, AcquireResult},
    bucket::BucketSpec,
    chain::{AcquireOutcome, RateLimiter},
    error::RateLimitError,
    resolve::build_chain,
};
