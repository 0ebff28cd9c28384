//! Core domain types shared by every component of the send dispatcher.
//!
//! This crate has no I/O of its own: it only describes the shapes that flow
//! between the batch orchestrator, the chunk processor, the hot state store
//! and the durable queue.

pub mod batch;
pub mod chunk;
pub mod error;
pub mod recipient;
pub mod send_config;

pub use {
    batch::{Batch, BatchId, BatchStatus},
    chunk::ChunkJob,
    error::DispatchError,
    recipient::{Recipient, RecipientId, RecipientStatus},
    send_config::{EmbeddedSendConfig, ModuleKind, RateLimitOverride, SendConfigId},
};

/// Opaque tenant identifier. Kept as a newtype (rather than a bare `String`)
/// so it can't be accidentally swapped with a batch or recipient id at a call
/// site.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, serde::Serialize, serde::Deserialize)]
pub struct TenantId(pub String);

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TenantId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for TenantId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}
