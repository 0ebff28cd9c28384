//! Stream and subject naming used by the core. Kept in one place so the
//! chunk processor and the batch orchestrator can't drift on the pattern.

use model::TenantId;

pub const BATCHES_STREAM: &str = "batches";
pub const BATCHES_SUBJECT: &str = "batches";
pub const BATCH_PROCESSOR_CONSUMER: &str = "batch-processor";

pub const CHUNKS_STREAM: &str = "chunks";
pub const WEBHOOKS_STREAM: &str = "webhooks";

/// `chunks.{tenantId}` — one subject per tenant, one consumer per tenant,
/// lazily created on first use.
pub fn chunk_subject(tenant_id: &TenantId) -> String {
    format!("chunks.{}", tenant_id.0)
}

/// The per-tenant chunk consumer's durable name. Stable across restarts so
/// `ensure(tenantId)` always binds to the same server-side consumer.
pub fn chunk_consumer_name(tenant_id: &TenantId) -> String {
    format!("chunk-consumer-{}", tenant_id.0)
}

/// `webhooks.{provider}` — inbound provider webhook events.
pub fn webhook_subject(provider: &str) -> String {
    format!("webhooks.{provider}")
}
