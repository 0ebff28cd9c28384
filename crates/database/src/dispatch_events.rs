//! Stores normalized provider webhook events (`sent`, `delivered`,
//! `bounced`, ...) flushed in batches by the buffered event logger. This is
//! the durable sink that survives the in-memory dual-buffer; the external
//! columnar analytics store this data also feeds is out of scope here.

use {
    chrono::{DateTime, Utc},
    sqlx::PgExecutor,
};

/// A single normalized provider callback, matching the webhook callback
/// contract: `{provider, eventType, providerMessageId, timestamp, metadata,
/// rawEvent}`.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct DispatchEvent {
    pub provider: String,
    pub event_type: String,
    pub provider_message_id: String,
    pub timestamp: DateTime<Utc>,
    pub metadata: serde_json::Value,
    pub raw_event: serde_json::Value,
}

/// Bulk-inserts a flushed buffer of events in one round-trip. Called by the
/// buffered event logger's auto-flush; callers swallow errors from this
/// after logging them rather than propagating, matching the "flush errors
/// never block new writes" rule for the dual buffer.
pub async fn insert_batch(ex: impl PgExecutor<'_>, events: &[DispatchEvent]) -> sqlx::Result<()> {
    if events.is_empty() {
        return Ok(());
    }
    let providers: Vec<&str> = events.iter().map(|e| e.provider.as_str()).collect();
    let event_types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
    let provider_message_ids: Vec<&str> = events
        .iter()
        .map(|e| e.provider_message_id.as_str())
        .collect();
    let timestamps: Vec<DateTime<Utc>> = events.iter().map(|e| e.timestamp).collect();
    let metadata: Vec<&serde_json::Value> = events.iter().map(|e| &e.metadata).collect();
    let raw_events: Vec<&serde_json::Value> = events.iter().map(|e| &e.raw_event).collect();

    const QUERY: &str = r#"
        INSERT INTO dispatch_events
            (provider, event_type, provider_message_id, timestamp, metadata, raw_event)
        SELECT * FROM UNNEST(
            $1::text[], $2::text[], $3::text[], $4::timestamptz[], $5::jsonb[], $6::jsonb[]
        )
    "#;
    sqlx::query(QUERY)
        .bind(providers)
        .bind(event_types)
        .bind(provider_message_ids)
        .bind(timestamps)
        .bind(metadata)
        .bind(raw_events)
        .execute(ex)
        .await
        .map(|_| ())
}

/// Deletes rows before the provided timestamp. Retention cleanup, analogous
/// to the order-events table's own periodic trim.
pub async fn delete_before(ex: impl PgExecutor<'_>, timestamp: DateTime<Utc>) -> sqlx::Result<u64> {
    const QUERY: &str = "DELETE FROM dispatch_events WHERE timestamp < $1";
    sqlx::query(QUERY)
        .bind(timestamp)
        .execute(ex)
        .await
        .map(|result| result.rows_affected())
}
