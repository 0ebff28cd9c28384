//! The `batches` table. The Batch Orchestrator owns every write to `status`;
//! the postgres syncer periodically upserts `sent_count`/`failed_count` from
//! hot-state counters so this table converges with, but never drives, the
//! authoritative counts held in Redis while a batch is in flight.

use {
    chrono::{DateTime, Utc},
    model::batch::{Batch, BatchId, BatchStatus},
    sqlx::{PgConnection, PgExecutor},
    std::str::FromStr,
    uuid::Uuid,
};

#[derive(Debug, sqlx::FromRow)]
struct BatchRow {
    id: Uuid,
    tenant_id: String,
    send_config_id: Option<Uuid>,
    module: String,
    payload_defaults: serde_json::Value,
    total_recipients: i64,
    sent_count: i64,
    failed_count: i64,
    status: String,
    dry_run: bool,
    created_at: DateTime<Utc>,
    scheduled_at: Option<DateTime<Utc>>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<BatchRow> for Batch {
    type Error = sqlx::Error;

    fn try_from(row: BatchRow) -> Result<Self, Self::Error> {
        let decode_err = |err: strum::ParseError| sqlx::Error::Decode(err.to_string().into());
        Ok(Batch {
            id: BatchId(row.id),
            tenant_id: row.tenant_id.into(),
            send_config_id: row.send_config_id.map(model::send_config::SendConfigId),
            module: model::send_config::ModuleKind::from_str(&row.module).map_err(decode_err)?,
            payload_defaults: row.payload_defaults,
            total_recipients: row.total_recipients.max(0) as u64,
            sent_count: row.sent_count.max(0) as u64,
            failed_count: row.failed_count.max(0) as u64,
            status: BatchStatus::from_str(&row.status).map_err(decode_err)?,
            dry_run: row.dry_run,
            created_at: row.created_at,
            scheduled_at: row.scheduled_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

/// Inserts a newly created batch in `draft` status.
pub async fn insert(ex: impl PgExecutor<'_>, batch: &Batch) -> sqlx::Result<()> {
    const QUERY: &str = r#"
        INSERT INTO batches (
            id, tenant_id, send_config_id, module, payload_defaults,
            total_recipients, sent_count, failed_count, status, dry_run,
            created_at, scheduled_at, started_at, completed_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
    "#;
    sqlx::query(QUERY)
        .bind(batch.id.0)
        .bind(batch.tenant_id.0.as_str())
        .bind(batch.send_config_id.map(|id| id.0))
        .bind(batch.module.to_string())
        .bind(&batch.payload_defaults)
        .bind(batch.total_recipients as i64)
        .bind(batch.sent_count as i64)
        .bind(batch.failed_count as i64)
        .bind(batch.status.to_string())
        .bind(batch.dry_run)
        .bind(batch.created_at)
        .bind(batch.scheduled_at)
        .bind(batch.started_at)
        .bind(batch.completed_at)
        .execute(ex)
        .await
        .map(|_| ())
}

pub async fn get(ex: impl PgExecutor<'_>, id: BatchId) -> sqlx::Result<Option<Batch>> {
    const QUERY: &str = "SELECT * FROM batches WHERE id = $1";
    let row: Option<BatchRow> = sqlx::query_as(QUERY).bind(id.0).fetch_optional(ex).await?;
    row.map(Batch::try_from).transpose()
}

/// Moves a batch into a new status. Callers are responsible for only
/// calling this with transitions the orchestrator actually permits.
pub async fn set_status(
    ex: impl PgExecutor<'_>,
    id: BatchId,
    status: BatchStatus,
) -> sqlx::Result<()> {
    const QUERY: &str = "UPDATE batches SET status = $2 WHERE id = $1";
    sqlx::query(QUERY)
        .bind(id.0)
        .bind(status.to_string())
        .execute(ex)
        .await
        .map(|_| ())
}

pub async fn mark_started(ex: impl PgExecutor<'_>, id: BatchId, at: DateTime<Utc>) -> sqlx::Result<()> {
    const QUERY: &str =
        "UPDATE batches SET status = 'processing', started_at = $2 WHERE id = $1";
    sqlx::query(QUERY)
        .bind(id.0)
        .bind(at)
        .execute(ex)
        .await
        .map(|_| ())
}

pub async fn mark_completed(
    ex: impl PgExecutor<'_>,
    id: BatchId,
    status: BatchStatus,
    at: DateTime<Utc>,
) -> sqlx::Result<()> {
    const QUERY: &str = "UPDATE batches SET status = $2, completed_at = $3 WHERE id = $1";
    sqlx::query(QUERY)
        .bind(id.0)
        .bind(status.to_string())
        .bind(at)
        .execute(ex)
        .await
        .map(|_| ())
}

/// Upserts the counters the postgres syncer drains from hot state. Never
/// decreases a counter: hot state's counts are monotonic for a given batch,
/// but a retried sync call must still be a no-op, not a regression, if it
/// races with a newer one.
pub async fn sync_counters(
    ex: impl PgExecutor<'_>,
    id: BatchId,
    sent_count: u64,
    failed_count: u64,
) -> sqlx::Result<()> {
    const QUERY: &str = r#"
        UPDATE batches
        SET sent_count = GREATEST(sent_count, $2), failed_count = GREATEST(failed_count, $3)
        WHERE id = $1
    "#;
    sqlx::query(QUERY)
        .bind(id.0)
        .bind(sent_count as i64)
        .bind(failed_count as i64)
        .execute(ex)
        .await
        .map(|_| ())
}

/// Batches scheduled to start at or before `now`, still in `scheduled`
/// status. Used by the scheduler background service.
pub async fn list_due_scheduled(
    ex: impl PgExecutor<'_>,
    now: DateTime<Utc>,
    limit: i64,
) -> sqlx::Result<Vec<BatchId>> {
    const QUERY: &str = r#"
        SELECT id FROM batches
        WHERE status = 'scheduled' AND scheduled_at <= $1
        ORDER BY scheduled_at
        LIMIT $2
    "#;
    let ids: Vec<(Uuid,)> = sqlx::query_as(QUERY)
        .bind(now)
        .bind(limit)
        .fetch_all(ex)
        .await?;
    Ok(ids.into_iter().map(|(id,)| BatchId(id)).collect())
}

/// Every batch currently `processing`. Used by the postgres syncer to know
/// which batches still have counters worth draining from hot state.
pub async fn list_processing(ex: impl PgExecutor<'_>) -> sqlx::Result<Vec<BatchId>> {
    const QUERY: &str = "SELECT id FROM batches WHERE status = 'processing'";
    let ids: Vec<(Uuid,)> = sqlx::query_as(QUERY).fetch_all(ex).await?;
    Ok(ids.into_iter().map(|(id,)| BatchId(id)).collect())
}

/// Batches stuck in `processing` since before `threshold`. Used by the
/// stuck-batch recovery background service.
pub async fn list_stuck_processing(
    ex: impl PgExecutor<'_>,
    threshold: DateTime<Utc>,
) -> sqlx::Result<Vec<BatchId>> {
    const QUERY: &str = r#"
        SELECT id FROM batches
        WHERE status = 'processing' AND started_at IS NOT NULL AND started_at < $1
    "#;
    let ids: Vec<(Uuid,)> = sqlx::query_as(QUERY).bind(threshold).fetch_all(ex).await?;
    Ok(ids.into_iter().map(|(id,)| BatchId(id)).collect())
}

/// Convenience used by tests that want a single-connection executor type
/// without pulling in `sqlx::PgPool` at the call site.
pub type Conn = PgConnection;
