//! The `recipients` table. Rows are written once at batch creation and then
//! only ever have their `status`/attempt columns synced from hot state;
//! nothing else mutates them after creation, matching the ownership rule
//! that the chunk processor (via hot state) is the sole source of truth for
//! recipient status while a batch is in flight.

use {
    chrono::{DateTime, Utc},
    model::recipient::{Recipient, RecipientId, RecipientStatus},
    serde_json::Value,
    sqlx::PgExecutor,
    std::str::FromStr,
    uuid::Uuid,
};

#[derive(Debug, sqlx::FromRow)]
struct RecipientRow {
    id: Uuid,
    batch_id: Uuid,
    address: String,
    name: Option<String>,
    variables: Value,
    status: String,
    provider_message_id: Option<String>,
    error_message: Option<String>,
    sent_at: Option<DateTime<Utc>>,
}

impl TryFrom<RecipientRow> for Recipient {
    type Error = sqlx::Error;

    fn try_from(row: RecipientRow) -> Result<Self, Self::Error> {
        let variables = serde_json::from_value(row.variables)
            .map_err(|err| sqlx::Error::Decode(err.into()))?;
        Ok(Recipient {
            id: RecipientId(row.id),
            batch_id: model::batch::BatchId(row.batch_id),
            address: row.address,
            name: row.name,
            variables,
            status: RecipientStatus::from_str(&row.status)
                .map_err(|err| sqlx::Error::Decode(err.to_string().into()))?,
            provider_message_id: row.provider_message_id,
            error_message: row.error_message,
            sent_at: row.sent_at,
        })
    }
}

/// Bulk-inserts every recipient of a newly created batch in a single
/// round-trip using `UNNEST`, the way a batch of a few thousand rows should
/// be written rather than one `INSERT` per recipient.
pub async fn insert_batch(ex: impl PgExecutor<'_>, recipients: &[Recipient]) -> sqlx::Result<()> {
    if recipients.is_empty() {
        return Ok(());
    }
    let ids: Vec<Uuid> = recipients.iter().map(|r| r.id.0).collect();
    let batch_ids: Vec<Uuid> = recipients.iter().map(|r| r.batch_id.0).collect();
    let addresses: Vec<&str> = recipients.iter().map(|r| r.address.as_str()).collect();
    let names: Vec<Option<&str>> = recipients.iter().map(|r| r.name.as_deref()).collect();
    let variables: Vec<Value> = recipients
        .iter()
        .map(|r| serde_json::to_value(&r.variables).unwrap_or(Value::Null))
        .collect();
    let statuses: Vec<String> = recipients.iter().map(|r| r.status.to_string()).collect();

    const QUERY: &str = r#"
        INSERT INTO recipients (id, batch_id, address, name, variables, status)
        SELECT * FROM UNNEST($1::uuid[], $2::uuid[], $3::text[], $4::text[], $5::jsonb[], $6::text[])
    "#;
    sqlx::query(QUERY)
        .bind(ids)
        .bind(batch_ids)
        .bind(addresses)
        .bind(names)
        .bind(variables)
        .bind(statuses)
        .execute(ex)
        .await
        .map(|_| ())
}

/// Bulk fetch by id, used by the chunk processor to load full recipient
/// rows (address, variables) for the ids named in a chunk job.
pub async fn list_by_ids(ex: impl PgExecutor<'_>, ids: &[RecipientId]) -> sqlx::Result<Vec<Recipient>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    const QUERY: &str = "SELECT * FROM recipients WHERE id = ANY($1)";
    let ids: Vec<Uuid> = ids.iter().map(|id| id.0).collect();
    let rows: Vec<RecipientRow> = sqlx::query_as(QUERY).bind(ids).fetch_all(ex).await?;
    rows.into_iter().map(Recipient::try_from).collect()
}

pub async fn get(ex: impl PgExecutor<'_>, id: RecipientId) -> sqlx::Result<Option<Recipient>> {
    const QUERY: &str = "SELECT * FROM recipients WHERE id = $1";
    let row: Option<RecipientRow> = sqlx::query_as(QUERY).bind(id.0).fetch_optional(ex).await?;
    row.map(Recipient::try_from).transpose()
}

pub async fn list_for_batch(
    ex: impl PgExecutor<'_>,
    batch_id: model::batch::BatchId,
) -> sqlx::Result<Vec<Recipient>> {
    const QUERY: &str = "SELECT * FROM recipients WHERE batch_id = $1 ORDER BY id";
    let rows: Vec<RecipientRow> = sqlx::query_as(QUERY)
        .bind(batch_id.0)
        .fetch_all(ex)
        .await?;
    rows.into_iter().map(Recipient::try_from).collect()
}

/// Whether every recipient of a batch has reached a terminal status. Used by
/// stuck-batch recovery to decide whether a `processing` batch whose hot
/// state has expired can simply be force-completed from this table.
pub async fn all_terminal(ex: impl PgExecutor<'_>, batch_id: model::batch::BatchId) -> sqlx::Result<bool> {
    const QUERY: &str = r#"
        SELECT NOT EXISTS (
            SELECT 1 FROM recipients
            WHERE batch_id = $1 AND status NOT IN ('sent', 'failed', 'bounced', 'complained')
        )
    "#;
    sqlx::query_scalar(QUERY).bind(batch_id.0).fetch_one(ex).await
}

/// One recipient's terminal-state sync, as drained from hot state by the
/// postgres syncer.
pub struct RecipientSync {
    pub id: RecipientId,
    pub status: RecipientStatus,
    pub provider_message_id: Option<String>,
    pub error_message: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
}

/// Bulk-upserts a batch of recipient status deltas. Idempotent: replaying
/// the same sync twice (e.g. after a crash mid-drain) writes the same row
/// twice, not a double-counted one, since this table holds current state,
/// not an append-only log.
pub async fn sync_statuses(ex: impl PgExecutor<'_>, syncs: &[RecipientSync]) -> sqlx::Result<()> {
    if syncs.is_empty() {
        return Ok(());
    }
    let ids: Vec<Uuid> = syncs.iter().map(|s| s.id.0).collect();
    let statuses: Vec<String> = syncs.iter().map(|s| s.status.to_string()).collect();
    let provider_message_ids: Vec<Option<&str>> = syncs
        .iter()
        .map(|s| s.provider_message_id.as_deref())
        .collect();
    let error_messages: Vec<Option<&str>> =
        syncs.iter().map(|s| s.error_message.as_deref()).collect();
    let sent_ats: Vec<Option<DateTime<Utc>>> = syncs.iter().map(|s| s.sent_at).collect();

    const QUERY: &str = r#"
        UPDATE recipients AS r
        SET status = data.status,
            provider_message_id = data.provider_message_id,
            error_message = data.error_message,
            sent_at = data.sent_at
        FROM UNNEST($1::uuid[], $2::text[], $3::text[], $4::text[], $5::timestamptz[])
            AS data(id, status, provider_message_id, error_message, sent_at)
        WHERE r.id = data.id
    "#;
    sqlx::query(QUERY)
        .bind(ids)
        .bind(statuses)
        .bind(provider_message_ids)
        .bind(error_messages)
        .bind(sent_ats)
        .execute(ex)
        .await
        .map(|_| ())
}
