//! The `send_configs` table: the durable master copy of a tenant's send
//! configuration. The Batch Orchestrator reads a row once per batch and
//! freezes it into an [`model::send_config::EmbeddedSendConfig`] snapshot
//! on every chunk job; later edits to a row never retroactively affect
//! chunks already enqueued.

use {
    model::send_config::{EmbeddedSendConfig, ModuleKind, RateLimitOverride, SendConfigId},
    sqlx::PgExecutor,
    std::str::FromStr,
    uuid::Uuid,
};

#[derive(Debug, sqlx::FromRow)]
struct SendConfigRow {
    id: Uuid,
    tenant_id: String,
    module: String,
    config: serde_json::Value,
    rate_limit: serde_json::Value,
}

impl TryFrom<SendConfigRow> for EmbeddedSendConfig {
    type Error = sqlx::Error;

    fn try_from(row: SendConfigRow) -> Result<Self, Self::Error> {
        let rate_limit: RateLimitOverride =
            serde_json::from_value(row.rate_limit).map_err(|err| sqlx::Error::Decode(err.into()))?;
        Ok(EmbeddedSendConfig {
            id: SendConfigId(row.id),
            module: ModuleKind::from_str(&row.module)
                .map_err(|err| sqlx::Error::Decode(err.to_string().into()))?,
            config: row.config,
            rate_limit,
        })
    }
}

pub async fn insert(
    ex: impl PgExecutor<'_>,
    id: SendConfigId,
    tenant_id: &model::TenantId,
    module: ModuleKind,
    config: &serde_json::Value,
    rate_limit: &RateLimitOverride,
) -> sqlx::Result<()> {
    const QUERY: &str = r#"
        INSERT INTO send_configs (id, tenant_id, module, config, rate_limit)
        VALUES ($1, $2, $3, $4, $5)
    "#;
    sqlx::query(QUERY)
        .bind(id.0)
        .bind(tenant_id.0.as_str())
        .bind(module.to_string())
        .bind(config)
        .bind(serde_json::to_value(rate_limit).unwrap_or(serde_json::Value::Null))
        .execute(ex)
        .await
        .map(|_| ())
}

/// Fetches the snapshot embedded into a chunk job at batch-orchestration
/// time. Returns `None` if the send-config was deleted after the batch
/// referencing it was created; the orchestrator falls back to a default
/// managed profile in that case.
pub async fn get(ex: impl PgExecutor<'_>, id: SendConfigId) -> sqlx::Result<Option<EmbeddedSendConfig>> {
    const QUERY: &str = "SELECT * FROM send_configs WHERE id = $1";
    let row: Option<SendConfigRow> = sqlx::query_as(QUERY).bind(id.0).fetch_optional(ex).await?;
    row.map(EmbeddedSendConfig::try_from).transpose()
}
