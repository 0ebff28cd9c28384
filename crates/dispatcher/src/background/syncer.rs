//! Drains hot state's per-recipient terminal results and batch counters
//! into postgres on a timer, so the durable mirror converges with, but
//! never drives, the authoritative state Redis holds while a batch is
//! in flight. Grounded on `periodic_db_cleanup.rs`'s `OrderEventsCleaner`.

use {
    database::{batches, recipients},
    hot_state::HotStateStore,
    model::batch::BatchId,
    std::time::Duration,
};

pub struct Syncer {
    db: sqlx::PgPool,
    hot_state: std::sync::Arc<HotStateStore>,
    interval: Duration,
}

impl Syncer {
    pub fn new(db: sqlx::PgPool, hot_state: std::sync::Arc<HotStateStore>, interval: Duration) -> Self {
        Self { db, hot_state, interval }
    }

    pub async fn run_forever(self) -> ! {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            ticker.tick().await;
            if let Err(err) = sync_once(&self.db, &self.hot_state).await {
                tracing::warn!(%err, "postgres sync pass failed, will retry next tick");
            }
        }
    }
}

/// One sync pass over every currently `processing` batch: pulls terminal
/// recipient results out of hot state and upserts them, then refreshes the
/// batch's `sent_count`/`failed_count` from hot state's counters.
pub async fn sync_once(db: &sqlx::PgPool, hot_state: &HotStateStore) -> anyhow::Result<()> {
    let processing = batches::list_processing(db).await?;
    for batch_id in processing {
        if let Err(err) = sync_batch(db, hot_state, batch_id).await {
            tracing::warn!(%batch_id, %err, "failed to sync batch from hot state");
        }
    }
    Ok(())
}

async fn sync_batch(db: &sqlx::PgPool, hot_state: &HotStateStore, batch_id: BatchId) -> anyhow::Result<()> {
    let recipients = recipients::list_for_batch(db, batch_id).await?;
    let ids: Vec<_> = recipients.iter().map(|r| r.id).collect();
    let terminal = hot_state.check_recipients_processed_batch(batch_id, &ids).await?;
    if !terminal.is_empty() {
        let syncs: Vec<_> = terminal
            .into_iter()
            .map(|(id, state)| recipients::RecipientSync {
                id,
                status: state.status,
                provider_message_id: state.provider_message_id,
                error_message: state.error_message,
                sent_at: state.sent_at,
            })
            .collect();
        recipients::sync_statuses(db, &syncs).await?;
    }

    let counters = hot_state.get_batch_stats(batch_id).await?;
    batches::sync_counters(db, batch_id, counters.sent, counters.failed).await?;
    Ok(())
}
