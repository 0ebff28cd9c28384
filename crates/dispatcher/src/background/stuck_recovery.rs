//! Recovers batches stuck `processing` past `stuck_threshold`, most often
//! because a chunk consumer crashed or a tenant consumer's messages expired
//! out of redelivery without reaching a terminal recipient state. If every
//! recipient has already reached a terminal status in postgres, the batch
//! is force-completed from there; otherwise it's left `processing` and
//! logged for operator attention, since re-queuing it risks double sends.

use {
    database::{batches, recipients},
    model::batch::BatchStatus,
    std::time::Duration,
};

pub struct StuckRecovery {
    db: sqlx::PgPool,
    interval: Duration,
    stuck_threshold: Duration,
}

impl StuckRecovery {
    pub fn new(db: sqlx::PgPool, interval: Duration, stuck_threshold: Duration) -> Self {
        Self { db, interval, stuck_threshold }
    }

    pub async fn run_forever(self) -> ! {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            ticker.tick().await;
            if let Err(err) = self.tick().await {
                tracing::warn!(%err, "stuck recovery pass failed, will retry next tick");
            }
        }
    }

    async fn tick(&self) -> anyhow::Result<()> {
        let threshold = chrono::Utc::now()
            - chrono::Duration::from_std(self.stuck_threshold).unwrap_or(chrono::Duration::zero());
        let stuck = batches::list_stuck_processing(&self.db, threshold).await?;
        for batch_id in stuck {
            if recipients::all_terminal(&self.db, batch_id).await? {
                let Some(batch) = batches::get(&self.db, batch_id).await? else { continue };
                let status = if batch.failed_count > 0 && batch.sent_count == 0 {
                    BatchStatus::Failed
                } else {
                    BatchStatus::Completed
                };
                batches::mark_completed(&self.db, batch_id, status, chrono::Utc::now()).await?;
                tracing::info!(%batch_id, ?status, "force-completed stuck batch from terminal recipient rows");
            } else {
                tracing::warn!(%batch_id, "batch stuck processing with non-terminal recipients, leaving for operator attention");
            }
        }
        Ok(())
    }
}
