//! Flips `scheduled` batches whose `scheduled_at` has arrived over to
//! `queued` and republishes them onto the batches stream, the same
//! transition the batch orchestrator performs for a batch created without
//! a `scheduled_at`.

use {database::batches, model::batch::BatchStatus, queue_client::{subject, Publisher}, std::time::Duration};

pub struct Scheduler<P: Publisher> {
    db: sqlx::PgPool,
    publisher: std::sync::Arc<P>,
    interval: Duration,
    batch_size: i64,
}

impl<P: Publisher> Scheduler<P> {
    pub fn new(db: sqlx::PgPool, publisher: std::sync::Arc<P>, interval: Duration, batch_size: i64) -> Self {
        Self { db, publisher, interval, batch_size }
    }

    pub async fn run_forever(self) -> ! {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            ticker.tick().await;
            if let Err(err) = self.tick().await {
                tracing::warn!(%err, "scheduler pass failed, will retry next tick");
            }
        }
    }

    async fn tick(&self) -> anyhow::Result<()> {
        let due = batches::list_due_scheduled(&self.db, chrono::Utc::now(), self.batch_size).await?;
        for batch_id in due {
            batches::set_status(&self.db, batch_id, BatchStatus::Queued).await?;
            let payload = serde_json::to_vec(&batch_id)?;
            self.publisher
                .publish(subject::BATCHES_SUBJECT, payload.into(), Some(&format!("batch-{batch_id}")))
                .await?;
        }
        Ok(())
    }
}
