//! Consumes the `batches` stream and turns one queued batch into its
//! recipient chunks: load, transition to `processing`, seed hot state,
//! freeze a send-config snapshot, partition into chunks, publish with a
//! dedup id per chunk, and make sure the tenant's chunk consumer exists.
//!
//! Parse errors on the bus payload ack-and-drop (nothing useful to retry);
//! everything else naks with backoff, since a half-published batch must be
//! safe to reprocess: hot-state init is idempotent, and chunk publishes are
//! deduplicated by `ChunkJob::dedup_id`, so replaying this handler for the
//! same batch never double-sends.

use {
    crate::{chunk_processor, metrics::Metrics, services::Services},
    database::{batches, recipients, send_configs},
    model::{
        batch::{Batch, BatchId, BatchStatus},
        chunk::{chunk_recipients, ChunkJob},
        send_config::EmbeddedSendConfig,
    },
    queue_client::{subject, Broker, Consumer, Msg},
    std::sync::Arc,
};

pub async fn run<B: Broker + 'static>(services: Arc<Services<B>>) {
    let tuning = &services.config.dispatcher;
    let consumer = match services
        .broker
        .consumer(
            subject::BATCHES_STREAM,
            subject::BATCH_PROCESSOR_CONSUMER,
            Some(subject::BATCHES_SUBJECT),
            tuning.concurrent_batches.get(),
        )
        .await
    {
        Ok(consumer) => consumer,
        Err(err) => {
            tracing::error!(%err, "failed to create batch processor consumer, batch orchestration is not running");
            return;
        }
    };

    let semaphore = Arc::new(tokio::sync::Semaphore::new(tuning.concurrent_batches.get()));
    loop {
        if !services.is_accepting_work() {
            return;
        }
        let fetched = consumer
            .fetch(tuning.batch_fetch_batch_size, tuning.batch_fetch_wait)
            .await;
        let messages = match fetched {
            Ok(messages) => messages,
            Err(err) => {
                tracing::warn!(%err, "batch fetch failed, backing off");
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                continue;
            }
        };
        for msg in messages {
            let permit = semaphore.clone().acquire_owned().await.expect("semaphore not closed");
            let services = services.clone();
            tokio::spawn(async move {
                let _permit = permit;
                if let Err(err) = process_message(&services, msg.as_ref()).await {
                    tracing::error!(%err, "batch message processing failed unexpectedly");
                }
            });
        }
    }
}

async fn process_message<B: Broker + 'static>(services: &Arc<Services<B>>, msg: &dyn Msg) -> anyhow::Result<()> {
    let batch_id: BatchId = match serde_json::from_slice(msg.payload()) {
        Ok(id) => id,
        Err(err) => {
            tracing::error!(%err, "unparseable batch message, acking and dropping");
            msg.ack().await?;
            return Ok(());
        }
    };

    match process_batch(services, batch_id).await {
        Ok(()) => msg.ack().await?,
        Err(err) => {
            let redelivery_count = msg.redelivery_count() as u32;
            let delay = services.config.dispatcher.batch_backoff.policy().next_delay(redelivery_count);
            tracing::warn!(%batch_id, %err, redelivery_count, ?delay, "batch processing failed, nacking with backoff");
            msg.nak(Some(delay)).await?;
        }
    }
    Ok(())
}

async fn process_batch<B: Broker + 'static>(services: &Arc<Services<B>>, batch_id: BatchId) -> anyhow::Result<()> {
    let Some(batch) = batches::get(&services.db, batch_id).await? else {
        anyhow::bail!("batch {batch_id} not found");
    };
    if batch.status.is_terminal() || batch.status == BatchStatus::Paused {
        return Ok(());
    }

    if batch.started_at.is_none() {
        batches::mark_started(&services.db, batch_id, chrono::Utc::now()).await?;
    }

    let all_recipients = recipients::list_for_batch(&services.db, batch_id).await?;
    let recipient_ids: Vec<_> = all_recipients.iter().map(|r| r.id).collect();
    services.hot_state.initialize_batch(batch_id, &recipient_ids).await?;

    let send_config = resolve_send_config(services.as_ref(), &batch).await?;
    let chunk_size = send_config.rate_limit.effective_recipients_per_request(send_config.module);
    let chunks = chunk_recipients(&recipient_ids, chunk_size);

    let subject = subject::chunk_subject(&batch.tenant_id);
    for (chunk_index, recipient_ids) in chunks.into_iter().enumerate() {
        let job = ChunkJob {
            batch_id,
            tenant_id: batch.tenant_id.clone(),
            chunk_index: chunk_index as u32,
            recipient_ids,
            send_config: send_config.clone(),
            dry_run: batch.dry_run.then_some(true),
        };
        let dedup_id = job.dedup_id();
        let payload = serde_json::to_vec(&job)?;
        services.broker.publish(&subject, payload.into(), Some(&dedup_id)).await?;
        Metrics::get().chunks_published.inc();
    }

    chunk_processor::ensure(services.clone(), batch.tenant_id.clone()).await;
    Ok(())
}

async fn resolve_send_config<B: Broker + 'static>(
    services: &Services<B>,
    batch: &Batch,
) -> anyhow::Result<EmbeddedSendConfig> {
    if let Some(send_config_id) = batch.send_config_id {
        if let Some(config) = send_configs::get(&services.db, send_config_id).await? {
            return Ok(config);
        }
        tracing::warn!(batch_id = %batch.id, %send_config_id, "send config missing, falling back to module default");
    }
    Ok(EmbeddedSendConfig {
        id: model::send_config::SendConfigId(uuid::Uuid::nil()),
        module: batch.module,
        config: serde_json::Value::Object(Default::default()),
        rate_limit: Default::default(),
    })
}
