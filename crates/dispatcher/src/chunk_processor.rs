//! Per-tenant consumer orchestrator and the 10-step chunk send algorithm.
//!
//! One durable pull consumer per tenant is created lazily on first use and
//! kept running in `services.tenant_consumers`; concurrent `ensure` calls
//! for the same tenant are coalesced through a per-tenant creation lock so
//! two racing chunk publishes can't spawn two consumers for the same
//! tenant. Each consumer supervises its own message loop: a panic or error
//! handling one message never stops the loop from picking up the next one,
//! and the task removes itself from the active-consumer registry if it
//! ever exits so a later `ensure` can restart it.

use {
    crate::{metrics::Metrics, services::Services},
    database::{batches, dispatch_events::DispatchEvent, recipients},
    hot_state::RecipientResult,
    model::{
        batch::{Batch, BatchId, BatchStatus},
        recipient::{Recipient, RecipientState},
        send_config::EmbeddedSendConfig,
        TenantId,
    },
    queue_client::{subject, Broker, Consumer, Msg},
    std::sync::Arc,
    tokio::sync::Mutex,
};

/// Coalesced lazy start of a tenant's chunk consumer. Safe to call
/// concurrently and redundantly; only the first caller for a tenant
/// actually spawns anything.
pub async fn ensure<B: Broker + 'static>(services: Arc<Services<B>>, tenant_id: TenantId) {
    if services.tenant_consumers.active.contains_key(&tenant_id) {
        return;
    }
    let lock = services
        .tenant_consumers
        .creation_locks
        .entry(tenant_id.clone())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone();
    let _guard = lock.lock().await;
    if services.tenant_consumers.active.contains_key(&tenant_id) {
        return;
    }

    let handle = {
        let services = services.clone();
        let tenant_id = tenant_id.clone();
        tokio::spawn(async move {
            run_consumer(services.clone(), tenant_id.clone()).await;
            services.tenant_consumers.active.remove(&tenant_id);
            Metrics::get().active_tenant_consumers.dec();
        })
    };
    services.tenant_consumers.active.insert(tenant_id, handle);
    Metrics::get().active_tenant_consumers.inc();
}

async fn run_consumer<B: Broker + 'static>(services: Arc<Services<B>>, tenant_id: TenantId) {
    let subject = subject::chunk_subject(&tenant_id);
    let consumer_name = subject::chunk_consumer_name(&tenant_id);
    let tuning = &services.config.dispatcher;
    let consumer = match services
        .broker
        .consumer(
            subject::CHUNKS_STREAM,
            &consumer_name,
            Some(&subject),
            tuning.tenant_chunk_concurrency.get(),
        )
        .await
    {
        Ok(consumer) => consumer,
        Err(err) => {
            tracing::error!(%tenant_id, %err, "failed to create tenant chunk consumer, will retry on next publish");
            return;
        }
    };

    let semaphore = Arc::new(tokio::sync::Semaphore::new(tuning.tenant_chunk_concurrency.get()));
    loop {
        if !services.is_accepting_work() {
            return;
        }
        let fetched = consumer
            .fetch(tuning.chunk_fetch_batch_size, tuning.chunk_fetch_wait)
            .await;
        let messages = match fetched {
            Ok(messages) => messages,
            Err(err) => {
                tracing::warn!(%tenant_id, %err, "chunk fetch failed, backing off");
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                continue;
            }
        };
        if messages.is_empty() {
            continue;
        }
        for msg in messages {
            let permit = semaphore.clone().acquire_owned().await.expect("semaphore not closed");
            let services = services.clone();
            tokio::spawn(async move {
                let _permit = permit;
                if let Err(err) = process_message(&services, msg.as_ref()).await {
                    tracing::error!(%err, "chunk message processing failed unexpectedly");
                }
            });
        }
    }
}

async fn process_message<B: Broker + 'static>(
    services: &Services<B>,
    msg: &dyn Msg,
) -> anyhow::Result<()> {
    let job: model::chunk::ChunkJob = match serde_json::from_slice(msg.payload()) {
        Ok(job) => job,
        Err(err) => {
            tracing::error!(%err, "unparseable chunk job, acking and dropping");
            msg.ack().await?;
            Metrics::get().chunks_processed.with_label_values(&["fatal_parse"]).inc();
            return Ok(());
        }
    };

    match handle_chunk(services, &job).await {
        Ok(()) => {
            msg.ack().await?;
            Metrics::get().chunks_processed.with_label_values(&["acked"]).inc();
        }
        Err(err) => {
            if let Some(model::error::DispatchError::RateLimited { retry_after_ms }) =
                err.downcast_ref::<model::error::DispatchError>()
            {
                let delay = std::time::Duration::from_millis(*retry_after_ms).max(std::time::Duration::from_secs(5));
                tracing::debug!(batch_id = %job.batch_id, chunk_index = job.chunk_index, ?delay, "rate limit denied acquisition, nacking with retry-after");
                msg.nak(Some(delay)).await?;
                Metrics::get().chunks_processed.with_label_values(&["rate_limited"]).inc();
                return Ok(());
            }

            let redelivery_count = msg.redelivery_count() as u32;
            if redelivery_count >= services.config.dispatcher.max_redeliveries {
                tracing::error!(
                    batch_id = %job.batch_id,
                    chunk_index = job.chunk_index,
                    %err,
                    redelivery_count,
                    "chunk exceeded max redeliveries, marking remaining recipients failed"
                );
                fail_remaining(services, &job, &err.to_string()).await?;
                msg.ack().await?;
                Metrics::get().chunks_processed.with_label_values(&["failed_terminal"]).inc();
            } else {
                let delay = services.config.dispatcher.chunk_backoff.policy().next_delay(redelivery_count);
                tracing::warn!(batch_id = %job.batch_id, chunk_index = job.chunk_index, %err, redelivery_count, ?delay, "chunk processing failed, nacking with backoff");
                msg.nak(Some(delay)).await?;
                Metrics::get().chunks_processed.with_label_values(&["nacked"]).inc();
            }
        }
    }
    Ok(())
}

/// The actual send path for one chunk: idempotency check, load recipient
/// rows, acquire rate-limit tokens, execute through the module (or
/// short-circuit on dry run), record terminal results, emit analytics
/// events, and check whether the batch as a whole is now complete.
async fn handle_chunk<B: Broker + 'static>(services: &Services<B>, job: &model::chunk::ChunkJob) -> anyhow::Result<()> {
    let already_terminal = services
        .hot_state
        .check_recipients_processed_batch(job.batch_id, &job.recipient_ids)
        .await?;

    let remaining: Vec<_> = job
        .recipient_ids
        .iter()
        .copied()
        .filter(|id| !already_terminal.contains_key(id))
        .collect();

    if remaining.is_empty() {
        return finalize_if_complete(services, job.batch_id).await;
    }

    let Some(batch) = batches::get(&services.db, job.batch_id).await? else {
        anyhow::bail!("batch {} not found while processing chunk {}", job.batch_id, job.chunk_index);
    };

    let recipients = recipients::list_by_ids(&services.db, &remaining).await?;
    if recipients.is_empty() {
        return finalize_if_complete(services, job.batch_id).await;
    }

    let managed_service = managed_service_of(&job.send_config);
    let chain = rate_limit::build_chain(
        job.send_config.id,
        job.send_config.module,
        &job.send_config.rate_limit,
        managed_service.as_deref(),
        services.config.rate_limit.system_requests_per_second,
    );
    let acquired = rate_limit::acquire(
        &services.rate_limiter,
        &chain,
        services.config.rate_limit.worker_timeout,
    )
    .await;
    if let rate_limit::AcquireResult::Denied { wait, .. } = acquired {
        return Err(model::error::DispatchError::RateLimited { retry_after_ms: wait.as_millis() as u64 }.into());
    }

    let results = if job.is_dry_run() {
        recipients
            .iter()
            .map(|r| (r.id, modules::ExecuteResult::success(None, std::time::Duration::ZERO)))
            .collect()
    } else {
        let module = services
            .modules
            .get(job.send_config.module)
            .ok_or_else(|| anyhow::anyhow!("no module registered for {:?}", job.send_config.module))?;
        let payloads: Vec<_> = recipients
            .iter()
            .map(|r| (r.id, build_payload(&batch, r)))
            .collect();
        module.execute_batch(&payloads, &job.send_config).await
    };

    record_and_emit(services, job.batch_id, &job.send_config, &results).await?;
    finalize_if_complete(services, job.batch_id).await
}

fn managed_service_of(config: &EmbeddedSendConfig) -> Option<String> {
    config.config.get("service").and_then(|v| v.as_str()).map(str::to_string)
}

fn build_payload(batch: &Batch, recipient: &Recipient) -> serde_json::Value {
    let mut payload = batch.payload_defaults.clone();
    let object = payload.as_object_mut().map(std::mem::take).unwrap_or_default();
    let mut object = object;
    object.insert("to".to_string(), serde_json::Value::String(recipient.address.clone()));
    let mut variables: serde_json::Map<String, serde_json::Value> = object
        .get("variables")
        .and_then(|v| v.as_object())
        .cloned()
        .unwrap_or_default();
    for (key, value) in &recipient.variables {
        variables.insert(key.clone(), serde_json::Value::String(value.clone()));
    }
    object.insert("variables".to_string(), serde_json::Value::Object(variables));
    serde_json::Value::Object(object)
}

async fn record_and_emit<B: Broker + 'static>(
    services: &Services<B>,
    batch_id: BatchId,
    send_config: &EmbeddedSendConfig,
    results: &[(model::recipient::RecipientId, modules::ExecuteResult)],
) -> anyhow::Result<()> {
    let now = chrono::Utc::now();
    let recipient_results: Vec<_> = results
        .iter()
        .map(|(id, result)| {
            let state = if result.success {
                RecipientState::success(result.provider_message_id.clone(), now)
            } else {
                RecipientState::failure(result.error.clone().unwrap_or_else(|| "unknown error".to_string()))
            };
            RecipientResult { recipient_id: *id, state }
        })
        .collect();
    services.hot_state.record_results_batch(batch_id, &recipient_results).await?;

    let module = send_config.module.to_string();
    for (_, result) in results {
        let outcome = if result.success { "success" } else { "failure" };
        Metrics::get().module_sends.with_label_values(&[&module, outcome]).inc();
        Metrics::get()
            .module_send_duration_seconds
            .with_label_values(&[&module])
            .observe(result.latency.as_secs_f64());
    }

    let events: Vec<_> = results
        .iter()
        .map(|(id, result)| DispatchEvent {
            provider: module.clone(),
            event_type: if result.success { "sent".to_string() } else { "failed".to_string() },
            provider_message_id: result.provider_message_id.clone().unwrap_or_else(|| id.to_string()),
            timestamp: now,
            metadata: serde_json::json!({ "recipient_id": id.to_string() }),
            raw_event: serde_json::json!({ "error": result.error }),
        })
        .collect();
    for event in events {
        services.event_log.push(event).await;
    }
    Ok(())
}

/// If the batch's hot-state counters now account for every recipient,
/// flips it to `completed`/`failed` and refreshes hot state's TTL down to
/// the shorter post-completion window.
async fn finalize_if_complete<B: Broker + 'static>(services: &Services<B>, batch_id: BatchId) -> anyhow::Result<()> {
    let Some(batch) = batches::get(&services.db, batch_id).await? else {
        return Ok(());
    };
    if batch.status.is_terminal() {
        return Ok(());
    }
    let counters = services.hot_state.get_batch_stats(batch_id).await?;
    if counters.sent + counters.failed < batch.total_recipients {
        return Ok(());
    }
    let status = if counters.sent == 0 && counters.failed > 0 {
        BatchStatus::Failed
    } else {
        BatchStatus::Completed
    };
    batches::sync_counters(&services.db, batch_id, counters.sent, counters.failed).await?;
    batches::mark_completed(&services.db, batch_id, status, chrono::Utc::now()).await?;
    services.hot_state.mark_completed(batch_id).await?;
    Metrics::get().batches_processed.with_label_values(&[&status.to_string()]).inc();
    Ok(())
}

/// Marks every recipient still non-terminal in hot state as failed, used
/// when a chunk has exhausted its redelivery budget without resolving.
async fn fail_remaining<B: Broker + 'static>(
    services: &Services<B>,
    job: &model::chunk::ChunkJob,
    error: &str,
) -> anyhow::Result<()> {
    let already_terminal = services
        .hot_state
        .check_recipients_processed_batch(job.batch_id, &job.recipient_ids)
        .await?;
    let results: Vec<_> = job
        .recipient_ids
        .iter()
        .filter(|id| !already_terminal.contains_key(id))
        .map(|id| RecipientResult {
            recipient_id: *id,
            state: RecipientState::failure(format!("redelivery budget exhausted: {error}")),
        })
        .collect();
    if !results.is_empty() {
        services.hot_state.record_results_batch(job.batch_id, &results).await?;
    }
    finalize_if_complete(services, job.batch_id).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn send_config(config: serde_json::Value) -> EmbeddedSendConfig {
        EmbeddedSendConfig {
            id: model::send_config::SendConfigId(uuid::Uuid::nil()),
            module: model::ModuleKind::Email,
            config,
            rate_limit: Default::default(),
        }
    }

    #[test]
    fn managed_service_reads_the_service_key_when_present() {
        let config = send_config(serde_json::json!({ "service": "ses" }));
        assert_eq!(managed_service_of(&config), Some("ses".to_string()));
    }

    #[test]
    fn managed_service_is_none_for_byok_configs_without_a_service_key() {
        let config = send_config(serde_json::json!({ "webhook_url": "https://example.com/hook" }));
        assert_eq!(managed_service_of(&config), None);
    }

    fn recipient(address: &str, variables: &[(&str, &str)]) -> Recipient {
        Recipient {
            id: model::recipient::RecipientId(uuid::Uuid::new_v4()),
            batch_id: BatchId(uuid::Uuid::nil()),
            address: address.to_string(),
            name: None,
            variables: variables.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            status: model::recipient::RecipientStatus::Pending,
            provider_message_id: None,
            error_message: None,
            sent_at: None,
        }
    }

    fn batch_with_defaults(payload_defaults: serde_json::Value) -> Batch {
        Batch {
            id: BatchId(uuid::Uuid::nil()),
            tenant_id: TenantId("tenant-1".to_string()),
            send_config_id: None,
            module: model::ModuleKind::Email,
            payload_defaults,
            total_recipients: 1,
            sent_count: 0,
            failed_count: 0,
            status: BatchStatus::Processing,
            dry_run: false,
            created_at: chrono::Utc::now(),
            scheduled_at: None,
            started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn build_payload_merges_defaults_with_the_recipient_address_and_variables() {
        let batch = batch_with_defaults(serde_json::json!({
            "subject": "Welcome",
            "variables": { "product": "Acme" },
        }));
        let recipient = recipient("alice@example.com", &[("name", "Alice")]);

        let payload = build_payload(&batch, &recipient);

        assert_eq!(payload["subject"], "Welcome");
        assert_eq!(payload["to"], "alice@example.com");
        assert_eq!(payload["variables"]["product"], "Acme");
        assert_eq!(payload["variables"]["name"], "Alice");
    }

    #[test]
    fn build_payload_tolerates_empty_defaults() {
        let batch = batch_with_defaults(serde_json::Value::Null);
        let recipient = recipient("bob@example.com", &[]);

        let payload = build_payload(&batch, &recipient);

        assert_eq!(payload["to"], "bob@example.com");
        assert!(payload["variables"].as_object().unwrap().is_empty());
    }

    #[test]
    fn recipient_variables_do_not_overwrite_each_other_across_recipients() {
        let batch = batch_with_defaults(serde_json::json!({ "variables": { "plan": "pro" } }));
        let first = recipient("first@example.com", &[("name", "First")]);
        let second = recipient("second@example.com", &[("name", "Second")]);

        let first_payload = build_payload(&batch, &first);
        let second_payload = build_payload(&batch, &second);

        assert_eq!(first_payload["variables"]["name"], "First");
        assert_eq!(second_payload["variables"]["name"], "Second");
        assert_eq!(first_payload["variables"]["plan"], "pro");
    }
}
