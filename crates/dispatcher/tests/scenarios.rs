//! End-to-end scenarios over `FakeBroker` plus a live Postgres and Redis.
//!
//! These drive the real background consumers (`batch_orchestrator::run`,
//! and whatever per-tenant chunk consumer it starts) the way the `dispatcher`
//! binary does, rather than reaching into private handler functions, so they
//! exercise the full batch → chunk → module → hot-state → postgres pipeline
//! the unit tests inside `chunk_processor`/`config`/`api` can't reach (those
//! need only pure logic; this needs a real `HotStateStore`/`RateLimiter`/
//! `sqlx::PgPool`). Run with a Postgres reachable at `postgresql://` (schema
//! matching `database`'s table shapes already applied) and a Redis reachable
//! at `redis://127.0.0.1:6379`:
//!
//! ```sh
//! cargo test -p dispatcher --test scenarios -- --ignored
//! ```

use {
    configs::{HotStoreConfig, HttpClientConfig, RateLimitConfig},
    database::{batches, recipients},
    dispatcher::{batch_orchestrator, config::DispatcherConfig, services::Services},
    hot_state::HotStateStore,
    http_client::ResilientClient,
    model::{
        batch::{Batch, BatchId, BatchStatus},
        recipient::{Recipient, RecipientId, RecipientStatus},
        ModuleKind, TenantId,
    },
    queue_client::{fake::FakeBroker, subject, Publisher},
    rate_limit::RateLimiter,
    std::{sync::Arc, time::Duration},
};

async fn test_services() -> Arc<Services<FakeBroker>> {
    let db = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect("postgresql://")
        .await
        .expect("postgres must be reachable at postgresql://");
    database::clear_DANGER(&db).await.expect("failed to clear postgres state");

    let hot_state = Arc::new(
        HotStateStore::connect(&HotStoreConfig::default())
            .await
            .expect("redis must be reachable at redis://127.0.0.1:6379"),
    );
    let rate_limiter = Arc::new(
        RateLimiter::connect(&RateLimitConfig::default().store_url)
            .await
            .expect("redis must be reachable for the rate limiter"),
    );
    let http_client = Arc::new(ResilientClient::new(HttpClientConfig::default()));
    let config = Arc::new(DispatcherConfig::default());

    Arc::new(Services::new(Arc::new(FakeBroker::new()), hot_state, rate_limiter, http_client, db, config))
}

fn new_batch(module: ModuleKind, dry_run: bool, recipient_count: u64) -> Batch {
    Batch {
        id: BatchId(uuid::Uuid::new_v4()),
        tenant_id: TenantId(format!("tenant-{}", uuid::Uuid::new_v4())),
        send_config_id: None,
        module,
        payload_defaults: serde_json::json!({ "subject": "Hello" }),
        total_recipients: recipient_count,
        sent_count: 0,
        failed_count: 0,
        status: BatchStatus::Queued,
        dry_run,
        created_at: chrono::Utc::now(),
        scheduled_at: None,
        started_at: None,
        completed_at: None,
    }
}

fn new_recipient(batch_id: BatchId, address: &str) -> Recipient {
    Recipient {
        id: RecipientId(uuid::Uuid::new_v4()),
        batch_id,
        address: address.to_string(),
        name: None,
        variables: Default::default(),
        status: RecipientStatus::Pending,
        provider_message_id: None,
        error_message: None,
        sent_at: None,
    }
}

/// Publishes the batch onto the batches subject, the way `api::create_batch`
/// does for an immediately-queued batch.
async fn publish_batch(services: &Services<FakeBroker>, batch_id: BatchId) {
    let payload = serde_json::to_vec(&batch_id).unwrap();
    services
        .broker
        .publish(subject::BATCHES_SUBJECT, payload.into(), Some(&format!("batch-{batch_id}")))
        .await
        .unwrap();
}

/// Polls postgres until the batch reaches a terminal status or the timeout
/// elapses, returning the last observed row.
async fn wait_for_terminal(services: &Services<FakeBroker>, batch_id: BatchId, timeout: Duration) -> Batch {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let batch = batches::get(&services.db, batch_id).await.unwrap().expect("batch must exist");
        if batch.status.is_terminal() || tokio::time::Instant::now() >= deadline {
            return batch;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Small single-chunk dry-run batch: publishing the batch message drives it
/// all the way to `completed` through one chunk, no real module I/O.
#[tokio::test]
#[ignore = "requires a live postgres and redis"]
async fn small_dry_run_batch_completes_through_a_single_chunk() {
    let services = test_services().await;
    let batch = new_batch(ModuleKind::Email, true, 3);
    let recipients: Vec<_> = (0..3).map(|i| new_recipient(batch.id, &format!("user{i}@example.com"))).collect();
    batches::insert(&services.db, &batch).await.unwrap();
    recipients::insert_batch(&services.db, &recipients).await.unwrap();

    tokio::spawn(batch_orchestrator::run(services.clone()));
    publish_batch(&services, batch.id).await;

    let stored = wait_for_terminal(&services, batch.id, Duration::from_secs(10)).await;
    assert_eq!(stored.status, BatchStatus::Completed);
    assert_eq!(stored.sent_count, 3);
    assert_eq!(stored.failed_count, 0);
}

/// Re-publishing the same batch id after it has already completed must be a
/// no-op: the orchestrator's own terminal-status guard short-circuits before
/// touching hot state or chunking again.
#[tokio::test]
#[ignore = "requires a live postgres and redis"]
async fn republishing_a_completed_batch_does_not_reprocess_it() {
    let services = test_services().await;
    let batch = new_batch(ModuleKind::Email, true, 1);
    let recipient = new_recipient(batch.id, "user@example.com");
    batches::insert(&services.db, &batch).await.unwrap();
    recipients::insert_batch(&services.db, &[recipient]).await.unwrap();

    tokio::spawn(batch_orchestrator::run(services.clone()));
    publish_batch(&services, batch.id).await;
    let first = wait_for_terminal(&services, batch.id, Duration::from_secs(10)).await;
    assert_eq!(first.status, BatchStatus::Completed);

    let counters_before = services.hot_state.get_batch_stats(batch.id).await.unwrap();
    publish_batch(&services, batch.id).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    let counters_after = services.hot_state.get_batch_stats(batch.id).await.unwrap();

    assert_eq!(counters_before, counters_after, "a terminal batch must never be recounted");
}

/// A webhook batch whose recipient address is unreachable should resolve the
/// batch to `failed` rather than leaving it stuck `processing` forever.
#[tokio::test]
#[ignore = "requires a live postgres and redis"]
async fn unreachable_webhook_recipient_resolves_the_batch_to_failed() {
    let services = test_services().await;
    let batch = new_batch(ModuleKind::Webhook, false, 1);
    let recipient = new_recipient(batch.id, "http://127.0.0.1:1/unreachable");
    batches::insert(&services.db, &batch).await.unwrap();
    recipients::insert_batch(&services.db, &[recipient]).await.unwrap();

    tokio::spawn(batch_orchestrator::run(services.clone()));
    publish_batch(&services, batch.id).await;

    let stored = wait_for_terminal(&services, batch.id, Duration::from_secs(15)).await;
    assert_eq!(stored.status, BatchStatus::Failed);
    assert_eq!(stored.failed_count, 1);
}
