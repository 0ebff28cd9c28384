//! Explicit service locator: every long-lived dependency the dispatcher
//! wires up once at startup and hands out by reference, generic over the
//! broker implementation so the binary can run `queue_client::nats::NatsBroker`
//! while tests run `queue_client::fake::FakeBroker` (`Broker` has an
//! associated type, so it can't be behind `Arc<dyn Broker>`).

use {
    crate::{config::DispatcherConfig, event_log::EventLog},
    dashmap::DashMap,
    hot_state::HotStateStore,
    http_client::ResilientClient,
    model::{ModuleKind, TenantId},
    modules::{EmailModule, ModuleRegistry, SmsModule, WebhookModule},
    queue_client::Broker,
    rate_limit::RateLimiter,
    std::sync::{atomic::{AtomicBool, Ordering}, Arc},
    tokio::sync::Mutex,
};

/// Holds every actively-running per-tenant chunk consumer task, keyed by
/// tenant, plus the coalescing lock so concurrent `ensure(tenant)` calls
/// don't race to create two consumers for the same tenant.
#[derive(Default)]
pub struct TenantConsumers {
    pub active: DashMap<TenantId, tokio::task::JoinHandle<()>>,
    pub creation_locks: DashMap<TenantId, Arc<Mutex<()>>>,
}

pub struct Services<B: Broker + 'static> {
    pub broker: Arc<B>,
    pub hot_state: Arc<HotStateStore>,
    pub rate_limiter: Arc<RateLimiter>,
    pub http_client: Arc<ResilientClient>,
    pub modules: Arc<ModuleRegistry>,
    pub db: sqlx::PgPool,
    pub config: Arc<DispatcherConfig>,
    pub event_log: Arc<EventLog>,
    pub tenant_consumers: Arc<TenantConsumers>,
    accepting_work: AtomicBool,
}

impl<B: Broker + 'static> Services<B> {
    pub fn new(
        broker: Arc<B>,
        hot_state: Arc<HotStateStore>,
        rate_limiter: Arc<RateLimiter>,
        http_client: Arc<ResilientClient>,
        db: sqlx::PgPool,
        config: Arc<DispatcherConfig>,
    ) -> Self {
        let modules = Arc::new(
            ModuleRegistry::new()
                .register(ModuleKind::Email, Arc::new(EmailModule))
                .register(ModuleKind::Sms, Arc::new(SmsModule))
                .register(ModuleKind::Webhook, Arc::new(WebhookModule::new(http_client.clone())))
                .build(),
        );
        let event_log = Arc::new(EventLog::new(
            db.clone(),
            config.dispatcher.event_buffer_capacity,
            config.dispatcher.event_flush_interval,
        ));
        Self {
            broker,
            hot_state,
            rate_limiter,
            http_client,
            modules,
            db,
            config,
            event_log,
            tenant_consumers: Arc::new(TenantConsumers::default()),
            accepting_work: AtomicBool::new(true),
        }
    }

    pub fn is_accepting_work(&self) -> bool {
        self.accepting_work.load(Ordering::SeqCst)
    }

    pub fn stop_accepting_work(&self) {
        self.accepting_work.store(false, Ordering::SeqCst);
    }

    /// Waits for every currently-registered per-tenant consumer task to
    /// finish its in-flight work and exit. Callers wrap this in a timeout;
    /// a consumer that doesn't exit in time is simply abandoned, its
    /// in-flight messages will be redelivered to whichever process picks
    /// them up next.
    pub async fn drain_active_consumers(&self) {
        let tenants: Vec<TenantId> = self
            .tenant_consumers
            .active
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        let handles: Vec<_> = tenants
            .into_iter()
            .filter_map(|tenant| self.tenant_consumers.active.remove(&tenant).map(|(_, h)| h))
            .collect();
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Best-effort final sync of hot-state deltas into postgres, run as
    /// shutdown phase 3. The periodic syncer background task does the same
    /// thing on a timer; this is just one last pass before exit.
    pub async fn syncer_flush_once(&self) -> anyhow::Result<()> {
        crate::background::syncer::sync_once(&self.db, &self.hot_state).await
    }

    pub async fn close(&self) {
        self.db.close().await;
    }
}
