//! Wires everything together: parse args, load config, connect every
//! dependency, spawn the orchestrator/background tasks, serve the control
//! and metrics APIs, and drive graceful shutdown. Sequenced the way
//! `autopilot::run::start` and `alerter::start` both do it.

use {
    crate::{
        arguments::Args,
        background::{scheduler::Scheduler, stuck_recovery::StuckRecovery, syncer::Syncer},
        batch_orchestrator,
        config::DispatcherConfig,
        services::Services,
        shutdown::ShutdownController,
    },
    clap::Parser,
    hot_state::HotStateStore,
    http_client::ResilientClient,
    queue_client::{nats::NatsBroker, Broker},
    rate_limit::RateLimiter,
    std::sync::Arc,
};

struct Liveness;

impl observe::metrics::LivenessChecking for Liveness {
    fn is_alive(&self) -> bool {
        true
    }
}

pub async fn start(args: impl Iterator<Item = String>) {
    let args = Args::parse_from(args);

    observe::tracing::initialize(&args.log_filter, args.log_stderr_threshold, args.log_json);
    observe::panic_hook::install();
    tracing::info!("running dispatcher with validated arguments:\n{:#?}", args);
    observe::metrics::setup_registry(Some("dispatcher".to_string()), None);

    let config = match DispatcherConfig::from_path(&args.config).await {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(%err, path = %args.config.display(), "failed to load dispatcher config");
            std::process::exit(1);
        }
    };
    tracing::info!(config = ?config, "loaded dispatcher config");

    let broker = match NatsBroker::connect(config.broker.url.as_str(), config.broker.dedup_window).await {
        Ok(broker) => broker,
        Err(err) => {
            tracing::error!(%err, "failed to connect to the broker");
            std::process::exit(1);
        }
    };
    run_with_broker(args, config, broker).await;
}

async fn run_with_broker<B: Broker + 'static>(args: Args, config: DispatcherConfig, broker: B) {
    let db = match sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.database.max_connections.get())
        .connect(config.database.write_url.as_str())
        .await
    {
        Ok(pool) => pool,
        Err(err) => {
            tracing::error!(%err, "failed to connect to postgres");
            std::process::exit(1);
        }
    };

    let hot_state = match HotStateStore::connect(&config.hot_store).await {
        Ok(store) => Arc::new(store),
        Err(err) => {
            tracing::error!(%err, "failed to connect to the hot state store");
            std::process::exit(1);
        }
    };

    let rate_limiter = match RateLimiter::connect(&config.rate_limit.store_url).await {
        Ok(limiter) => Arc::new(limiter),
        Err(err) => {
            tracing::error!(%err, "failed to connect to the rate limit store");
            std::process::exit(1);
        }
    };

    let http_client = Arc::new(ResilientClient::new(config.http_client));
    let config = Arc::new(config);
    let services = Arc::new(Services::new(
        Arc::new(broker),
        hot_state,
        rate_limiter,
        http_client,
        db,
        config.clone(),
    ));
    services.event_log.spawn_flush_loop(config.dispatcher.event_flush_interval);

    tokio::spawn(batch_orchestrator::run(services.clone()));
    tokio::spawn(
        Scheduler::new(
            services.db.clone(),
            services.broker.clone(),
            config.dispatcher.scheduler_interval,
            config.dispatcher.batch_fetch_batch_size as i64,
        )
        .run_forever(),
    );
    tokio::spawn(
        StuckRecovery::new(services.db.clone(), config.dispatcher.stuck_scan_interval, config.dispatcher.stuck_threshold)
            .run_forever(),
    );
    tokio::spawn(Syncer::new(services.db.clone(), services.hot_state.clone(), config.dispatcher.syncer_interval).run_forever());

    let (api_shutdown_tx, api_shutdown_rx) = tokio::sync::oneshot::channel();
    observe::metrics::serve_metrics(Arc::new(Liveness), args.metrics_address);
    let api_handle = tokio::spawn(crate::api::serve(services.clone(), args.api_address, api_shutdown_rx));

    let controller = ShutdownController::new_shutdown_on_signal();
    controller.wait().await;
    let _ = api_shutdown_tx.send(());

    let watchdog = crate::shutdown::spawn_watchdog(args.shutdown_timeout);
    crate::shutdown::drain(&services, config.dispatcher.shutdown_drain_timeout).await;
    let _ = watchdog.send(());
    let _ = api_handle.await;
}
