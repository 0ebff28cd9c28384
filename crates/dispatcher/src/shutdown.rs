//! Shutdown signalling plus the five-phase graceful drain: stop accepting
//! new work, drain in-flight consumers, flush the postgres sync, flush the
//! buffered event logger, close every client. An outer watchdog force-exits
//! if the whole sequence doesn't finish within `shutdown_timeout`.

use crate::services::Services;

pub struct ShutdownController {
    shutdown: tokio::sync::oneshot::Receiver<()>,
}

pub struct ShutdownSignal(tokio::sync::oneshot::Sender<()>);

impl ShutdownController {
    /// Reacts to SIGINT/SIGTERM from the OS.
    pub fn new_shutdown_on_signal() -> Self {
        let (sender, receiver) = tokio::sync::oneshot::channel();
        tokio::spawn(Self::wait_for_signal(ShutdownSignal(sender)));
        Self { shutdown: receiver }
    }

    /// A controller that can be manually triggered, for tests.
    pub fn new_manual_shutdown() -> (ShutdownSignal, Self) {
        let (sender, receiver) = tokio::sync::oneshot::channel();
        (ShutdownSignal(sender), Self { shutdown: receiver })
    }

    async fn wait_for_signal(shutdown: ShutdownSignal) {
        #[cfg(unix)]
        {
            use tokio::signal::{self, unix};
            let mut sigterm = unix::signal(unix::SignalKind::terminate()).expect("install SIGTERM handler");
            let ctrl_c = signal::ctrl_c();
            tokio::select! {
                _ = ctrl_c => tracing::info!("received SIGINT"),
                _ = sigterm.recv() => tracing::info!("received SIGTERM"),
            }
        }
        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c().await.expect("install CTRL+C handler");
            tracing::info!("received SIGINT");
        }
        shutdown.shutdown();
    }

    /// Blocks until a shutdown signal arrives.
    pub async fn wait(self) {
        self.shutdown.await.ok();
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new_shutdown_on_signal()
    }
}

impl ShutdownSignal {
    pub fn shutdown(self) {
        let _ = self.0.send(());
    }
}

/// Runs the five shutdown phases in order, each best-effort: a failure in
/// one phase is logged and does not stop the rest from running.
pub async fn drain<B: queue_client::Broker + 'static>(services: &Services<B>, drain_timeout: std::time::Duration) {
    tracing::info!("shutdown phase 1: stop accepting new work");
    services.stop_accepting_work();

    tracing::info!("shutdown phase 2: draining in-flight consumers");
    if tokio::time::timeout(drain_timeout, services.drain_active_consumers())
        .await
        .is_err()
    {
        tracing::warn!("consumer drain did not finish within the timeout, proceeding anyway");
    }

    tracing::info!("shutdown phase 3: flushing durable sync");
    if let Err(err) = services.syncer_flush_once().await {
        tracing::warn!(%err, "final postgres sync failed during shutdown");
    }

    tracing::info!("shutdown phase 4: flushing buffered events");
    services.event_log.flush_blocking().await;

    tracing::info!("shutdown phase 5: closing clients");
    services.close().await;
}

/// Spawns the watchdog: if `drain` hasn't returned within `timeout`, logs
/// and force-exits the process rather than hang forever on a stuck client.
pub fn spawn_watchdog(timeout: std::time::Duration) -> tokio::sync::oneshot::Sender<()> {
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        tokio::select! {
            _ = rx => {}
            _ = tokio::time::sleep(timeout) => {
                tracing::error!("graceful shutdown exceeded its timeout, forcing exit");
                std::process::exit(1);
            }
        }
    });
    tx
}
