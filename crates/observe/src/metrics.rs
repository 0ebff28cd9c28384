//! Process-wide Prometheus registry plus a tiny axum server to expose it,
//! alongside a liveness endpoint every long-running worker can hook into.

use {
    axum::{Router, extract::State, http::StatusCode, response::IntoResponse, routing::get},
    prometheus::{Encoder, Registry, TextEncoder},
    prometheus_metric_storage::StorageRegistry,
    std::{net::SocketAddr, sync::Arc, sync::OnceLock},
};

static REGISTRY: OnceLock<Registry> = OnceLock::new();
static STORAGE_REGISTRY: OnceLock<StorageRegistry> = OnceLock::new();

/// Creates the process-wide metrics registry. Call once at startup.
/// `namespace` prefixes every metric registered through
/// [`get_storage_registry`] (e.g. `"send_dispatcher"` turns a `queued_total`
/// counter into `send_dispatcher_queued_total`).
pub fn setup_registry(namespace: Option<String>, registry: Option<Registry>) {
    let registry = registry.unwrap_or_default();
    let storage = StorageRegistry::new(registry.clone(), namespace.unwrap_or_default());
    if REGISTRY.set(registry).is_err() {
        tracing::warn!("metrics registry already initialized, ignoring");
    }
    if STORAGE_REGISTRY.set(storage).is_err() {
        tracing::warn!("metrics storage registry already initialized, ignoring");
    }
}

/// Returns the process-wide Prometheus registry.
///
/// # Panics
/// Panics if [`setup_registry`] was never called.
pub fn get_registry() -> &'static Registry {
    REGISTRY.get().expect("metrics registry not initialized")
}

/// Returns the process-wide [`StorageRegistry`] used by `#[metric(...)]`
/// derived metric structs.
///
/// # Panics
/// Panics if [`setup_registry`] was never called.
pub fn get_storage_registry() -> &'static StorageRegistry {
    STORAGE_REGISTRY
        .get()
        .expect("metrics registry not initialized")
}

/// Something a `/healthz` endpoint can ask whether the service is still
/// making useful progress. Distinct from process-is-running; a dispatcher
/// whose consumer loops have all died while the binary keeps running should
/// report unhealthy so an orchestrator restarts it.
pub trait LivenessChecking: Send + Sync {
    fn is_alive(&self) -> bool;
}

#[derive(Clone)]
struct AppState {
    liveness: Arc<dyn LivenessChecking>,
}

/// Spawns a background axum server exposing `/metrics` (Prometheus text
/// format) and `/healthz` (200 while `liveness.is_alive()`, 503 otherwise).
pub fn serve_metrics(liveness: Arc<dyn LivenessChecking>, address: SocketAddr) {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .with_state(AppState { liveness });

    tokio::spawn(async move {
        let listener = match tokio::net::TcpListener::bind(address).await {
            Ok(listener) => listener,
            Err(err) => {
                tracing::error!(%err, %address, "failed to bind metrics server");
                return;
            }
        };
        if let Err(err) = axum::serve(listener, app).await {
            tracing::error!(%err, "metrics server terminated unexpectedly");
        }
    });
}

async fn metrics_handler() -> impl IntoResponse {
    let metric_families = get_registry().gather();
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(%err, "failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, String::new());
    }
    match String::from_utf8(buffer) {
        Ok(body) => (StatusCode::OK, body),
        Err(err) => {
            tracing::error!(%err, "metrics buffer was not valid utf8");
            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
        }
    }
}

async fn healthz_handler(State(state): State<AppState>) -> impl IntoResponse {
    if state.liveness.is_alive() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
