//! Dispatcher-level Prometheus metrics, grounded on the same
//! `prometheus_metric_storage::MetricStorage` derive `rate-limit` and the
//! teacher's `periodic_db_cleanup.rs` use.

use prometheus_metric_storage::MetricStorage;

#[derive(MetricStorage)]
#[metric(subsystem = "dispatcher")]
pub struct Metrics {
    /// Batches the batch orchestrator has finished processing, by outcome.
    #[metric(labels("outcome"))]
    pub batches_processed: prometheus::IntCounterVec,

    /// Chunks published onto a tenant's chunk subject.
    pub chunks_published: prometheus::IntCounter,

    /// Chunk messages the chunk processor has finished handling, by
    /// outcome (`acked`, `nacked`, `failed_terminal`).
    #[metric(labels("outcome"))]
    pub chunks_processed: prometheus::IntCounterVec,

    /// Redeliveries observed across every stream, by stream name.
    #[metric(labels("stream"))]
    pub redeliveries: prometheus::IntCounterVec,

    /// Currently-running per-tenant chunk consumer tasks.
    pub active_tenant_consumers: prometheus::IntGauge,

    /// Per-module send outcomes.
    #[metric(labels("module", "outcome"))]
    pub module_sends: prometheus::IntCounterVec,

    /// Per-module send latency.
    #[metric(labels("module"))]
    pub module_send_duration_seconds: prometheus::HistogramVec,
}

impl Metrics {
    pub fn get() -> &'static Self {
        Self::instance(observe::metrics::get_storage_registry()).expect("metrics registry must be initialized")
    }
}
