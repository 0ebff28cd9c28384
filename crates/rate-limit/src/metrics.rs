use prometheus_metric_storage::MetricStorage;

#[derive(MetricStorage)]
#[metric(subsystem = "rate_limit")]
pub struct Metrics {
    /// Acquisition attempts, by outcome (`allowed`, `denied`, `fail_open`).
    #[metric(labels("outcome"))]
    pub acquisitions: prometheus::IntCounterVec,
}

impl Metrics {
    pub fn get() -> &'static Self {
        Self::instance(observe::metrics::get_storage_registry()).expect("metrics registry must be initialized")
    }
}
