use {crate::BreakerConfig, std::time::Duration};

/// Retry/backoff/circuit-breaker knobs for the resilient HTTP client used by
/// webhook delivery.
#[derive(Clone, Copy, Debug, serde::Deserialize)]
#[cfg_attr(feature = "test-util", derive(serde::Serialize))]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct HttpClientConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff base: `min(base * 2^attempt, max_delay)` before jitter.
    #[serde(with = "humantime_serde", default = "default_base_delay")]
    pub base_delay: Duration,

    #[serde(with = "humantime_serde", default = "default_max_delay")]
    pub max_delay: Duration,

    /// Extra delay added on top of the capped backoff, uniformly sampled
    /// from `[0, delay * jitter_factor]`. `0.0` disables jitter.
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,

    #[serde(default)]
    pub breaker: BreakerConfig,
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_base_delay() -> Duration {
    Duration::from_secs(1)
}

const fn default_max_delay() -> Duration {
    Duration::from_secs(10)
}

const fn default_jitter_factor() -> f64 {
    0.5
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
            jitter_factor: default_jitter_factor(),
            breaker: BreakerConfig::default(),
        }
    }
}
