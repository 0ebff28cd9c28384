//! The dispatcher's own TOML configuration file: the `configs` crate's
//! per-concern structs (broker/hot-store/rate-limit/http-client/database)
//! plus every tunable specific to this binary (pool sizing, backoff
//! presets, background-service intervals). Loaded once at startup via
//! [`DispatcherConfig::from_path`], the same way autopilot loads its own
//! `Configuration` from a TOML file.

use {
    configs::{BrokerConfig, DatabasePoolConfig, HotStoreConfig, HttpClientConfig, RateLimitConfig},
    serde::Deserialize,
    std::{num::NonZeroUsize, path::Path, time::Duration},
};

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct DispatcherConfig {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub hot_store: HotStoreConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub http_client: HttpClientConfig,
    #[serde(default)]
    pub database: DatabasePoolConfig,
    #[serde(default)]
    pub dispatcher: Tuning,
}

impl DispatcherConfig {
    pub async fn from_path<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        Ok(toml::from_str(&tokio::fs::read_to_string(path).await?)?)
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            hot_store: HotStoreConfig::default(),
            rate_limit: RateLimitConfig::default(),
            http_client: HttpClientConfig::default(),
            database: DatabasePoolConfig::default(),
            dispatcher: Tuning::default(),
        }
    }
}

impl std::fmt::Debug for DispatcherConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatcherConfig")
            .field("broker", &self.broker)
            .field("hot_store", &self.hot_store)
            .field("rate_limit", &self.rate_limit)
            .field("http_client", &self.http_client)
            .field("database", &self.database)
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

/// Capped-exponential backoff shape; turned into an [`http_client::RetryPolicy`]
/// at the point of use so both NAK backoff and webhook retries share the
/// exact same delay math.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct BackoffConfig {
    #[serde(with = "humantime_serde")]
    pub base: Duration,
    #[serde(with = "humantime_serde")]
    pub max: Duration,
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

fn default_jitter_factor() -> f64 {
    0.5
}

impl BackoffConfig {
    pub fn policy(&self) -> http_client::RetryPolicy {
        http_client::RetryPolicy {
            max_retries: u32::MAX,
            base_delay: self.base,
            max_delay: self.max,
            jitter_factor: self.jitter_factor,
        }
    }

    fn chunk_default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(30),
            jitter_factor: default_jitter_factor(),
        }
    }

    fn batch_default() -> Self {
        Self {
            base: Duration::from_secs(5),
            max: Duration::from_secs(60),
            jitter_factor: default_jitter_factor(),
        }
    }
}

/// Dispatcher-specific tuning: pool sizing, fetch loop shape, backoff
/// presets and background-service cadences. Everything here is a static
/// default table rather than ad-hoc per-call JSON, per the sizing rework
/// recorded in `DESIGN.md`.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Tuning {
    /// Batch-processor consumer messages pulled/processed concurrently.
    #[serde(default = "default_concurrent_batches")]
    pub concurrent_batches: NonZeroUsize,

    /// Chunks processed concurrently per tenant consumer.
    #[serde(default = "default_tenant_chunk_concurrency")]
    pub tenant_chunk_concurrency: NonZeroUsize,

    /// Optional system-wide cap on concurrently in-flight email sends
    /// across every tenant, independent of the per-tenant chunk cap.
    #[serde(default)]
    pub max_concurrent_emails: Option<NonZeroUsize>,

    #[serde(default = "default_fetch_batch_size")]
    pub batch_fetch_batch_size: usize,
    #[serde(with = "humantime_serde", default = "default_fetch_wait")]
    pub batch_fetch_wait: Duration,

    #[serde(default = "default_fetch_batch_size")]
    pub chunk_fetch_batch_size: usize,
    #[serde(with = "humantime_serde", default = "default_fetch_wait")]
    pub chunk_fetch_wait: Duration,

    /// Page size used when loading a batch's pending recipients out of
    /// postgres before chunking.
    #[serde(default = "default_recipients_page_size")]
    pub recipients_page_size: usize,

    /// Redeliveries after which a chunk's still-unresolved recipients are
    /// marked failed rather than retried again.
    #[serde(default = "default_max_redeliveries")]
    pub max_redeliveries: u32,

    #[serde(default = "BackoffConfig::batch_default")]
    pub batch_backoff: BackoffConfig,
    #[serde(default = "BackoffConfig::chunk_default")]
    pub chunk_backoff: BackoffConfig,

    /// A `processing` batch whose `started_at` is older than this is
    /// considered stuck and picked up by recovery.
    #[serde(with = "humantime_serde", default = "default_stuck_threshold")]
    pub stuck_threshold: Duration,

    #[serde(with = "humantime_serde", default = "default_scheduler_interval")]
    pub scheduler_interval: Duration,
    #[serde(with = "humantime_serde", default = "default_stuck_scan_interval")]
    pub stuck_scan_interval: Duration,
    #[serde(with = "humantime_serde", default = "default_syncer_interval")]
    pub syncer_interval: Duration,

    #[serde(default = "default_event_buffer_capacity")]
    pub event_buffer_capacity: usize,
    #[serde(with = "humantime_serde", default = "default_event_flush_interval")]
    pub event_flush_interval: Duration,

    /// Largest recipient count the control API accepts for a single batch.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Upper bound on phase 2 (drain consumers) of graceful shutdown.
    #[serde(with = "humantime_serde", default = "default_shutdown_drain_timeout")]
    pub shutdown_drain_timeout: Duration,
}

const fn default_concurrent_batches() -> NonZeroUsize {
    NonZeroUsize::new(10).expect("value should be greater than 0")
}

const fn default_tenant_chunk_concurrency() -> NonZeroUsize {
    NonZeroUsize::new(100).expect("value should be greater than 0")
}

const fn default_fetch_batch_size() -> usize {
    10
}

const fn default_fetch_wait() -> Duration {
    Duration::from_secs(5)
}

const fn default_recipients_page_size() -> usize {
    500
}

const fn default_max_redeliveries() -> u32 {
    5
}

const fn default_stuck_threshold() -> Duration {
    Duration::from_secs(30 * 60)
}

const fn default_scheduler_interval() -> Duration {
    Duration::from_secs(10)
}

const fn default_stuck_scan_interval() -> Duration {
    Duration::from_secs(60)
}

const fn default_syncer_interval() -> Duration {
    Duration::from_secs(5)
}

const fn default_event_buffer_capacity() -> usize {
    10_000
}

const fn default_event_flush_interval() -> Duration {
    Duration::from_secs(5)
}

const fn default_max_batch_size() -> usize {
    100_000
}

const fn default_shutdown_drain_timeout() -> Duration {
    Duration::from_secs(10)
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            concurrent_batches: default_concurrent_batches(),
            tenant_chunk_concurrency: default_tenant_chunk_concurrency(),
            max_concurrent_emails: None,
            batch_fetch_batch_size: default_fetch_batch_size(),
            batch_fetch_wait: default_fetch_wait(),
            chunk_fetch_batch_size: default_fetch_batch_size(),
            chunk_fetch_wait: default_fetch_wait(),
            recipients_page_size: default_recipients_page_size(),
            max_redeliveries: default_max_redeliveries(),
            batch_backoff: BackoffConfig::batch_default(),
            chunk_backoff: BackoffConfig::chunk_default(),
            stuck_threshold: default_stuck_threshold(),
            scheduler_interval: default_scheduler_interval(),
            stuck_scan_interval: default_stuck_scan_interval(),
            syncer_interval: default_syncer_interval(),
            event_buffer_capacity: default_event_buffer_capacity(),
            event_flush_interval: default_event_flush_interval(),
            max_batch_size: default_max_batch_size(),
            shutdown_drain_timeout: default_shutdown_drain_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_and_batch_backoff_defaults_differ_in_base_delay() {
        let chunk = BackoffConfig::chunk_default();
        let batch = BackoffConfig::batch_default();
        assert!(chunk.base < batch.base, "chunk backoff should retry sooner than batch backoff");
        assert!(chunk.max < batch.max);
    }

    #[test]
    fn policy_carries_the_backoff_shape_through_unbounded_retries() {
        let backoff = BackoffConfig { base: Duration::from_secs(2), max: Duration::from_secs(20), jitter_factor: 0.1 };
        let policy = backoff.policy();
        assert_eq!(policy.base_delay, backoff.base);
        assert_eq!(policy.max_delay, backoff.max);
        assert_eq!(policy.jitter_factor, backoff.jitter_factor);
        assert_eq!(policy.max_retries, u32::MAX, "nak backoff must never give up on its own");
    }

    #[test]
    fn tuning_deserializes_from_an_empty_table_using_every_default() {
        let tuning: Tuning = toml::from_str("").unwrap();
        let defaults = Tuning::default();
        assert_eq!(tuning.concurrent_batches, defaults.concurrent_batches);
        assert_eq!(tuning.max_redeliveries, defaults.max_redeliveries);
        assert_eq!(tuning.shutdown_drain_timeout, defaults.shutdown_drain_timeout);
    }
}
