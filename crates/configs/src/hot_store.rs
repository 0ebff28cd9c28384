use {std::time::Duration, url::Url};

fn default_url() -> Url {
    "redis://127.0.0.1:6379".parse().expect("url should be valid")
}

/// Connection + TTL + circuit-breaker knobs for the hot state store.
#[derive(Clone, serde::Deserialize)]
#[cfg_attr(feature = "test-util", derive(serde::Serialize))]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct HotStoreConfig {
    #[serde(
        default = "default_url",
        deserialize_with = "crate::deserialize_env::deserialize_url_from_env"
    )]
    pub url: Url,

    /// TTL applied to a batch's hot-state keys once it reaches `completed`.
    #[serde(with = "humantime_serde", default = "default_completed_ttl")]
    pub completed_ttl: Duration,

    /// TTL refreshed on every touch of an active batch's hot-state keys.
    #[serde(with = "humantime_serde", default = "default_active_ttl")]
    pub active_ttl: Duration,

    #[serde(default)]
    pub breaker: BreakerConfig,
}

const fn default_completed_ttl() -> Duration {
    Duration::from_secs(48 * 60 * 60)
}

const fn default_active_ttl() -> Duration {
    Duration::from_secs(7 * 24 * 60 * 60)
}

impl Default for HotStoreConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            completed_ttl: default_completed_ttl(),
            active_ttl: default_active_ttl(),
            breaker: BreakerConfig::default(),
        }
    }
}

impl std::fmt::Debug for HotStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HotStoreConfig")
            .field("url", &"REDACTED")
            .field("completed_ttl", &self.completed_ttl)
            .field("active_ttl", &self.active_ttl)
            .field("breaker", &self.breaker)
            .finish()
    }
}

/// Sliding-window circuit breaker parameters, reused identically by the hot
/// state store and the per-host HTTP client.
#[derive(Clone, Copy, Debug, serde::Deserialize)]
#[cfg_attr(feature = "test-util", derive(serde::Serialize))]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct BreakerConfig {
    #[serde(default = "default_threshold")]
    pub threshold: u32,
    #[serde(with = "humantime_serde", default = "default_window")]
    pub window: Duration,
    #[serde(with = "humantime_serde", default = "default_reset")]
    pub reset: Duration,
}

const fn default_threshold() -> u32 {
    3
}

const fn default_window() -> Duration {
    Duration::from_secs(10)
}

const fn default_reset() -> Duration {
    Duration::from_secs(5)
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            window: default_window(),
            reset: default_reset(),
        }
    }
}
