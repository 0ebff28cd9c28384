use {std::time::Duration, url::Url};

fn default_store_url() -> Url {
    "redis://127.0.0.1:6379".parse().expect("url should be valid")
}

/// Worker-wide defaults for the token-bucket stack. Per-module and
/// per-send-config rates are layered on top of these at acquisition time.
#[derive(Clone, serde::Deserialize)]
#[cfg_attr(feature = "test-util", derive(serde::Serialize))]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Backing store for the token-bucket hashes. Same Redis instance as
    /// the hot state store by default, but addressable separately since
    /// rate-limit counters can tolerate a flush hot state can't.
    #[serde(
        default = "default_store_url",
        deserialize_with = "crate::deserialize_env::deserialize_url_from_env"
    )]
    pub store_url: Url,

    /// System-wide requests-per-second ceiling, shared by every tenant.
    #[serde(default = "default_system_rate")]
    pub system_requests_per_second: u32,

    /// Timeout for a single acquisition attempt while sending.
    #[serde(with = "humantime_serde", default = "default_send_timeout")]
    pub send_timeout: Duration,

    /// Timeout the chunk processor allows the acquire loop before giving up
    /// and NAKing the chunk.
    #[serde(with = "humantime_serde", default = "default_worker_timeout")]
    pub worker_timeout: Duration,

    #[serde(default = "default_disabled")]
    pub disabled: bool,
}

const fn default_system_rate() -> u32 {
    1000
}

const fn default_send_timeout() -> Duration {
    Duration::from_secs(1)
}

const fn default_worker_timeout() -> Duration {
    Duration::from_secs(10)
}

const fn default_disabled() -> bool {
    false
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            store_url: default_store_url(),
            system_requests_per_second: default_system_rate(),
            send_timeout: default_send_timeout(),
            worker_timeout: default_worker_timeout(),
            disabled: default_disabled(),
        }
    }
}

impl std::fmt::Debug for RateLimitConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitConfig")
            .field("store_url", &"REDACTED")
            .field("system_requests_per_second", &self.system_requests_per_second)
            .field("send_timeout", &self.send_timeout)
            .field("worker_timeout", &self.worker_timeout)
            .field("disabled", &self.disabled)
            .finish()
    }
}
