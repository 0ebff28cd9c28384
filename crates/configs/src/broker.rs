use {
    std::{num::NonZeroUsize, time::Duration},
    url::Url,
};

fn default_url() -> Url {
    default_broker_url().parse().expect("url should be valid")
}

const fn default_broker_url() -> &'static str {
    "nats://127.0.0.1:4222"
}

const fn default_max_in_flight() -> NonZeroUsize {
    NonZeroUsize::new(100).expect("value should be greater than 0")
}

/// Connection details for the durable queue broker.
#[derive(Clone, serde::Deserialize)]
#[cfg_attr(feature = "test-util", derive(serde::Serialize))]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct BrokerConfig {
    #[serde(
        default = "default_url",
        deserialize_with = "crate::deserialize_env::deserialize_url_from_env"
    )]
    pub url: Url,

    /// Maximum messages dispatched concurrently per consumer before the
    /// broker pauses redelivery, unless overridden per-consumer.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: NonZeroUsize,

    /// Dedup window honored for `Nats-Msg-Id` / `msgId` publishes.
    #[serde(with = "humantime_serde", default = "default_dedup_window")]
    pub dedup_window: Duration,
}

const fn default_dedup_window() -> Duration {
    Duration::from_secs(120)
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            max_in_flight: default_max_in_flight(),
            dedup_window: default_dedup_window(),
        }
    }
}

impl std::fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("url", &"REDACTED")
            .field("max_in_flight", &self.max_in_flight)
            .field("dedup_window", &self.dedup_window)
            .finish()
    }
}
