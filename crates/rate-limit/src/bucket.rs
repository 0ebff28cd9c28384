//! Bucket identity and shape. A chain is just an ordered list of these;
//! nothing about acquisition cares whether a given bucket is "system",
//! "provider" or "config" — that's only how callers build the chain.

/// One token bucket in an acquisition chain: a stable Redis key, a refill
/// rate, and a cap on accumulated tokens.
#[derive(Clone, Debug)]
pub struct BucketSpec {
    pub key: String,
    pub requests_per_second: f64,
    pub burst_capacity: f64,
}

impl BucketSpec {
    pub fn new(key: impl Into<String>, requests_per_second: u32) -> Self {
        let rate = f64::from(requests_per_second).max(0.01);
        Self {
            key: key.into(),
            requests_per_second: rate,
            burst_capacity: (2.0 * rate).max(1000.0),
        }
    }

    pub fn system(requests_per_second: u32) -> Self {
        Self::new("rl:system:bucket", requests_per_second)
    }

    pub fn provider(provider: &str, requests_per_second: u32) -> Self {
        Self::new(format!("rl:managed:{provider}:bucket"), requests_per_second)
    }

    pub fn send_config(send_config_id: model::SendConfigId, requests_per_second: u32) -> Self {
        Self::new(format!("rl:cfg:{send_config_id}:bucket"), requests_per_second)
    }
}
