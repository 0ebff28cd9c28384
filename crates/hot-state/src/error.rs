#[derive(Debug, thiserror::Error)]
pub enum HotStateError {
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("malformed recipient state: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("hot state store unavailable")]
    Unavailable,
}
