/// Every component boundary returns one of these instead of throwing; only
/// the message is ever surfaced to a caller, never a stack trace.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("authentication failed")]
    Auth,

    #[error("not found: {0}")]
    NotFound(String),

    /// Rate-limit stack could not acquire a token before the caller's
    /// deadline. Not logged as a failure; the caller should NAK with
    /// `retry_after`.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Retryable provider error (5xx/429/408, network, timeout).
    #[error("transient provider error: {0}")]
    ProviderTransient(String),

    /// Non-retryable provider error; the recipient is recorded `failed`.
    #[error("permanent provider error: {0}")]
    ProviderPermanent(String),

    /// Hot-state breaker is open, or the store itself errored. Callers must
    /// NAK with backoff and must never treat this as "not processed".
    #[error("hot state unavailable")]
    HotStateUnavailable,

    /// Broker publish/consume failure.
    #[error("queue unavailable: {0}")]
    QueueUnavailable(String),

    /// Unparseable bus payload or schema mismatch: ack-and-drop.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl DispatchError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::ProviderTransient(_) | Self::HotStateUnavailable
        )
    }
}
