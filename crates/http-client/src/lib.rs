//! Resilient HTTP client used by the webhook module: per-host circuit
//! breaker (the same sliding-window implementation the hot state store
//! uses) plus capped-exponential retry with jitter.

pub mod client;
pub mod error;
pub mod retry;

pub use {
    client::{Method, ResilientClient, WebhookRequest, WebhookResponse},
    error::HttpClientError,
    retry::RetryPolicy,
};
