//! Thin wrapper over a stream-oriented durable message bus: named streams,
//! named consumers with independent cursors, explicit ack/nak-with-delay,
//! and publish-time dedup over a window. `nats.rs` is the only real
//! backend; `fake.rs` is an in-memory stand-in used by tests that don't
//! want to spin up a broker.

pub mod error;
pub mod fake;
pub mod nats;
pub mod subject;

use {async_trait::async_trait, bytes::Bytes, std::time::Duration};

pub use error::QueueError;

/// A message pulled off a consumer. Redelivery count lets callers decide
/// whether to escalate (e.g. treat a chunk as poison after N redeliveries).
#[async_trait]
pub trait Msg: Send + Sync {
    fn payload(&self) -> &Bytes;
    fn subject(&self) -> &str;
    fn redelivery_count(&self) -> u64;
    async fn ack(&self) -> Result<(), QueueError>;
    async fn nak(&self, delay: Option<Duration>) -> Result<(), QueueError>;
}

/// Publishes messages, optionally deduplicated by `msg_id` within the
/// broker's configured window. Callers must not mutate hot state before a
/// publish this trait reports as successful: a failed publish must leave no
/// trace for a retrying caller to trip over.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(
        &self,
        subject: &str,
        payload: Bytes,
        msg_id: Option<&str>,
    ) -> Result<(), QueueError>;
}

/// A durable pull consumer bound to one stream. Creation is idempotent:
/// calling `consumer` twice with the same name must not spawn duplicate
/// server-side consumers.
#[async_trait]
pub trait Broker: Publisher {
    type Consumer: Consumer;

    /// Ensures the named consumer exists on `stream`, creating it
    /// (lazily, on first use) if it doesn't.
    async fn consumer(
        &self,
        stream: &str,
        consumer_name: &str,
        filter_subject: Option<&str>,
        max_in_flight: usize,
    ) -> Result<Self::Consumer, QueueError>;
}

#[async_trait]
pub trait Consumer: Send + Sync {
    /// Pulls up to `batch_size` messages, waiting up to `expires` for at
    /// least one to arrive before returning an empty batch.
    async fn fetch(
        &self,
        batch_size: usize,
        expires: Duration,
    ) -> Result<Vec<Box<dyn Msg>>, QueueError>;
}
