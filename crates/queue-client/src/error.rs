#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("broker connection error: {0}")]
    Connection(String),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("consume failed: {0}")]
    Consume(String),

    #[error("ack/nak failed: {0}")]
    Ack(String),

    #[error("stream or consumer not found: {0}")]
    NotFound(String),
}
