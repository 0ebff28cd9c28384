//! Real broker backend, on top of `async-nats`'s JetStream API.

use {
    crate::{Broker, Consumer, Msg, Publisher, QueueError},
    async_nats::jetstream::{
        self,
        consumer::{pull::Config as PullConfig, AckPolicy, Consumer as JsConsumer},
        stream::Config as StreamConfig,
        AckKind, Context as JetStreamContext,
    },
    async_trait::async_trait,
    bytes::Bytes,
    futures::StreamExt,
    std::time::Duration,
};

pub struct NatsBroker {
    jetstream: JetStreamContext,
}

impl NatsBroker {
    /// Connects to `url` and wraps the resulting client in a JetStream
    /// context. Reconnection is handled by `async-nats` itself; callers
    /// don't need their own retry loop around `connect`.
    pub async fn connect(url: &str, dedup_window: Duration) -> Result<Self, QueueError> {
        let client = async_nats::connect(url)
            .await
            .map_err(|err| QueueError::Connection(err.to_string()))?;
        let jetstream = jetstream::new(client);
        let broker = Self { jetstream };
        broker
            .ensure_stream(crate::subject::BATCHES_STREAM, &[crate::subject::BATCHES_SUBJECT.to_string()], dedup_window)
            .await?;
        broker
            .ensure_stream(crate::subject::CHUNKS_STREAM, &["chunks.*".to_string()], dedup_window)
            .await?;
        broker
            .ensure_stream(crate::subject::WEBHOOKS_STREAM, &["webhooks.*".to_string()], dedup_window)
            .await?;
        Ok(broker)
    }

    async fn ensure_stream(
        &self,
        name: &str,
        subjects: &[String],
        dedup_window: Duration,
    ) -> Result<(), QueueError> {
        let config = StreamConfig {
            name: name.to_string(),
            subjects: subjects.to_vec(),
            duplicate_window: dedup_window,
            ..Default::default()
        };
        match self.jetstream.get_stream(name).await {
            Ok(_) => {
                self.jetstream
                    .update_stream(config)
                    .await
                    .map_err(|err| QueueError::Connection(err.to_string()))?;
            }
            Err(_) => {
                self.jetstream
                    .create_stream(config)
                    .await
                    .map_err(|err| QueueError::Connection(err.to_string()))?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Publisher for NatsBroker {
    async fn publish(
        &self,
        subject: &str,
        payload: Bytes,
        msg_id: Option<&str>,
    ) -> Result<(), QueueError> {
        let ack = if let Some(msg_id) = msg_id {
            let mut headers = async_nats::HeaderMap::new();
            headers.insert("Nats-Msg-Id", msg_id);
            self.jetstream
                .publish_with_headers(subject.to_string(), headers, payload)
                .await
        } else {
            self.jetstream.publish(subject.to_string(), payload).await
        }
        .map_err(|err| QueueError::Publish(err.to_string()))?;

        ack.await.map_err(|err| QueueError::Publish(err.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl Broker for NatsBroker {
    type Consumer = NatsConsumer;

    async fn consumer(
        &self,
        stream: &str,
        consumer_name: &str,
        filter_subject: Option<&str>,
        max_in_flight: usize,
    ) -> Result<Self::Consumer, QueueError> {
        let stream = self
            .jetstream
            .get_stream(stream)
            .await
            .map_err(|err| QueueError::NotFound(err.to_string()))?;

        let config = PullConfig {
            durable_name: Some(consumer_name.to_string()),
            ack_policy: AckPolicy::Explicit,
            max_ack_pending: max_in_flight as i64,
            filter_subject: filter_subject.unwrap_or_default().to_string(),
            ..Default::default()
        };

        let consumer = stream
            .get_or_create_consumer(consumer_name, config)
            .await
            .map_err(|err| QueueError::Connection(err.to_string()))?;

        Ok(NatsConsumer { consumer })
    }
}

pub struct NatsConsumer {
    consumer: JsConsumer<PullConfig>,
}

#[async_trait]
impl Consumer for NatsConsumer {
    async fn fetch(
        &self,
        batch_size: usize,
        expires: Duration,
    ) -> Result<Vec<Box<dyn Msg>>, QueueError> {
        let messages = self
            .consumer
            .batch()
            .max_messages(batch_size)
            .expires(expires)
            .messages()
            .await
            .map_err(|err| QueueError::Consume(err.to_string()))?;

        let received: Vec<_> = messages.collect().await;
        let mut out = Vec::with_capacity(received.len());
        for result in received {
            match result {
                Ok(msg) => out.push(Box::new(NatsMsg { msg }) as Box<dyn Msg>),
                Err(err) => {
                    tracing::warn!(%err, "failed to receive message from consumer");
                }
            }
        }
        Ok(out)
    }
}

struct NatsMsg {
    msg: jetstream::Message,
}

#[async_trait]
impl Msg for NatsMsg {
    fn payload(&self) -> &Bytes {
        &self.msg.payload
    }

    fn subject(&self) -> &str {
        self.msg.subject.as_str()
    }

    fn redelivery_count(&self) -> u64 {
        self.msg
            .info()
            .map(|info| (info.delivered as u64).saturating_sub(1))
            .unwrap_or(0)
    }

    async fn ack(&self) -> Result<(), QueueError> {
        self.msg
            .ack()
            .await
            .map_err(|err| QueueError::Ack(err.to_string()))
    }

    async fn nak(&self, delay: Option<Duration>) -> Result<(), QueueError> {
        self.msg
            .ack_with(AckKind::Nak(delay))
            .await
            .map_err(|err| QueueError::Ack(err.to_string()))
    }
}
