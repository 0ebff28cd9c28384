//! In-memory stand-in for [`crate::Broker`], used by orchestrator and
//! chunk-processor tests that want real at-least-once/dedup semantics
//! without a running broker. Not a general NATS emulator: just enough
//! behavior (dedup window, redelivery on nak, fetch-with-wait) to exercise
//! the core's retry and idempotency paths.

use {
    crate::{Broker, Consumer, Msg, Publisher, QueueError},
    async_trait::async_trait,
    bytes::Bytes,
    dashmap::DashMap,
    std::{
        collections::VecDeque,
        sync::{
            atomic::{AtomicU64, Ordering},
            Arc,
        },
        time::Duration,
    },
    tokio::sync::Mutex,
};

struct Queued {
    payload: Bytes,
    subject: String,
    redelivery_count: u64,
}

#[derive(Default)]
struct SubjectQueue {
    messages: Mutex<VecDeque<Queued>>,
    notify: tokio::sync::Notify,
}

/// Shared in-process broker state. Clone to hand the same broker to
/// multiple tasks; all clones see the same queues.
#[derive(Clone, Default)]
pub struct FakeBroker {
    queues: Arc<DashMap<String, Arc<SubjectQueue>>>,
    seen_msg_ids: Arc<DashMap<String, ()>>,
    published: Arc<AtomicU64>,
}

impl FakeBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total successful publishes, deduplicated ones included, for test
    /// assertions.
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::SeqCst)
    }

    fn queue_for(&self, subject: &str) -> Arc<SubjectQueue> {
        self.queues
            .entry(subject.to_string())
            .or_insert_with(|| Arc::new(SubjectQueue::default()))
            .clone()
    }
}

#[async_trait]
impl Publisher for FakeBroker {
    async fn publish(
        &self,
        subject: &str,
        payload: Bytes,
        msg_id: Option<&str>,
    ) -> Result<(), QueueError> {
        if let Some(msg_id) = msg_id {
            if self.seen_msg_ids.insert(msg_id.to_string(), ()).is_some() {
                return Ok(());
            }
        }
        let queue = self.queue_for(subject);
        queue.messages.lock().await.push_back(Queued {
            payload,
            subject: subject.to_string(),
            redelivery_count: 0,
        });
        queue.notify.notify_waiters();
        self.published.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl Broker for FakeBroker {
    type Consumer = FakeConsumer;

    async fn consumer(
        &self,
        stream: &str,
        _consumer_name: &str,
        filter_subject: Option<&str>,
        _max_in_flight: usize,
    ) -> Result<Self::Consumer, QueueError> {
        let subject = filter_subject.unwrap_or(stream).to_string();
        Ok(FakeConsumer {
            queue: self.queue_for(&subject),
        })
    }
}

pub struct FakeConsumer {
    queue: Arc<SubjectQueue>,
}

#[async_trait]
impl Consumer for FakeConsumer {
    async fn fetch(
        &self,
        batch_size: usize,
        expires: Duration,
    ) -> Result<Vec<Box<dyn Msg>>, QueueError> {
        let deadline = tokio::time::Instant::now() + expires;
        loop {
            {
                let mut messages = self.queue.messages.lock().await;
                if !messages.is_empty() {
                    let mut out = Vec::new();
                    for _ in 0..batch_size {
                        let Some(queued) = messages.pop_front() else {
                            break;
                        };
                        out.push(Box::new(FakeMsg {
                            queue: self.queue.clone(),
                            payload: queued.payload,
                            subject: queued.subject,
                            redelivery_count: queued.redelivery_count,
                        }) as Box<dyn Msg>);
                    }
                    return Ok(out);
                }
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Ok(Vec::new());
            }
            let _ = tokio::time::timeout(remaining, self.queue.notify.notified()).await;
        }
    }
}

struct FakeMsg {
    queue: Arc<SubjectQueue>,
    payload: Bytes,
    subject: String,
    redelivery_count: u64,
}

#[async_trait]
impl Msg for FakeMsg {
    fn payload(&self) -> &Bytes {
        &self.payload
    }

    fn subject(&self) -> &str {
        &self.subject
    }

    fn redelivery_count(&self) -> u64 {
        self.redelivery_count
    }

    async fn ack(&self) -> Result<(), QueueError> {
        Ok(())
    }

    async fn nak(&self, delay: Option<Duration>) -> Result<(), QueueError> {
        let queue = self.queue.clone();
        let requeue = Queued {
            payload: self.payload.clone(),
            subject: self.subject.clone(),
            redelivery_count: self.redelivery_count + 1,
        };
        match delay {
            Some(delay) if !delay.is_zero() => {
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    queue.messages.lock().await.push_back(requeue);
                    queue.notify.notify_waiters();
                });
            }
            _ => {
                queue.messages.lock().await.push_back(requeue);
                queue.notify.notify_waiters();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dedup_suppresses_repeat_publish() {
        let broker = FakeBroker::new();
        broker
            .publish("chunks.t1", Bytes::from_static(b"one"), Some("dedup-key"))
            .await
            .unwrap();
        broker
            .publish("chunks.t1", Bytes::from_static(b"one"), Some("dedup-key"))
            .await
            .unwrap();
        assert_eq!(broker.published_count(), 1);

        let consumer = broker
            .consumer("chunks", "c1", Some("chunks.t1"), 10)
            .await
            .unwrap();
        let msgs = consumer.fetch(10, Duration::from_millis(50)).await.unwrap();
        assert_eq!(msgs.len(), 1);
    }

    #[tokio::test]
    async fn nak_requeues_with_incremented_redelivery_count() {
        let broker = FakeBroker::new();
        broker
            .publish("chunks.t1", Bytes::from_static(b"one"), None)
            .await
            .unwrap();
        let consumer = broker
            .consumer("chunks", "c1", Some("chunks.t1"), 10)
            .await
            .unwrap();

        let msgs = consumer.fetch(10, Duration::from_millis(50)).await.unwrap();
        assert_eq!(msgs[0].redelivery_count(), 0);
        msgs[0].nak(None).await.unwrap();

        let msgs = consumer.fetch(10, Duration::from_millis(50)).await.unwrap();
        assert_eq!(msgs[0].redelivery_count(), 1);
    }
}
