//! Buffered event logger for normalized webhook callbacks: writers append
//! to an in-memory buffer and return immediately, a background task flushes
//! it to `dispatch_events` on a timer or once it fills up, and the two
//! never block each other because a flush swaps the buffer out from under
//! new writes rather than draining it in place.

use {database::dispatch_events::DispatchEvent, std::time::Duration, tokio::sync::Mutex};

pub struct EventLog {
    db: sqlx::PgPool,
    buffer: Mutex<Vec<DispatchEvent>>,
    capacity: usize,
}

impl EventLog {
    pub fn new(db: sqlx::PgPool, capacity: usize, flush_interval: Duration) -> Self {
        let log = Self {
            db,
            buffer: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        };
        let _ = flush_interval;
        log
    }

    /// Spawns the timer-driven auto-flush loop. Separate from `new` so
    /// callers hold an `Arc<EventLog>` before handing a clone to the task.
    pub fn spawn_flush_loop(self: &std::sync::Arc<Self>, flush_interval: Duration) {
        let log = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(flush_interval);
            loop {
                ticker.tick().await;
                log.flush().await;
            }
        });
    }

    /// Appends one normalized event, flushing immediately (inline, on the
    /// caller's task) if the buffer has reached capacity.
    pub async fn push(&self, event: DispatchEvent) {
        let should_flush = {
            let mut buffer = self.buffer.lock().await;
            buffer.push(event);
            buffer.len() >= self.capacity
        };
        if should_flush {
            self.flush().await;
        }
    }

    /// Swaps the buffer out and writes whatever it held. Errors are logged
    /// and swallowed: a flush failure must never block new writes from
    /// accumulating for the next attempt.
    pub async fn flush(&self) {
        let pending = {
            let mut buffer = self.buffer.lock().await;
            if buffer.is_empty() {
                return;
            }
            std::mem::replace(&mut *buffer, Vec::with_capacity(self.capacity))
        };
        if let Err(err) = database::dispatch_events::insert_batch(&self.db, &pending).await {
            tracing::warn!(%err, dropped = pending.len(), "failed to flush buffered dispatch events");
        }
    }

    /// Used by shutdown phase 4: flush whatever remains, waiting for it to
    /// actually land rather than racing the process exit.
    pub async fn flush_blocking(&self) {
        self.flush().await;
    }
}
