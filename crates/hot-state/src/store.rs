//! Redis-backed hot state: per-recipient status plus `{sent, failed}`
//! counters for a batch, read and written with the recency guarantees the
//! postgres mirror can't give while a batch is still processing.
//!
//! Every multi-field transition (`initialize_batch`, `record_results_batch`)
//! runs as a single Lua script so concurrent chunk workers never observe a
//! half-written counter pair.

use {
    crate::{breaker::SlidingWindowBreaker, HotStateError},
    configs::HotStoreConfig,
    model::{BatchCounters, BatchId, RecipientId, RecipientState},
    redis::{aio::ConnectionManager, AsyncCommands, Script},
    std::{future::Future, sync::Arc},
};

fn recipients_key(batch_id: BatchId) -> String {
    format!("batch:{batch_id}:recipients")
}

fn counters_key(batch_id: BatchId) -> String {
    format!("batch:{batch_id}:counters")
}

// ARGV[1] = ttl seconds, ARGV[2..] = recipient ids. Only sets fields that
// don't exist yet, so re-running initialize for an already-seen batch is a
// no-op for recipients already recorded.
const INITIALIZE_BATCH: &str = r#"
local ttl = tonumber(ARGV[1])
for i = 2, #ARGV do
    redis.call('HSETNX', KEYS[1], ARGV[i], '{"status":"pending"}')
end
redis.call('HSETNX', KEYS[2], 'sent', 0)
redis.call('HSETNX', KEYS[2], 'failed', 0)
redis.call('EXPIRE', KEYS[1], ttl)
redis.call('EXPIRE', KEYS[2], ttl)
return 'OK'
"#;

// ARGV[1] = ttl seconds, ARGV[2] = JSON array of {"id","state"} objects
// where `state` is already-terminal RecipientState JSON and its embedded
// `status` decides which counter to bump. Skips recipients whose existing
// state is already terminal, so redelivered chunk results can't double
// count.
const RECORD_RESULTS_BATCH: &str = r#"
local ttl = tonumber(ARGV[1])
local updates = cjson.decode(ARGV[2])
for _, u in ipairs(updates) do
    local existing = redis.call('HGET', KEYS[1], u.id)
    local already_terminal = false
    if existing then
        local ok, parsed = pcall(cjson.decode, existing)
        if ok and parsed.status ~= 'pending' and parsed.status ~= 'queued' then
            already_terminal = true
        end
    end
    if not already_terminal then
        redis.call('HSET', KEYS[1], u.id, u.state)
        if u.counts_as_sent then
            redis.call('HINCRBY', KEYS[2], 'sent', 1)
        elseif u.counts_as_failed then
            redis.call('HINCRBY', KEYS[2], 'failed', 1)
        end
    end
end
redis.call('EXPIRE', KEYS[1], ttl)
redis.call('EXPIRE', KEYS[2], ttl)
local sent = tonumber(redis.call('HGET', KEYS[2], 'sent')) or 0
local failed = tonumber(redis.call('HGET', KEYS[2], 'failed')) or 0
return {sent, failed}
"#;

#[derive(serde::Serialize)]
struct ResultUpdate {
    id: String,
    state: String,
    counts_as_sent: bool,
    counts_as_failed: bool,
}

/// One recipient's outcome, as reported by a chunk worker after a send
/// attempt. Kept separate from `RecipientState` so callers don't have to
/// pre-serialize it themselves.
pub struct RecipientResult {
    pub recipient_id: RecipientId,
    pub state: RecipientState,
}

pub struct HotStateStore {
    conn: ConnectionManager,
    breaker: Arc<SlidingWindowBreaker>,
    completed_ttl_secs: i64,
    active_ttl_secs: i64,
    initialize_script: Script,
    record_results_script: Script,
}

impl HotStateStore {
    pub async fn connect(config: &HotStoreConfig) -> Result<Self, HotStateError> {
        let client = redis::Client::open(config.url.as_str())?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            breaker: Arc::new(SlidingWindowBreaker::new(config.breaker)),
            completed_ttl_secs: config.completed_ttl.as_secs() as i64,
            active_ttl_secs: config.active_ttl.as_secs() as i64,
            initialize_script: Script::new(INITIALIZE_BATCH),
            record_results_script: Script::new(RECORD_RESULTS_BATCH),
        })
    }

    pub fn breaker(&self) -> Arc<SlidingWindowBreaker> {
        self.breaker.clone()
    }

    async fn guarded<T, F, Fut>(&self, op: F) -> Result<T, HotStateError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, HotStateError>>,
    {
        self.breaker.check().map_err(|_| HotStateError::Unavailable)?;
        match op().await {
            Ok(value) => {
                self.breaker.record_success();
                Ok(value)
            }
            Err(err) => {
                self.breaker.record_failure();
                Err(err)
            }
        }
    }

    /// Seeds pending state for every recipient in a batch before the first
    /// chunk is published. Idempotent: recipients already present keep
    /// whatever state they have.
    pub async fn initialize_batch(
        &self,
        batch_id: BatchId,
        recipient_ids: &[RecipientId],
    ) -> Result<(), HotStateError> {
        let mut conn = self.conn.clone();
        let recipients_key = recipients_key(batch_id);
        let counters_key = counters_key(batch_id);
        let script = self.initialize_script.clone();
        let ttl = self.active_ttl_secs;
        self.guarded(move || async move {
            let mut invocation = script.key(recipients_key).key(counters_key).arg(ttl);
            for id in recipient_ids {
                invocation = invocation.arg(id.0.to_string());
            }
            let _: String = invocation.invoke_async(&mut conn).await?;
            Ok(())
        })
        .await
    }

    /// Returns the already-processed state for every id in `recipient_ids`
    /// whose status is terminal; ids still `pending` (or absent) are left
    /// out of the map, telling the caller they still need to be sent.
    pub async fn check_recipients_processed_batch(
        &self,
        batch_id: BatchId,
        recipient_ids: &[RecipientId],
    ) -> Result<std::collections::HashMap<RecipientId, RecipientState>, HotStateError> {
        if recipient_ids.is_empty() {
            return Ok(std::collections::HashMap::new());
        }
        let mut conn = self.conn.clone();
        let key = recipients_key(batch_id);
        let fields: Vec<String> = recipient_ids.iter().map(|id| id.0.to_string()).collect();
        let raw: Vec<Option<String>> = self
            .guarded(move || async move { Ok(conn.hget(key, fields).await?) })
            .await?;

        let mut out = std::collections::HashMap::new();
        for (id, raw) in recipient_ids.iter().zip(raw) {
            let Some(raw) = raw else { continue };
            let state: RecipientState = serde_json::from_str(&raw)?;
            if state.status.is_terminal() {
                out.insert(*id, state);
            }
        }
        Ok(out)
    }

    /// Atomically writes terminal state for a batch of recipient results
    /// and bumps `sent`/`failed` counters accordingly, skipping any
    /// recipient already terminal. Returns the batch's counters after the
    /// write.
    pub async fn record_results_batch(
        &self,
        batch_id: BatchId,
        results: &[RecipientResult],
    ) -> Result<BatchCounters, HotStateError> {
        if results.is_empty() {
            return self.get_batch_stats(batch_id).await;
        }
        let updates = results
            .iter()
            .map(|result| {
                Ok(ResultUpdate {
                    id: result.recipient_id.0.to_string(),
                    state: serde_json::to_string(&result.state)?,
                    counts_as_sent: result.state.status.counts_as_sent(),
                    counts_as_failed: result.state.status.counts_as_failed(),
                })
            })
            .collect::<Result<Vec<_>, serde_json::Error>>()?;
        let payload = serde_json::to_string(&updates)?;

        let mut conn = self.conn.clone();
        let recipients_key = recipients_key(batch_id);
        let counters_key = counters_key(batch_id);
        let script = self.record_results_script.clone();
        let ttl = self.active_ttl_secs;
        let (sent, failed): (u64, u64) = self
            .guarded(move || async move {
                Ok(script
                    .key(recipients_key)
                    .key(counters_key)
                    .arg(ttl)
                    .arg(payload)
                    .invoke_async(&mut conn)
                    .await?)
            })
            .await?;
        Ok(BatchCounters { sent, failed })
    }

    pub async fn get_recipient_state(
        &self,
        batch_id: BatchId,
        recipient_id: RecipientId,
    ) -> Result<Option<RecipientState>, HotStateError> {
        let mut conn = self.conn.clone();
        let key = recipients_key(batch_id);
        let field = recipient_id.0.to_string();
        let raw: Option<String> = self
            .guarded(move || async move { Ok(conn.hget(key, field).await?) })
            .await?;
        raw.map(|raw| Ok(serde_json::from_str(&raw)?)).transpose()
    }

    pub async fn get_batch_stats(&self, batch_id: BatchId) -> Result<BatchCounters, HotStateError> {
        let mut conn = self.conn.clone();
        let key = counters_key(batch_id);
        let (sent, failed): (Option<u64>, Option<u64>) = self
            .guarded(move || async move {
                let sent: Option<u64> = conn.hget(&key, "sent").await?;
                let failed: Option<u64> = conn.hget(&key, "failed").await?;
                Ok((sent, failed))
            })
            .await?;
        Ok(BatchCounters {
            sent: sent.unwrap_or(0),
            failed: failed.unwrap_or(0),
        })
    }

    /// Refreshes TTL on a batch's hot-state keys to the `completed` value,
    /// called once the orchestrator marks a batch done so the keys expire
    /// sooner than an active batch's would.
    pub async fn mark_completed(&self, batch_id: BatchId) -> Result<(), HotStateError> {
        let mut conn = self.conn.clone();
        let recipients_key = recipients_key(batch_id);
        let counters_key = counters_key(batch_id);
        let ttl = self.completed_ttl_secs;
        self.guarded(move || async move {
            let _: () = conn.expire(&recipients_key, ttl).await?;
            let _: () = conn.expire(&counters_key, ttl).await?;
            Ok(())
        })
        .await
    }

    pub fn circuit_state(&self) -> crate::breaker::CircuitSnapshot {
        self.breaker.snapshot()
    }
}
