use {
    crate::batch::BatchId,
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::collections::HashMap,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct RecipientId(pub uuid::Uuid);

impl std::fmt::Display for RecipientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a single recipient within a batch. Transitions
/// monotonically toward a terminal status; once terminal, never reconsidered.
#[derive(Clone, Copy, Debug, Eq, PartialEq, strum::Display, strum::EnumString, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RecipientStatus {
    Pending,
    Queued,
    Sent,
    Failed,
    Bounced,
    Complained,
}

impl RecipientStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Sent | Self::Failed | Self::Bounced | Self::Complained
        )
    }

    /// Whether this status counts toward the batch's `sent_count`.
    pub fn counts_as_sent(self) -> bool {
        matches!(self, Self::Sent)
    }

    /// Whether this status counts toward the batch's `failed_count`.
    pub fn counts_as_failed(self) -> bool {
        matches!(self, Self::Failed | Self::Bounced | Self::Complained)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Recipient {
    pub id: RecipientId,
    pub batch_id: BatchId,
    /// Email address, phone number, or webhook URL, depending on the
    /// batch's module.
    pub address: String,
    pub name: Option<String>,
    #[serde(default)]
    pub variables: HashMap<String, String>,
    pub status: RecipientStatus,
    pub provider_message_id: Option<String>,
    pub error_message: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl Recipient {
    pub fn new_pending(batch_id: BatchId, address: String) -> Self {
        Self {
            id: RecipientId(uuid::Uuid::new_v4()),
            batch_id,
            address,
            name: None,
            variables: HashMap::new(),
            status: RecipientStatus::Pending,
            provider_message_id: None,
            error_message: None,
            sent_at: None,
        }
    }
}

/// Hot-state view of a single recipient (`hot-state`'s JSON value per hash
/// field). Deliberately smaller than `Recipient`: it's what survives a
/// `recordResultsBatch` write and what idempotency checks compare against.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecipientState {
    pub status: RecipientStatus,
    pub provider_message_id: Option<String>,
    pub error_message: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl RecipientState {
    pub fn success(provider_message_id: Option<String>, sent_at: DateTime<Utc>) -> Self {
        Self {
            status: RecipientStatus::Sent,
            provider_message_id,
            error_message: None,
            sent_at: Some(sent_at),
        }
    }

    pub fn failure(error_message: String) -> Self {
        Self {
            status: RecipientStatus::Failed,
            provider_message_id: None,
            error_message: Some(error_message),
            sent_at: None,
        }
    }
}

/// `{sent, failed}` counters held separately per batch for O(1) progress
/// reads, incremented atomically alongside `RecipientState` writes.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct BatchCounters {
    pub sent: u64,
    pub failed: u64,
}
