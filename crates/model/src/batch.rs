use {
    crate::{send_config::SendConfigId, ModuleKind, TenantId},
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct BatchId(pub uuid::Uuid);

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State machine for a batch. Transitions are owned exclusively by the batch
/// orchestrator (never by the chunk processor).
#[derive(Clone, Copy, Debug, Eq, PartialEq, strum::Display, strum::EnumString, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BatchStatus {
    Draft,
    Scheduled,
    Queued,
    Processing,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl BatchStatus {
    /// No further chunk processing should ever be scheduled for a batch in
    /// one of these states.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// A user-submitted unit of work: many recipients sharing one piece of
/// content/template, dispatched through a single module.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    pub tenant_id: TenantId,
    pub send_config_id: Option<SendConfigId>,
    pub module: ModuleKind,
    /// Module-specific payload defaults (e.g. subject/from for email),
    /// merged with each recipient's own variables at send time.
    pub payload_defaults: serde_json::Value,
    pub total_recipients: u64,
    pub sent_count: u64,
    pub failed_count: u64,
    pub status: BatchStatus,
    pub dry_run: bool,
    pub created_at: DateTime<Utc>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Batch {
    /// Never allowed to observe more completions than recipients.
    pub fn counters_are_consistent(&self) -> bool {
        self.sent_count + self.failed_count <= self.total_recipients
    }

    pub fn is_fully_resolved(&self) -> bool {
        self.sent_count + self.failed_count == self.total_recipients
    }
}
