use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct SendConfigId(pub uuid::Uuid);

impl std::fmt::Display for SendConfigId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which delivery driver a send-config (and the batches built on it) uses.
/// Kept as a closed enum rather than a free-form string, tagged at
/// serialization time instead of carrying a duck-typed config blob.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, strum::Display, strum::EnumString, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ModuleKind {
    Email,
    Sms,
    Webhook,
}

impl ModuleKind {
    /// Provider batch-size ceiling used when `recipientsPerRequest` isn't
    /// overridden on the send-config.
    pub fn default_provider_batch_size(self) -> usize {
        match self {
            Self::Email => 50, // SES; Resend modules override this per-service.
            Self::Sms => 1,    // Telnyx has no batch send API.
            Self::Webhook => 100,
        }
    }

    /// Default `requestsPerSecond` per module, used when neither the
    /// send-config nor the deprecated `perSecond` field specify one.
    pub fn default_requests_per_second(self) -> u32 {
        match self {
            Self::Email => 100, // resend; ses-specific configs override to 14.
            Self::Sms => 15,
            Self::Webhook => 20,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct RateLimitOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requests_per_second: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipients_per_request: Option<u32>,
    /// Deprecated alias for `requests_per_second`, honored only when the
    /// latter is absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_second: Option<u32>,
}

impl RateLimitOverride {
    pub fn effective_requests_per_second(&self, module: ModuleKind) -> u32 {
        self.requests_per_second
            .or(self.per_second)
            .unwrap_or_else(|| module.default_requests_per_second())
    }

    pub fn effective_recipients_per_request(&self, module: ModuleKind) -> usize {
        self.recipients_per_request
            .map(|n| n as usize)
            .unwrap_or_else(|| module.default_provider_batch_size())
    }
}

/// Snapshot of a send-config embedded into a chunk job. Embedding avoids a
/// lookup during processing: mutations to the source config do not
/// retro-affect in-flight chunks.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmbeddedSendConfig {
    pub id: SendConfigId,
    pub module: ModuleKind,
    /// Module-opaque configuration (credentials reference, subject/from,
    /// webhook URL, ...).
    pub config: serde_json::Value,
    #[serde(default)]
    pub rate_limit: RateLimitOverride,
}
