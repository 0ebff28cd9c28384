use {
    crate::validation::ValidationResult,
    async_trait::async_trait,
    model::{EmbeddedSendConfig, RecipientId},
    std::time::Duration,
};

/// Outcome of a single delivery attempt.
#[derive(Clone, Debug)]
pub struct ExecuteResult {
    pub success: bool,
    pub provider_message_id: Option<String>,
    pub error: Option<String>,
    pub latency: Duration,
}

impl ExecuteResult {
    pub fn success(provider_message_id: Option<String>, latency: Duration) -> Self {
        Self {
            success: true,
            provider_message_id,
            error: None,
            latency,
        }
    }

    pub fn failure(error: impl Into<String>, latency: Duration) -> Self {
        Self {
            success: false,
            provider_message_id: None,
            error: Some(error.into()),
            latency,
        }
    }
}

/// The pluggable delivery unit. One instance per module kind, shared
/// across tenants; all per-tenant/per-config state lives in
/// `EmbeddedSendConfig`, not in the module itself.
#[async_trait]
pub trait Module: Send + Sync {
    fn validate_config(&self, raw: &serde_json::Value) -> ValidationResult;

    fn validate_payload(&self, payload: &serde_json::Value) -> ValidationResult;

    async fn execute(&self, payload: &serde_json::Value, config: &EmbeddedSendConfig) -> ExecuteResult;

    /// Whether `execute_batch`'s default loop-over-`execute` has been
    /// overridden with an actual batch API call.
    fn supports_batch(&self) -> bool {
        false
    }

    /// Default implementation loops `execute` sequentially; providers with
    /// a real batch API (the webhook module) override this.
    async fn execute_batch(
        &self,
        payloads: &[(RecipientId, serde_json::Value)],
        config: &EmbeddedSendConfig,
    ) -> Vec<(RecipientId, ExecuteResult)> {
        let mut results = Vec::with_capacity(payloads.len());
        for (recipient_id, payload) in payloads {
            let result = self.execute(payload, config).await;
            results.push((*recipient_id, result));
        }
        results
    }
}
