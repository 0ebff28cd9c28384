//! Webhook module. The one module that actually performs provider I/O in
//! this codebase (user-supplied endpoint, not a concrete SES/Resend/Telnyx
//! integration), so it's the direct consumer of `http-client`.

use {
    crate::{
        module::{ExecuteResult, Module},
        validation::ValidationResult,
    },
    async_trait::async_trait,
    http_client::{Method, ResilientClient, WebhookRequest},
    model::{EmbeddedSendConfig, RecipientId},
    serde::Deserialize,
    std::{sync::Arc, time::Instant},
};

const DEFAULT_SUCCESS_CODES: [u16; 4] = [200, 201, 202, 204];

#[derive(Deserialize)]
struct WebhookConfig {
    url: String,
    #[serde(default = "default_method")]
    method: String,
    #[serde(default = "default_timeout_ms")]
    timeout_ms: u64,
    #[serde(default = "default_retries")]
    retries: u32,
    #[serde(default)]
    headers: Vec<(String, String)>,
    #[serde(default = "default_success_codes")]
    success_status_codes: Vec<u16>,
}

fn default_method() -> String {
    "POST".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_retries() -> u32 {
    3
}

fn default_success_codes() -> Vec<u16> {
    DEFAULT_SUCCESS_CODES.to_vec()
}

#[derive(Deserialize)]
struct BatchResponse {
    results: Vec<BatchResultEntry>,
}

#[derive(Deserialize)]
struct BatchResultEntry {
    recipient_id: uuid::Uuid,
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message_id: Option<String>,
}

pub struct WebhookModule {
    client: Arc<ResilientClient>,
}

impl WebhookModule {
    pub fn new(client: Arc<ResilientClient>) -> Self {
        Self { client }
    }

    fn parse_config(raw: &serde_json::Value) -> Result<WebhookConfig, String> {
        serde_json::from_value(raw.clone()).map_err(|err| err.to_string())
    }
}

#[async_trait]
impl Module for WebhookModule {
    fn validate_config(&self, raw: &serde_json::Value) -> ValidationResult {
        let config = match Self::parse_config(raw) {
            Ok(config) => config,
            Err(err) => return ValidationResult::from_errors(vec![err]),
        };
        let mut errors = Vec::new();
        if url::Url::parse(&config.url).map(|u| !matches!(u.scheme(), "http" | "https")).unwrap_or(true) {
            errors.push("url must be a valid http(s) URL".to_string());
        }
        if !matches!(config.method.as_str(), "POST" | "PUT") {
            errors.push("method must be POST or PUT".to_string());
        }
        if !(1000..=60_000).contains(&config.timeout_ms) {
            errors.push("timeout_ms must be in [1000, 60000]".to_string());
        }
        if config.retries > 10 {
            errors.push("retries must be in [0, 10]".to_string());
        }
        ValidationResult::from_errors(errors)
    }

    fn validate_payload(&self, _payload: &serde_json::Value) -> ValidationResult {
        // Webhook payloads are opaque, recipient-shaped JSON objects merged
        // into the batch envelope verbatim; there's no fixed schema to
        // check beyond it being an object.
        ValidationResult::ok()
    }

    async fn execute(&self, payload: &serde_json::Value, config: &EmbeddedSendConfig) -> ExecuteResult {
        let recipient_id = RecipientId(uuid::Uuid::new_v4());
        let mut results = self.execute_batch(std::slice::from_ref(&(recipient_id, payload.clone())), config).await;
        results.pop().map(|(_, result)| result).unwrap_or_else(|| {
            ExecuteResult::failure("webhook execute_batch returned no result", std::time::Duration::ZERO)
        })
    }

    fn supports_batch(&self) -> bool {
        true
    }

    async fn execute_batch(
        &self,
        payloads: &[(RecipientId, serde_json::Value)],
        config: &EmbeddedSendConfig,
    ) -> Vec<(RecipientId, ExecuteResult)> {
        let started = Instant::now();
        let webhook_config = match Self::parse_config(&config.config) {
            Ok(config) => config,
            Err(err) => {
                return payloads
                    .iter()
                    .map(|(id, _)| (*id, ExecuteResult::failure(format!("invalid webhook config: {err}"), started.elapsed())))
                    .collect();
            }
        };

        let Ok(url) = url::Url::parse(&webhook_config.url) else {
            return payloads
                .iter()
                .map(|(id, _)| (*id, ExecuteResult::failure("invalid webhook url", started.elapsed())))
                .collect();
        };

        let body = serde_json::json!({
            "recipients": payloads
                .iter()
                .map(|(id, payload)| {
                    let mut entry = payload.clone();
                    if let serde_json::Value::Object(map) = &mut entry {
                        map.insert("recipientId".to_string(), serde_json::Value::String(id.0.to_string()));
                    }
                    entry
                })
                .collect::<Vec<_>>(),
        });
        let body_bytes = bytes::Bytes::from(serde_json::to_vec(&body).unwrap_or_default());

        let method = if webhook_config.method == "PUT" { Method::Put } else { Method::Post };
        let request = WebhookRequest {
            url: &url,
            method,
            headers: &webhook_config.headers,
            body: body_bytes,
            timeout: std::time::Duration::from_millis(webhook_config.timeout_ms),
            success_status_codes: &webhook_config.success_status_codes,
            max_retries: Some(webhook_config.retries),
        };

        let response = match self.client.send(request).await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(%err, url = %url, "webhook dispatch failed before a request was sent");
                return payloads
                    .iter()
                    .map(|(id, _)| (*id, ExecuteResult::failure(err.to_string(), started.elapsed())))
                    .collect();
            }
        };

        if response.circuit_breaker_tripped {
            return payloads
                .iter()
                .map(|(id, _)| (*id, ExecuteResult::failure("circuit breaker open", started.elapsed())))
                .collect();
        }

        // Per-recipient results if the body parses as the batch response
        // shape; otherwise every recipient shares the request's overall
        // success/failure.
        if let Some(body) = &response.body {
            if let Ok(parsed) = serde_json::from_slice::<BatchResponse>(body) {
                let mut by_id: std::collections::HashMap<uuid::Uuid, BatchResultEntry> =
                    parsed.results.into_iter().map(|entry| (entry.recipient_id, entry)).collect();
                return payloads
                    .iter()
                    .map(|(id, _)| {
                        let result = match by_id.remove(&id.0) {
                            Some(entry) if entry.success.unwrap_or(false) => {
                                ExecuteResult::success(entry.message_id, started.elapsed())
                            }
                            Some(entry) => ExecuteResult::failure(
                                entry.error.unwrap_or_else(|| "webhook reported failure".to_string()),
                                started.elapsed(),
                            ),
                            None if response.success => ExecuteResult::success(None, started.elapsed()),
                            None => ExecuteResult::failure("not present in webhook response", started.elapsed()),
                        };
                        (*id, result)
                    })
                    .collect();
            }
        }

        payloads
            .iter()
            .map(|(id, _)| {
                let result = if response.success {
                    ExecuteResult::success(None, started.elapsed())
                } else {
                    ExecuteResult::failure(
                        response.error.clone().unwrap_or_else(|| format!("http status {:?}", response.status)),
                        started.elapsed(),
                    )
                };
                (*id, result)
            })
            .collect()
    }
}
