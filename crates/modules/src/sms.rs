//! SMS module (`telnyx` today; shaped so another service can be added
//! without touching the trait). Concrete provider integration is out of
//! scope; this owns addressing validation and the contract surface.

use {
    crate::{
        module::{ExecuteResult, Module},
        validation::ValidationResult,
    },
    async_trait::async_trait,
    model::EmbeddedSendConfig,
    regex::Regex,
    serde::Deserialize,
    std::{sync::LazyLock, time::Instant},
};

/// E.164: `+` followed by 1-15 digits, first digit 1-9.
static E164_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\+[1-9]\d{0,14}$").expect("valid regex"));

#[derive(Deserialize)]
struct SmsConfig {
    service: String,
    #[serde(default)]
    messaging_profile_id: Option<String>,
    #[serde(default)]
    webhook_url: Option<String>,
}

#[derive(Deserialize)]
struct SmsPayload {
    to: String,
    message: String,
}

pub struct SmsModule;

#[async_trait]
impl Module for SmsModule {
    fn validate_config(&self, raw: &serde_json::Value) -> ValidationResult {
        let Ok(config) = serde_json::from_value::<SmsConfig>(raw.clone()) else {
            return ValidationResult::from_errors(vec!["invalid sms config shape".to_string()]);
        };
        let mut errors = Vec::new();
        if config.service != "telnyx" {
            errors.push(format!("unsupported sms service: {}", config.service));
        }
        if let Some(url) = &config.webhook_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                errors.push("webhook_url must be http(s)".to_string());
            }
        }
        ValidationResult::from_errors(errors)
    }

    fn validate_payload(&self, payload: &serde_json::Value) -> ValidationResult {
        let Ok(payload) = serde_json::from_value::<SmsPayload>(payload.clone()) else {
            return ValidationResult::from_errors(vec!["invalid sms payload shape".to_string()]);
        };
        let mut errors = Vec::new();
        if !E164_RE.is_match(&payload.to) {
            errors.push("to must be E.164 (+ followed by 1-15 digits)".to_string());
        }
        if payload.message.trim().is_empty() {
            errors.push("message must not be empty".to_string());
        }
        ValidationResult::from_errors(errors)
    }

    async fn execute(&self, payload: &serde_json::Value, _config: &EmbeddedSendConfig) -> ExecuteResult {
        let started = Instant::now();
        if serde_json::from_value::<SmsPayload>(payload.clone()).is_err() {
            return ExecuteResult::failure("invalid sms payload shape", started.elapsed());
        }
        ExecuteResult::success(Some(uuid::Uuid::new_v4().to_string()), started.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_e164_number() {
        let result = SmsModule.validate_payload(&serde_json::json!({"to": "+14155551234", "message": "hi"}));
        assert!(result.valid);
    }

    #[test]
    fn rejects_number_without_plus() {
        let result = SmsModule.validate_payload(&serde_json::json!({"to": "14155551234", "message": "hi"}));
        assert!(!result.valid);
    }

    #[test]
    fn rejects_leading_zero_after_plus() {
        let result = SmsModule.validate_payload(&serde_json::json!({"to": "+0115551234", "message": "hi"}));
        assert!(!result.valid);
    }

    #[test]
    fn rejects_non_telnyx_service() {
        let result = SmsModule.validate_config(&serde_json::json!({"service": "twilio"}));
        assert!(!result.valid);
    }
}
