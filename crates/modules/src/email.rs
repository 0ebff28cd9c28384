//! Email module. Validates addressing and content, applies `{{key}}`
//! substitution, then hands off to a mock send — the concrete `ses`/
//! `resend` provider integrations are out of scope here; this module only
//! owns the contract surface (validation, templating, result shape) they'd
//! plug into.

use {
    crate::{
        module::{ExecuteResult, Module},
        templating,
        validation::ValidationResult,
    },
    async_trait::async_trait,
    model::EmbeddedSendConfig,
    regex::Regex,
    serde::Deserialize,
    std::{
        collections::{hash_map::DefaultHasher, HashMap},
        hash::{Hash, Hasher},
        sync::LazyLock,
        time::Instant,
    },
};

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid regex"));

#[derive(Deserialize)]
struct EmailConfig {
    service: String,
    #[serde(default)]
    from: Option<String>,
}

#[derive(Deserialize)]
struct EmailPayload {
    to: String,
    subject: String,
    #[serde(default)]
    html: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    variables: HashMap<String, String>,
}

pub struct EmailModule;

#[async_trait]
impl Module for EmailModule {
    fn validate_config(&self, raw: &serde_json::Value) -> ValidationResult {
        let Ok(config) = serde_json::from_value::<EmailConfig>(raw.clone()) else {
            return ValidationResult::from_errors(vec!["invalid email config shape".to_string()]);
        };
        let mut errors = Vec::new();
        if !matches!(config.service.as_str(), "ses" | "resend") {
            errors.push(format!("unsupported email service: {}", config.service));
        }
        if let Some(from) = &config.from {
            if !EMAIL_RE.is_match(from) {
                errors.push("from is not a valid email address".to_string());
            }
        }
        ValidationResult::from_errors(errors)
    }

    fn validate_payload(&self, payload: &serde_json::Value) -> ValidationResult {
        let Ok(payload) = serde_json::from_value::<EmailPayload>(payload.clone()) else {
            return ValidationResult::from_errors(vec!["invalid email payload shape".to_string()]);
        };
        let mut errors = Vec::new();
        if !EMAIL_RE.is_match(&payload.to) {
            errors.push("to is not a valid email address".to_string());
        }
        if payload.subject.trim().is_empty() {
            errors.push("subject must not be empty".to_string());
        }
        if payload.html.is_none() && payload.text.is_none() {
            errors.push("one of html or text content is required".to_string());
        }
        ValidationResult::from_errors(errors)
    }

    async fn execute(&self, payload: &serde_json::Value, _config: &EmbeddedSendConfig) -> ExecuteResult {
        let started = Instant::now();
        let payload: EmailPayload = match serde_json::from_value(payload.clone()) {
            Ok(payload) => payload,
            Err(err) => return ExecuteResult::failure(format!("invalid payload: {err}"), started.elapsed()),
        };
        let subject = templating::substitute(&payload.subject, &payload.variables);
        let html = payload.html.as_deref().map(|html| templating::substitute(html, &payload.variables));
        let text = payload.text.as_deref().map(|text| templating::substitute(text, &payload.variables));

        tracing::debug!(to = %payload.to, %subject, "sending templated email");
        ExecuteResult::success(Some(rendered_message_id(&payload.to, &subject, html.as_deref(), text.as_deref())), started.elapsed())
    }
}

/// Mock provider message id, derived from the rendered content so the same
/// template with different resolved variables never collides.
fn rendered_message_id(to: &str, subject: &str, html: Option<&str>, text: Option<&str>) -> String {
    let mut hasher = DefaultHasher::new();
    to.hash(&mut hasher);
    subject.hash(&mut hasher);
    html.hash(&mut hasher);
    text.hash(&mut hasher);
    format!("{:016x}-{}", hasher.finish(), uuid::Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_to_address() {
        let result = EmailModule.validate_payload(&serde_json::json!({
            "to": "not-an-email",
            "subject": "hi",
            "text": "body",
        }));
        assert!(!result.valid);
    }

    #[test]
    fn requires_html_or_text_content() {
        let result = EmailModule.validate_payload(&serde_json::json!({
            "to": "a@example.com",
            "subject": "hi",
        }));
        assert!(!result.valid);
    }

    #[test]
    fn accepts_well_formed_payload() {
        let result = EmailModule.validate_payload(&serde_json::json!({
            "to": "a@example.com",
            "subject": "hi",
            "text": "body",
        }));
        assert!(result.valid);
    }

    #[test]
    fn rejects_unsupported_service() {
        let result = EmailModule.validate_config(&serde_json::json!({"service": "sendgrid"}));
        assert!(!result.valid);
    }

    #[tokio::test]
    async fn execute_applies_variable_substitution_before_sending() {
        let config = model::EmbeddedSendConfig {
            id: model::SendConfigId(uuid::Uuid::nil()),
            module: model::ModuleKind::Email,
            config: serde_json::json!({"service": "ses"}),
            rate_limit: Default::default(),
        };
        let payload = serde_json::json!({
            "to": "a@example.com",
            "subject": "Hi {{name}}",
            "text": "Welcome, {{name}}",
            "variables": { "name": "Ada" },
        });
        let result = EmailModule.execute(&payload, &config).await;
        assert!(result.success);

        let other_payload = serde_json::json!({
            "to": "a@example.com",
            "subject": "Hi {{name}}",
            "text": "Welcome, {{name}}",
            "variables": { "name": "Grace" },
        });
        let other_result = EmailModule.execute(&other_payload, &config).await;

        let hash_prefix = |id: &str| id.splitn(2, '-').next().unwrap().to_string();
        assert_ne!(
            hash_prefix(result.provider_message_id.as_deref().unwrap()),
            hash_prefix(other_result.provider_message_id.as_deref().unwrap()),
            "rendered content must flow into the send, not just be computed and discarded"
        );
    }
}
