//! Resilient HTTP client for webhook delivery: per-host circuit breaker,
//! retry with capped exponential backoff, and a request timeout, all driven
//! by one [`configs::HttpClientConfig`].

use {
    crate::{
        error::HttpClientError,
        retry::{is_retryable_status, RetryPolicy},
    },
    bytes::Bytes,
    configs::HttpClientConfig,
    dashmap::DashMap,
    hot_state::SlidingWindowBreaker,
    std::{sync::Arc, time::Duration},
    tracing::warn,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Method {
    Post,
    Put,
}

impl Method {
    fn as_reqwest(self) -> reqwest::Method {
        match self {
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
        }
    }
}

pub struct WebhookRequest<'a> {
    pub url: &'a url::Url,
    pub method: Method,
    pub headers: &'a [(String, String)],
    pub body: Bytes,
    pub timeout: Duration,
    pub success_status_codes: &'a [u16],
    /// Per-request retry ceiling (a webhook config's own `retries` field),
    /// overriding the client-wide default when set.
    pub max_retries: Option<u32>,
}

#[derive(Clone, Debug)]
pub struct WebhookResponse {
    pub success: bool,
    pub circuit_breaker_tripped: bool,
    pub status: Option<u16>,
    pub body: Option<Bytes>,
    pub error: Option<String>,
}

impl WebhookResponse {
    fn breaker_tripped() -> Self {
        Self {
            success: false,
            circuit_breaker_tripped: true,
            status: None,
            body: None,
            error: None,
        }
    }

    fn failure(status: Option<u16>, body: Option<Bytes>, error: Option<String>) -> Self {
        Self {
            success: false,
            circuit_breaker_tripped: false,
            status,
            body,
            error,
        }
    }

    fn success(status: u16, body: Bytes) -> Self {
        Self {
            success: true,
            circuit_breaker_tripped: false,
            status: Some(status),
            body: Some(body),
            error: None,
        }
    }
}

/// One client per process; per-host breakers are created lazily as new
/// hosts are contacted.
pub struct ResilientClient {
    http: reqwest::Client,
    retry: RetryPolicy,
    breaker_config: configs::BreakerConfig,
    breakers: DashMap<String, Arc<SlidingWindowBreaker>>,
}

impl ResilientClient {
    pub fn new(config: HttpClientConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            retry: RetryPolicy::from(config),
            breaker_config: config.breaker,
            breakers: DashMap::new(),
        }
    }

    fn breaker_for(&self, host: &str) -> Arc<SlidingWindowBreaker> {
        self.breakers
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(SlidingWindowBreaker::new(self.breaker_config)))
            .clone()
    }

    /// Returns the circuit state for a host, for diagnostics; `None` if no
    /// request has ever been attempted against it.
    pub fn circuit_state(&self, host: &str) -> Option<hot_state::CircuitSnapshot> {
        self.breakers.get(host).map(|b| b.snapshot())
    }

    pub async fn send(&self, request: WebhookRequest<'_>) -> Result<WebhookResponse, HttpClientError> {
        let host = request.url.host_str().ok_or(HttpClientError::MissingHost)?.to_string();
        let breaker = self.breaker_for(&host);

        if breaker.check().is_err() {
            return Ok(WebhookResponse::breaker_tripped());
        }

        let max_retries = request.max_retries.unwrap_or(self.retry.max_retries);
        let mut attempt = 0;
        loop {
            let mut builder = self
                .http
                .request(request.method.as_reqwest(), request.url.clone())
                .timeout(request.timeout)
                .body(request.body.clone());
            for (name, value) in request.headers {
                builder = builder.header(name, value);
            }

            let outcome = builder.send().await;
            match outcome {
                Ok(response) => {
                    let status = response.status().as_u16();
                    let body = response.bytes().await.unwrap_or_default();
                    if request.success_status_codes.contains(&status) {
                        breaker.record_success();
                        return Ok(WebhookResponse::success(status, body));
                    }
                    if is_retryable_status(status) && attempt < max_retries {
                        let delay = self.retry.next_delay(attempt);
                        attempt += 1;
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    breaker.record_failure();
                    return Ok(WebhookResponse::failure(Some(status), Some(body), None));
                }
                Err(err) => {
                    let retryable = err.is_timeout() || err.is_connect() || err.is_request();
                    if retryable && attempt < max_retries {
                        warn!(%err, %host, attempt, "webhook request failed, retrying");
                        let delay = self.retry.next_delay(attempt);
                        attempt += 1;
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    breaker.record_failure();
                    return Ok(WebhookResponse::failure(None, None, Some(err.to_string())));
                }
            }
        }
    }
}
