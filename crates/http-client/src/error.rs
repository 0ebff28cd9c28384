#[derive(Debug, thiserror::Error)]
pub enum HttpClientError {
    #[error("request url has no host")]
    MissingHost,
}
