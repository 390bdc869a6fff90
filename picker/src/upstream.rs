use crate::config::Upstream as UpstreamConfig;
use crate::metrics_defs::UPSTREAM_ATTEMPT_FAILED;
use crate::types::{AgencyKey, ContactPayload, UpstreamMeta};
use reqwest::StatusCode;
use reqwest::header::CACHE_CONTROL;
use serde_json::Value;
use shared::counter;
use std::time::Instant;
use tokio::time::{Duration, timeout};

/// Why a single attempt against the contact-list service failed.
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("timed out after {0} ms")]
    Timeout(u64),
    #[error("HTTP {0}")]
    HttpStatus(StatusCode),
    #[error("invalid body: {0}")]
    ParseError(String),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl FetchError {
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Timeout(_) => "timeout",
            FetchError::HttpStatus(_) => "http_status",
            FetchError::ParseError(_) => "parse_error",
            FetchError::Transport(_) => "transport",
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::HttpStatus(status) => Some(status.as_u16()),
            _ => None,
        }
    }
}

/// Every attempt failed. `error` is the last one.
#[derive(thiserror::Error, Debug)]
#[error("upstream failed: {error}")]
pub struct FetchFailure {
    pub error: FetchError,
    pub meta: UpstreamMeta,
}

#[derive(Debug)]
pub struct Fetched {
    pub payload: ContactPayload,
    pub meta: UpstreamMeta,
}

/// Client for `{base_url}/agency/{agency}/random-contact`. Holds no state between calls.
#[derive(Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    max_attempts: u32,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig) -> Self {
        UpstreamClient {
            client: reqwest::Client::new(),
            base_url: config.base_url.as_str().trim_end_matches('/').to_string(),
            timeout: Duration::from_millis(config.timeout_ms),
            max_attempts: config.max_attempts.max(1),
        }
    }

    fn contact_url(&self, agency: AgencyKey) -> String {
        format!("{}/agency/{agency}/random-contact", self.base_url)
    }

    /// Retries immediately on any failure until `max_attempts` is reached.
    pub async fn fetch(&self, agency: AgencyKey) -> Result<Fetched, FetchFailure> {
        let url = self.contact_url(agency);
        let mut meta = UpstreamMeta::default();

        let mut attempt = 0;
        loop {
            attempt += 1;
            meta.attempts = attempt;
            let started = Instant::now();
            let result = self.attempt(&url).await;
            meta.elapsed_ms = Some(started.elapsed().as_millis() as u64);

            match result {
                Ok((status, payload)) => {
                    meta.http_status = Some(status.as_u16());
                    return Ok(Fetched { payload, meta });
                }
                Err(error) => {
                    counter!(UPSTREAM_ATTEMPT_FAILED).increment(1);
                    tracing::debug!(
                        agency,
                        attempt,
                        kind = error.kind(),
                        "upstream attempt failed: {error}"
                    );

                    meta.last_error = Some(error.to_string());
                    meta.http_status = error.status();

                    if attempt >= self.max_attempts {
                        return Err(FetchFailure { error, meta });
                    }
                }
            }
        }
    }

    // The timeout covers reading the body as well as receiving the headers.
    async fn attempt(&self, url: &str) -> Result<(StatusCode, ContactPayload), FetchError> {
        timeout(self.timeout, self.request(url))
            .await
            .map_err(|_| FetchError::Timeout(self.timeout.as_millis() as u64))?
    }

    async fn request(&self, url: &str) -> Result<(StatusCode, ContactPayload), FetchError> {
        let response = self
            .client
            .get(url)
            .header(CACHE_CONTROL, "no-store")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status));
        }

        let body = response.bytes().await?;
        let value: Value =
            serde_json::from_slice(&body).map_err(|e| FetchError::ParseError(e.to_string()))?;

        if is_empty_body(&value) {
            return Err(FetchError::ParseError(format!("empty body: {value}")));
        }

        Ok((status, ContactPayload::new(value)))
    }
}

/// `null`, `false`, zero and `""` carry no contact list and count as a failed attempt.
fn is_empty_body(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}
