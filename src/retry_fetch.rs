//! Retrying HTTP GET for upstream JSON and HTML.
//!
//! Each attempt carries its own deadline; dropping the in-flight future on expiry
//! cancels the request. Retriable failures (timeouts, 5xx, 429, transient transport
//! faults) are retried with `base_delay_ms * 2^i + jitter`; anything else fails
//! immediately. Once the budget is spent the last error is returned unchanged.

use log::debug;
use rand::Rng;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio_retry::RetryIf;

use crate::metrics;

/// Message fragments that mark a transport fault as transient.
const TRANSIENT_PATTERNS: &[&str] = &[
    "abort",
    "timed out",
    "timeout",
    "dns",
    "failed to lookup address",
    "name resolution",
    "eai_again",
    "enotfound",
    "connection reset",
    "econnreset",
    "connection closed",
    "connection refused",
    "error trying to connect",
    "socket hang up",
    "broken pipe",
    "etimedout",
    "incomplete message",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of requests, first one included.
    pub attempts: u32,
    pub base_delay_ms: u64,
    pub timeout_ms: u64,
    /// Upper bound of the random delay added to every backoff step.
    pub jitter_ms: u64,
}

impl RetryPolicy {
    pub fn new(attempts: u32, base_delay_ms: u64, timeout_ms: u64) -> Self {
        Self {
            attempts,
            base_delay_ms,
            timeout_ms,
            jitter_ms: 0,
        }
    }

    pub fn with_jitter(mut self, jitter_ms: u64) -> Self {
        self.jitter_ms = jitter_ms;
        self
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Delays slept between attempts; `attempts - 1` entries.
    pub fn backoff_schedule(&self) -> Vec<Duration> {
        let retries = self.attempts.saturating_sub(1);
        let mut rng = rand::thread_rng();
        (0..retries)
            .map(|i| {
                let exp = self.base_delay_ms.saturating_mul(1u64 << i.min(20));
                let jitter = if self.jitter_ms > 0 {
                    rng.gen_range(0..=self.jitter_ms)
                } else {
                    0
                };
                Duration::from_millis(exp.saturating_add(jitter))
            })
            .collect()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay_ms: 300,
            timeout_ms: 15_000,
            jitter_ms: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("Request to {url} timed out after {timeout_ms} ms")]
    Timeout { url: String, timeout_ms: u64 },
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Failed to decode response: {0}")]
    Decode(String),
    #[error("Invalid url: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    pub fn is_retriable(&self) -> bool {
        match self {
            FetchError::Timeout { .. } => true,
            FetchError::Status { status, .. } => *status == 429 || (500..600).contains(status),
            FetchError::Transport(message) => is_transient_message(message),
            FetchError::Decode(_) | FetchError::InvalidUrl(_) => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Timeout { .. } => "timeout",
            FetchError::Status { .. } => "status",
            FetchError::Transport(_) => "transport",
            FetchError::Decode(_) => "decode",
            FetchError::InvalidUrl(_) => "invalid_url",
        }
    }

    fn from_reqwest(url: &str, timeout_ms: u64, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return FetchError::Timeout {
                url: url.to_string(),
                timeout_ms,
            };
        }
        if err.is_decode() {
            return FetchError::Decode(err.to_string());
        }
        // only the error chain is classified, never the url
        let err = err.without_url();
        let mut message = err.to_string();
        let mut source = std::error::Error::source(&err);
        while let Some(inner) = source {
            message.push_str(": ");
            message.push_str(&inner.to_string());
            source = inner.source();
        }
        FetchError::Transport(message)
    }
}

/// Transport-fault classification by message pattern.
pub fn is_transient_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    TRANSIENT_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Runs `op` under `policy`, retrying only retriable failures.
pub async fn retry_with_policy<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let start = Instant::now();
    let mut attempt = 0u32;
    let schedule = policy.backoff_schedule();

    let result = RetryIf::start(
        schedule,
        || {
            attempt += 1;
            metrics::record_fetch_attempt(label);
            if attempt > 1 {
                metrics::increment_fetch_retry(label);
            }
            op()
        },
        |e: &FetchError| {
            let retriable = e.is_retriable();
            if retriable {
                debug!("🔁 Retriable failure on {}: {}", label, e);
            }
            retriable
        },
    )
    .await;

    metrics::record_fetch_duration(label, start.elapsed());
    if let Err(ref e) = result {
        metrics::increment_fetch_failure(e.kind());
    }
    result
}

/// Single GET returning the body text. Non-2xx is an error.
pub async fn fetch_text_once(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<String, FetchError> {
    let timeout_ms = timeout.as_millis() as u64;
    let request = async {
        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, timeout_ms, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(url, timeout_ms, e))
    };

    match tokio::time::timeout(timeout, request).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout {
            url: url.to_string(),
            timeout_ms,
        }),
    }
}

pub(crate) fn validate_url(url: &str) -> Result<(), FetchError> {
    url::Url::parse(url)
        .map(|_| ())
        .map_err(|e| FetchError::InvalidUrl(format!("{}: {}", url, e)))
}

pub async fn fetch_text_with_retry(
    client: &reqwest::Client,
    url: &str,
    policy: &RetryPolicy,
) -> Result<String, FetchError> {
    validate_url(url)?;
    let timeout = policy.timeout();
    retry_with_policy(policy, url, || fetch_text_once(client, url, timeout)).await
}

/// `fetchWithRetry`: GET + JSON decode. Decode failures are not retried.
pub async fn fetch_with_retry(
    client: &reqwest::Client,
    url: &str,
    policy: &RetryPolicy,
) -> Result<serde_json::Value, FetchError> {
    fetch_json_with_retry(client, url, policy).await
}

pub async fn fetch_json_with_retry<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    policy: &RetryPolicy,
) -> Result<T, FetchError> {
    let body = fetch_text_with_retry(client, url, policy).await?;
    serde_json::from_str(&body).map_err(|e| FetchError::Decode(format!("{}: {}", url, e)))
}
