use std::time::Duration;

use tracing::debug;

use crate::ProviderError;

/// Retry tuning for provider fetches: `attempts` total tries, delays of
/// backoff × 2^(n−1) before retry n.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

/// Send a request, retrying transient failures: 5xx responses and
/// network-level connect/timeout errors. 4xx responses come back as-is —
/// retrying a client error resolves nothing.
pub async fn fetch_with_retry(
    builder: reqwest::RequestBuilder,
    policy: &RetryPolicy,
) -> Result<reqwest::Response, ProviderError> {
    let mut last_err = ProviderError::Http("no attempts made".into());

    for attempt in 0..policy.attempts {
        if attempt > 0 {
            let delay = policy.backoff * 2u32.pow(attempt - 1);
            debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying fetch");
            tokio::time::sleep(delay).await;
        }
        let req = builder
            .try_clone()
            .ok_or_else(|| ProviderError::Http("request body not clonable".into()))?;
        match req.send().await {
            Ok(resp) if resp.status().is_server_error() => {
                last_err = ProviderError::Http(format!("HTTP {}", resp.status()));
            }
            Ok(resp) => return Ok(resp),
            Err(e) if e.is_timeout() || e.is_connect() => {
                last_err = ProviderError::Http(e.to_string());
            }
            Err(e) => return Err(ProviderError::Http(e.to_string())),
        }
    }

    Err(last_err)
}
