//! Retry, backoff and pacing primitives used by [`crate::ApiClient`].

use crate::api::error::ApiError;
use log::warn;
use reqwest::StatusCode;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, sleep_until, Instant};

/// How many times a request is attempted and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Always at least 1.
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(15),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_base: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_base,
        }
    }

    /// Wait after the failed 1-based `attempt`. Grows linearly with the attempt number.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(attempt)
    }
}

/// What the client should do with a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    Throttled,
    ServerError,
    Rejected,
}

pub fn classify(status: StatusCode) -> StatusClass {
    if status.is_success() {
        StatusClass::Success
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        StatusClass::Throttled
    } else if status.is_server_error() {
        StatusClass::ServerError
    } else {
        // Remaining 4xx plus anything unexpected (1xx/3xx after redirects).
        StatusClass::Rejected
    }
}

/// Failure of a single attempt, telling the retry loop whether to go again.
#[derive(Debug)]
pub enum AttemptError {
    /// Worth retrying: throttling, 5xx, network trouble.
    Retryable(ApiError),
    /// Not worth retrying: returned to the caller as is.
    Fatal(ApiError),
}

/// Runs `op` until it succeeds, fails fatally, or `policy.max_attempts` is reached.
///
/// `op` receives the 1-based attempt number. Between attempts the loop sleeps
/// for [`RetryPolicy::delay_for`]; there is no sleep after the last attempt.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, url: &str, mut op: F) -> Result<T, ApiError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AttemptError>>,
{
    let mut last_error = String::new();
    for attempt in 1..=policy.max_attempts {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(AttemptError::Fatal(e)) => return Err(e),
            Err(AttemptError::Retryable(e)) => {
                last_error = e.to_string();
                if attempt < policy.max_attempts {
                    let wait = policy.delay_for(attempt);
                    warn!(
                        "{} (attempt {}/{}), retrying in {:?}",
                        last_error, attempt, policy.max_attempts, wait
                    );
                    sleep(wait).await;
                }
            }
        }
    }
    Err(ApiError::RetriesExhausted {
        url: url.to_string(),
        attempts: policy.max_attempts,
        last_error,
    })
}

/// Enforces a minimum delay between consecutive outbound calls.
#[derive(Debug)]
pub struct Pacer {
    min_delay: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl Pacer {
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            last_call: Mutex::new(None),
        }
    }

    /// Sleeps until `min_delay` has passed since the previous call, then
    /// records the current instant as the latest call.
    pub async fn wait_turn(&self) {
        let mut last_call = self.last_call.lock().await;
        if let Some(last) = *last_call {
            sleep_until(last + self.min_delay).await;
        }
        *last_call = Some(Instant::now());
    }
}
