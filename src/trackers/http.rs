//! Rate limited HTTP client with retries, shared by the tracker lookups.

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use rand::Rng;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, trace, warn};

use crate::core::error::TrackerError;

const USER_AGENT: &str = concat!("tqm/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Backoff settings for failed tracker requests
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Delay before retrying after the given 0-indexed attempt
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let multiplier = 2f64.powi(attempt as i32);
        let capped = (self.base_delay.as_secs_f64() * multiplier).min(self.max_delay.as_secs_f64());

        let secs = if self.jitter {
            // keep the average delay while spreading retries out
            let factor = rand::rng().random_range(0.5..1.5);
            (capped * factor).min(self.max_delay.as_secs_f64())
        } else {
            capped
        };

        Duration::from_secs_f64(secs)
    }
}

/// HTTP client for one tracker API
pub struct TrackerHttp {
    tracker: &'static str,
    client: reqwest::Client,
    limiter: DefaultDirectRateLimiter,
    retry: RetryConfig,
}

impl TrackerHttp {
    /// Client allowing one request per second
    pub fn new(tracker: &'static str) -> Result<Self, TrackerError> {
        Self::with_settings(tracker, NonZeroU32::MIN, RetryConfig::default())
    }

    pub fn with_settings(
        tracker: &'static str,
        per_second: NonZeroU32,
        retry: RetryConfig,
    ) -> Result<Self, TrackerError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|source| TrackerError::Build { tracker, source })?;

        Ok(Self {
            tracker,
            client,
            limiter: RateLimiter::direct(Quota::per_second(per_second)),
            retry,
        })
    }

    /// Send a request built by `build`, retrying transient failures
    pub async fn send<F>(&self, build: F) -> Result<reqwest::Response, TrackerError>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        let tracker = self.tracker;
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            self.limiter.until_ready().await;

            let err = match build(&self.client).send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => TrackerError::Status {
                    tracker,
                    status: response.status(),
                },
                Err(source) => TrackerError::Request { tracker, source },
            };

            attempt += 1;
            if !err.is_retryable() {
                debug!(tracker, error = %err, "Tracker request failed, not retryable");
                return Err(err);
            }
            if attempt >= max_attempts {
                warn!(tracker, attempts = attempt, error = %err, "Tracker request retries exhausted");
                return Err(err);
            }

            let delay = self.retry.calculate_delay(attempt - 1);
            trace!(
                tracker,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Retrying tracker request"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
