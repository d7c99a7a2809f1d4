//! Retry policy around a single network read
//!
//! Every outcome collapses to `Some(data)` or `None`:
//! - throttled responses are retried after a randomized backoff
//! - rejected requests (unknown symbol, bad parameter) return `None` at once
//! - any other failure is logged and returns `None` at once

use crate::config::SchedulerConfig;
use crate::error::{ErrorClass, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_min: Duration::from_millis(300),
            backoff_max: Duration::from_millis(700),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            max_attempts: config.fetch_attempts.max(1),
            backoff_min: Duration::from_millis(config.backoff_min_ms),
            backoff_max: Duration::from_millis(config.backoff_max_ms),
        }
    }

    /// Random delay in `[backoff_min, backoff_max)`
    fn backoff(&self) -> Duration {
        let min = self.backoff_min.as_millis() as u64;
        let max = self.backoff_max.as_millis() as u64;
        if max <= min {
            return self.backoff_min;
        }
        Duration::from_millis(rand::rng().random_range(min..max))
    }
}

/// Result of one logical fetch plus how it got there
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome<T> {
    pub value: Option<T>,
    pub attempts: u32,
    pub backoffs: u32,
}

/// Wraps fallible reads with [`RetryPolicy`]
#[derive(Debug, Clone, Default)]
pub struct ResilientFetcher {
    policy: RetryPolicy,
}

impl ResilientFetcher {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op` until it succeeds, is rejected, fails, or attempts run out
    pub async fn fetch<T, F, Fut>(&self, label: &str, op: F) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.fetch_traced(label, op).await.value
    }

    pub async fn fetch_traced<T, F, Fut>(&self, label: &str, mut op: F) -> FetchOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempts = 0;
        let mut backoffs = 0;

        while attempts < self.policy.max_attempts {
            attempts += 1;
            match op().await {
                Ok(value) => {
                    return FetchOutcome {
                        value: Some(value),
                        attempts,
                        backoffs,
                    };
                }
                Err(e) => match e.class() {
                    ErrorClass::Throttled => {
                        if attempts >= self.policy.max_attempts {
                            warn!("{}: still throttled after {} attempts", label, attempts);
                            break;
                        }
                        let delay = self.policy.backoff();
                        debug!(
                            "{}: throttled (attempt {}/{}), backing off {}ms",
                            label,
                            attempts,
                            self.policy.max_attempts,
                            delay.as_millis()
                        );
                        backoffs += 1;
                        tokio::time::sleep(delay).await;
                    }
                    ErrorClass::Rejected => {
                        debug!("{}: rejected, skipping: {}", label, e);
                        break;
                    }
                    ErrorClass::Transient => {
                        warn!("{}: fetch failed, skipping this cycle: {}", label, e);
                        break;
                    }
                },
            }
        }

        FetchOutcome {
            value: None,
            attempts,
            backoffs,
        }
    }
}
