//! Rate-limited batch execution
//!
//! Runs one async operation per input under two caps at once: a ceiling on
//! operations in flight and a minimum spacing between operation starts.

pub mod retry;


pub use retry::{FetchOutcome, ResilientFetcher, RetryPolicy};

use crate::config::SchedulerConfig;
use futures_util::future::join_all;
use governor::clock::{Clock, Reference};
use governor::middleware::NoOpMiddleware;
use governor::nanos::Nanos;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::future::Future;
use std::num::NonZeroU32;
use std::ops::Add;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::time::Instant;
use tracing::debug;

/// governor clock reading tokio time, so paused-time tests drive the limiter
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TokioInstant(Instant);

impl Add<Nanos> for TokioInstant {
    type Output = Self;

    fn add(self, other: Nanos) -> Self {
        TokioInstant(self.0 + Duration::from(other))
    }
}

impl Reference for TokioInstant {
    fn duration_since(&self, earlier: Self) -> Nanos {
        self.0.saturating_duration_since(earlier.0).into()
    }

    fn saturating_sub(&self, duration: Nanos) -> Self {
        TokioInstant(self.0.checked_sub(duration.into()).unwrap_or(self.0))
    }
}

impl Clock for TokioClock {
    type Instant = TokioInstant;

    fn now(&self) -> Self::Instant {
        TokioInstant(Instant::now())
    }
}

type StartLimiter =
    RateLimiter<NotKeyed, InMemoryState, TokioClock, NoOpMiddleware<TokioInstant>>;

/// Executes batches with bounded concurrency and start rate
pub struct RateLimitedRunner {
    slots: Semaphore,
    max_concurrent: usize,
    min_spacing: Duration,
    /// One start per `min_spacing`, no burst
    starts: StartLimiter,
    clock: TokioClock,
}

impl RateLimitedRunner {
    /// `max_starts_per_sec` of 0 is treated as 1
    pub fn new(max_concurrent: usize, max_starts_per_sec: u32) -> Self {
        let max_concurrent = max_concurrent.max(1);
        let rate = NonZeroU32::new(max_starts_per_sec).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_second(rate).allow_burst(NonZeroU32::MIN);
        let clock = TokioClock;
        Self {
            slots: Semaphore::new(max_concurrent),
            max_concurrent,
            min_spacing: quota.replenish_interval(),
            starts: RateLimiter::direct_with_clock(quota, &clock),
            clock,
        }
    }

    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self::new(config.max_concurrency, config.max_starts_per_sec)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn min_spacing(&self) -> Duration {
        self.min_spacing
    }

    /// Run `op` once per item; slot `i` of the result belongs to `items[i]`
    pub async fn run<I, T, F, Fut>(&self, items: Vec<I>, op: F) -> Vec<T>
    where
        F: Fn(I) -> Fut,
        Fut: Future<Output = T>,
    {
        self.run_until(items, op, None)
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    /// Like [`run`](Self::run), but stops launching new items once `stop`
    /// reads `true`. Items already started finish; skipped items yield `None`.
    pub async fn run_until<I, T, F, Fut>(
        &self,
        items: Vec<I>,
        op: F,
        stop: Option<&watch::Receiver<bool>>,
    ) -> Vec<Option<T>>
    where
        F: Fn(I) -> Fut,
        Fut: Future<Output = T>,
    {
        let op = &op;
        let total = items.len();
        let tasks = items.into_iter().enumerate().map(|(index, item)| async move {
            // The semaphore is never closed
            let _permit = self.slots.acquire().await.ok()?;
            if stop.is_some_and(|s| *s.borrow()) {
                debug!("Batch stopped, skipping item {}/{}", index + 1, total);
                return None;
            }
            self.wait_for_start_slot().await;
            if stop.is_some_and(|s| *s.borrow()) {
                return None;
            }
            Some(op(item).await)
        });

        join_all(tasks).await
    }

    /// Wait until the limiter admits one more start. The slot is taken at
    /// the moment of the successful check, never booked ahead.
    async fn wait_for_start_slot(&self) {
        while let Err(not_until) = self.starts.check() {
            tokio::time::sleep(not_until.wait_time_from(self.clock.now())).await;
        }
    }
}
