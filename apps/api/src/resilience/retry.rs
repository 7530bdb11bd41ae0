//! Bounded retry with exponential backoff.
//!
//! Callers classify each attempt as a [`Step`]; only `Step::Transient` is retried.
//! Every attempt is recorded so the caller can surface the full history on failure.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::CancelSignal;

/// Exponent cap so `base_delay << n` cannot overflow before `max_delay` clamps it.
const MAX_BACKOFF_EXPONENT: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Values below 1 are treated as 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound of the uniformly random delay added to every backoff.
    pub max_jitter: Duration,
}

impl RetryPolicy {
    /// Delay after the `failed_attempts`-th consecutive failure (1-based), before jitter:
    /// base, 2×base, 4×base, … capped at `max_delay`.
    pub fn base_backoff(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    pub fn backoff(&self, failed_attempts: u32) -> Duration {
        self.base_backoff(failed_attempts) + self.jitter()
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }

    fn attempt_budget(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Classified result of a single attempt.
#[derive(Debug)]
pub enum Step<T, E> {
    Success(T),
    /// A retry may succeed.
    Transient(E),
    /// Retrying the same call with the same input cannot succeed.
    Fatal(E),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptOutcome {
    Success,
    TransientFailure,
    FatalFailure,
}

/// One entry in the append-only attempt log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub latency: Duration,
    pub outcome: AttemptOutcome,
}

#[derive(Debug)]
pub enum RetryError<E> {
    /// Every attempt in the budget failed transiently; `last` is the final error.
    Exhausted { last: E },
    Fatal { error: E },
    Cancelled,
}

#[derive(Debug)]
pub struct RetryRun<T, E> {
    pub result: Result<T, RetryError<E>>,
    pub attempts: Vec<AttemptRecord>,
}

impl<T, E> RetryRun<T, E> {
    fn finish(result: Result<T, RetryError<E>>, attempts: Vec<AttemptRecord>) -> Self {
        Self { result, attempts }
    }
}

/// Runs `op` until it succeeds, fails fatally, exhausts `policy`, or `cancel` fires.
///
/// Cancellation is checked before each attempt and raced against both the attempt
/// itself and the backoff sleep.
pub async fn retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancelSignal,
    label: &str,
    mut op: F,
) -> RetryRun<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Step<T, E>>,
    E: Display,
{
    let budget = policy.attempt_budget();
    let mut attempts = Vec::new();
    let mut attempt = 0;

    loop {
        if cancel.is_cancelled() {
            return RetryRun::finish(Err(RetryError::Cancelled), attempts);
        }
        attempt += 1;

        let started_at = Utc::now();
        let clock = Instant::now();
        let step = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return RetryRun::finish(Err(RetryError::Cancelled), attempts);
            }
            step = op() => step,
        };
        let mut record = AttemptRecord {
            attempt,
            started_at,
            latency: clock.elapsed(),
            outcome: AttemptOutcome::Success,
        };

        match step {
            Step::Success(value) => {
                debug!("{label}: attempt {attempt}/{budget} succeeded");
                attempts.push(record);
                return RetryRun::finish(Ok(value), attempts);
            }
            Step::Fatal(error) => {
                warn!("{label}: attempt {attempt}/{budget} failed fatally: {error}");
                record.outcome = AttemptOutcome::FatalFailure;
                attempts.push(record);
                return RetryRun::finish(Err(RetryError::Fatal { error }), attempts);
            }
            Step::Transient(error) => {
                record.outcome = AttemptOutcome::TransientFailure;
                attempts.push(record);

                if attempt >= budget {
                    warn!("{label}: attempt {attempt}/{budget} failed, giving up: {error}");
                    return RetryRun::finish(Err(RetryError::Exhausted { last: error }), attempts);
                }

                let delay = policy.backoff(attempt);
                warn!(
                    "{label}: attempt {attempt}/{budget} failed: {error}; retrying after {}ms",
                    delay.as_millis()
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        return RetryRun::finish(Err(RetryError::Cancelled), attempts);
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}
