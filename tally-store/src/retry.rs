use crate::backend::BackendError;
use crate::error::StoreError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_MAX_ATTEMPTS: u32 = 8;
const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(1);
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_millis(50);

/// Wait between two attempts. It runs on the caller's thread, while the
/// session being claimed is held.
pub type Pause = Arc<dyn Fn(Duration) + Send + Sync>;

/// Bounded retry of transient backend failures.
///
/// The delay before attempt `n + 1` doubles from `initial_backoff` up to
/// `max_backoff`, and is drawn uniformly in the upper half of that value.
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// total number of attempts, the first one included
    pub max_attempts: u32,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "initial_backoff_ms")]
    pub initial_backoff: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "max_backoff_ms")]
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// retry immediately, useful when the backend is in-process
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// delay to wait after the given failed attempt (counting from 1)
    pub fn backoff(&self, attempt: u32) -> Duration {
        if self.initial_backoff.is_zero() || self.max_backoff.is_zero() {
            return Duration::ZERO;
        }
        let shift = attempt.saturating_sub(1).min(16);
        let ceiling = self
            .initial_backoff
            .saturating_mul(1 << shift)
            .min(self.max_backoff);
        let half = ceiling / 2;
        let jitter = rand::thread_rng().gen_range(0..=half.as_nanos() as u64);
        half + Duration::from_nanos(jitter)
    }

    /// run `operation` until it succeeds or the attempts are exhausted
    ///
    /// Every [`BackendError`] is considered transient: a conflict is retried
    /// as a whole by calling `operation` again.
    pub fn run<T, F>(&self, operation: &'static str, attempt_once: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Result<T, BackendError>,
    {
        self.run_with(operation, attempt_once, &std::thread::sleep)
    }

    /// same as [`RetryPolicy::run`], waiting between attempts with `pause`
    /// instead of blocking the thread
    pub fn run_with<T, F>(
        &self,
        operation: &'static str,
        mut attempt_once: F,
        pause: &dyn Fn(Duration),
    ) -> Result<T, StoreError>
    where
        F: FnMut() -> Result<T, BackendError>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match attempt_once() {
                Ok(value) => return Ok(value),
                Err(last) if attempt >= max_attempts => {
                    tracing::error!(operation, attempts = attempt, error = %last, "retry budget exhausted");
                    return Err(StoreError::Unavailable {
                        attempts: attempt,
                        last,
                    });
                }
                Err(err) => {
                    if err.is_conflict() {
                        tracing::debug!(operation, attempt, error = %err, "transient write conflict, retrying");
                    } else {
                        tracing::warn!(operation, attempt, error = %err, "backing store unavailable, retrying");
                    }
                    let delay = self.backoff(attempt);
                    if !delay.is_zero() {
                        pause(delay);
                    }
                    attempt += 1;
                }
            }
        }
    }
}
