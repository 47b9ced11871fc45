//! Retry wrapper with exponential backoff.
//!
//! [`execute`] never raises: the outcome, the number of attempts and the time
//! spent are returned together in a [`RetryResult`].

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;

use crate::error::{Error, Result};

/// Decides whether a failed attempt may be retried: `(error, attempt)`
pub type RetryCondition = Arc<dyn Fn(&Error, u32) -> bool + Send + Sync>;

/// Called before each sleep: `(error, attempt, delay)`
pub type RetryCallback = Arc<dyn Fn(&Error, u32, Duration) + Send + Sync>;

/// Backoff policy
#[derive(Clone)]
pub struct RetryOptions {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Scale each delay by a random factor in `[0.5, 1.0]`
    pub jitter: bool,
    /// Defaults to [`Error::is_retryable`] when unset
    pub retry_condition: Option<RetryCondition>,
    pub on_retry: Option<RetryCallback>,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self::network()
    }
}

impl fmt::Debug for RetryOptions {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RetryOptions")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .field("jitter", &self.jitter)
            .field("retry_condition", &self.retry_condition.is_some())
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}

impl RetryOptions {
    /// Remote calls: 3 attempts, 1 s base, 10 s cap, jitter
    #[must_use]
    pub const fn network() -> Self {
        Self::preset(3, 1_000, 10_000, true)
    }

    /// Local storage: 2 attempts, 500 ms base, 5 s cap
    #[must_use]
    pub const fn database() -> Self {
        Self::preset(2, 500, 5_000, false)
    }

    /// Operations that must not be lost: 5 attempts, 2 s base, 30 s cap, jitter
    #[must_use]
    pub const fn critical() -> Self {
        Self::preset(5, 2_000, 30_000, true)
    }

    const fn preset(max_attempts: u32, base_ms: u64, max_ms: u64, jitter: bool) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_millis(max_ms),
            backoff_multiplier: 2.0,
            jitter,
            retry_condition: None,
            on_retry: None,
        }
    }

    #[must_use]
    pub fn with_retry_condition(
        mut self,
        condition: impl Fn(&Error, u32) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.retry_condition = Some(Arc::new(condition));
        self
    }

    #[must_use]
    pub fn with_on_retry(
        mut self,
        callback: impl Fn(&Error, u32, Duration) + Send + Sync + 'static,
    ) -> Self {
        self.on_retry = Some(Arc::new(callback));
        self
    }

    /// Delay after failed attempt number `attempt` (1-based), before jitter:
    /// `min(base_delay * multiplier^(attempt - 1), max_delay)`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let seconds = self.base_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        Duration::try_from_secs_f64(seconds)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    fn jittered_delay(&self, attempt: u32) -> Duration {
        let delay = self.delay_for(attempt);
        if self.jitter {
            delay.mul_f64(rand::thread_rng().gen_range(0.5..=1.0))
        } else {
            delay
        }
    }

    fn should_retry(&self, error: &Error, attempt: u32) -> bool {
        self.retry_condition
            .as_ref()
            .map_or_else(|| error.is_retryable(), |condition| condition(error, attempt))
    }
}

/// Outcome of [`execute`]
#[derive(Debug)]
pub struct RetryResult<T> {
    pub outcome: Result<T>,
    /// Attempts made, including the successful one
    pub attempts: u32,
    pub total_time: Duration,
}

impl<T> RetryResult<T> {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn data(&self) -> Option<&T> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&Error> {
        self.outcome.as_ref().err()
    }

    pub fn into_result(self) -> Result<T> {
        self.outcome
    }
}

/// Run `operation` until it succeeds, the error is not retryable, or
/// `max_attempts` is reached.
pub async fn execute<T, F, Fut>(mut operation: F, options: &RetryOptions) -> RetryResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let started = Instant::now();
    let max_attempts = options.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let error = match operation().await {
            Ok(data) => {
                return RetryResult {
                    outcome: Ok(data),
                    attempts: attempt,
                    total_time: started.elapsed(),
                };
            }
            Err(error) => error,
        };

        if attempt >= max_attempts || !options.should_retry(&error, attempt) {
            tracing::debug!(attempt, %error, "Giving up");
            return RetryResult {
                outcome: Err(error),
                attempts: attempt,
                total_time: started.elapsed(),
            };
        }

        let delay = options.jittered_delay(attempt);
        if let Some(callback) = &options.on_retry {
            callback(&error, attempt, delay);
        }
        tracing::debug!(attempt, ?delay, %error, "Retrying after failure");
        tokio::time::sleep(delay).await;
    }
}
