//! Retry with exponential backoff.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::cancellation::CancellationToken;
use crate::error::{AppResult, ApplicationError};

/// Backoff schedule for retried operations.
///
/// The delay after the `n`-th failed attempt is
/// `min(max_delay, base_delay * backoff_multiplier^(n-1))`. With `jitter`
/// enabled that delay is scaled by a uniform factor in `[0.5, 1.5]` and
/// clamped to `max_delay` again, so it always stays within `[0, max_delay]`.
///
/// # Examples
///
/// ```
/// use ferrous_bulwark::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new(4, Duration::from_secs(1))
///     .with_max_delay(Duration::from_secs(3))
///     .without_jitter();
///
/// assert_eq!(
///     policy.nominal_schedule(),
///     vec![Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(3)],
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            ..Self::default()
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn without_jitter(self) -> Self {
        self.with_jitter(false)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.max_attempts == 0 {
            return Err(ApplicationError::configuration(
                "max_attempts",
                "max_attempts must be at least 1",
            ));
        }
        if !(self.backoff_multiplier >= 1.0 && self.backoff_multiplier.is_finite()) {
            return Err(ApplicationError::configuration(
                "backoff_multiplier",
                format!("backoff_multiplier must be a finite number >= 1.0, got {}", self.backoff_multiplier),
            ));
        }
        if self.base_delay > self.max_delay {
            return Err(ApplicationError::configuration(
                "base_delay",
                "base_delay must not exceed max_delay",
            ));
        }
        Ok(())
    }

    /// Delay after the `attempt`-th failure, before jitter.
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        let max = self.max_delay.as_secs_f64();
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        if secs.is_finite() && secs < max {
            Duration::from_secs_f64(secs.max(0.0))
        } else {
            self.max_delay
        }
    }

    /// Delay after the `attempt`-th failure, jittered when enabled.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let nominal = self.nominal_delay(attempt);
        if !self.jitter || nominal.is_zero() {
            return nominal;
        }
        let factor: f64 = rand::thread_rng().gen_range(0.5..=1.5);
        nominal.mul_f64(factor).min(self.max_delay)
    }

    /// The un-jittered delays between consecutive attempts.
    pub fn nominal_schedule(&self) -> Vec<Duration> {
        (1..self.max_attempts.max(1)).map(|n| self.nominal_delay(n)).collect()
    }
}

type RetryPredicate = Arc<dyn Fn(&ApplicationError) -> bool + Send + Sync>;

/// Runs operations under a [`RetryPolicy`].
///
/// Sleeps only between attempts. When every attempt fails the last error is
/// returned as it was produced. Cancellation errors are never retried.
///
/// # Examples
///
/// ```
/// use ferrous_bulwark::{ApplicationError, RetryPolicy, RetryWithBackoff};
/// use std::time::Duration;
///
/// let retry = RetryWithBackoff::new("load", RetryPolicy::new(3, Duration::from_millis(1)));
/// let mut calls = 0;
/// let value = retry.execute(|| {
///     calls += 1;
///     if calls < 3 { Err(ApplicationError::network("flaky")) } else { Ok(calls) }
/// });
/// assert_eq!(value.unwrap(), 3);
/// ```
#[derive(Clone)]
pub struct RetryWithBackoff {
    name: String,
    policy: RetryPolicy,
    retry_if: Option<RetryPredicate>,
}

impl RetryWithBackoff {
    pub fn new(name: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            name: name.into(),
            policy,
            retry_if: None,
        }
    }

    /// Only errors for which `predicate` returns `true` are retried.
    pub fn with_retry_if<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&ApplicationError) -> bool + Send + Sync + 'static,
    {
        self.retry_if = Some(Arc::new(predicate));
        self
    }

    /// Retries only errors that [`ApplicationError::is_transient`] accepts.
    pub fn transient_only(self) -> Self {
        self.with_retry_if(ApplicationError::is_transient)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn execute<T, F>(&self, operation: F) -> AppResult<T>
    where
        F: FnMut() -> AppResult<T>,
    {
        self.run(None, operation)
    }

    /// Like [`execute`](Self::execute) but aborts before the next attempt,
    /// or during the backoff sleep, once `token` is cancelled.
    pub fn execute_with_cancellation<T, F>(&self, token: &CancellationToken, operation: F) -> AppResult<T>
    where
        F: FnMut() -> AppResult<T>,
    {
        self.run(Some(token), operation)
    }

    /// Async variant sleeping on the tokio timer.
    #[cfg(feature = "async")]
    pub async fn execute_async<T, F, Fut>(&self, mut operation: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = AppResult<T>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if attempt >= max_attempts || !self.should_retry(&err) {
                        self.log_giving_up(attempt, &err);
                        return Err(err);
                    }
                    let delay = self.policy.delay_for_attempt(attempt);
                    self.log_retry(attempt, delay, &err);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    fn run<T, F>(&self, token: Option<&CancellationToken>, mut operation: F) -> AppResult<T>
    where
        F: FnMut() -> AppResult<T>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            if token.is_some_and(CancellationToken::is_cancelled) {
                return Err(ApplicationError::cancelled(self.name.clone()).with_context("attempt", attempt));
            }

            match operation() {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(operation = %self.name, attempt, "operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => {
                    if attempt >= max_attempts || !self.should_retry(&err) {
                        self.log_giving_up(attempt, &err);
                        return Err(err);
                    }
                    let delay = self.policy.delay_for_attempt(attempt);
                    self.log_retry(attempt, delay, &err);
                    match token {
                        Some(token) => {
                            if token.sleep(delay).is_err() {
                                return Err(ApplicationError::cancelled(self.name.clone())
                                    .with_context("attempt", attempt)
                                    .with_source(err));
                            }
                        }
                        None => std::thread::sleep(delay),
                    }
                    attempt += 1;
                }
            }
        }
    }

    fn should_retry(&self, err: &ApplicationError) -> bool {
        if err.is_cancelled() {
            return false;
        }
        self.retry_if.as_ref().map_or(true, |predicate| predicate(err))
    }

    fn log_retry(&self, attempt: u32, delay: Duration, err: &ApplicationError) {
        tracing::warn!(
            operation = %self.name,
            attempt,
            max_attempts = self.policy.max_attempts,
            delay_ms = delay.as_millis() as u64,
            error_code = err.error_code(),
            "attempt failed, retrying: {}",
            err
        );
    }

    fn log_giving_up(&self, attempt: u32, err: &ApplicationError) {
        if attempt > 1 {
            tracing::error!(
                operation = %self.name,
                attempts = attempt,
                error_code = err.error_code(),
                "giving up after {} attempts: {}",
                attempt,
                err
            );
        }
    }
}

impl std::fmt::Debug for RetryWithBackoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryWithBackoff")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .field("has_retry_if", &self.retry_if.is_some())
            .finish()
    }
}
