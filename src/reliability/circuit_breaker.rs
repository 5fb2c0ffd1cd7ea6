//! Circuit breaker for failing dependencies.
//!
//! The breaker has three states:
//! - **Closed**: calls pass through; consecutive failures are counted
//! - **Open**: calls are rejected without running until `recovery_timeout`
//!   has elapsed since the last failure
//! - **Half-open**: one trial call is let through; its outcome closes or
//!   re-opens the breaker
//!
//! All state lives behind one mutex, so transitions are linearizable per
//! breaker. The mutex is never held while the protected operation runs.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{AppResult, ApplicationError};

// State change history kept for diagnostics.
const MAX_TRANSITIONS: usize = 64;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Circuit breaker settings.
///
/// Durations accept humantime strings when deserialized:
///
/// ```
/// use ferrous_bulwark::CircuitBreakerConfig;
/// use std::time::Duration;
///
/// let config: CircuitBreakerConfig =
///     serde_json::from_str(r#"{ "failure_threshold": 3, "recovery_timeout": "1s" }"#).unwrap();
/// assert_eq!(config.failure_threshold, 3);
/// assert_eq!(config.recovery_timeout, Duration::from_secs(1));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the breaker
    pub failure_threshold: u32,
    /// Time the breaker stays open before allowing a trial call
    #[serde(with = "humantime_serde")]
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            recovery_timeout,
        }
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = timeout;
        self
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.failure_threshold == 0 {
            return Err(ApplicationError::configuration(
                "failure_threshold",
                "failure_threshold must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// One recorded state change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateTransition {
    pub from: CircuitState,
    pub to: CircuitState,
    pub at: DateTime<Utc>,
}

/// Snapshot of a breaker's counters.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    /// Calls turned away while open or while a trial was in flight
    pub rejected_calls: u64,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub transitions: Vec<StateTransition>,
}

impl CircuitBreakerStats {
    /// Failed share of the calls that actually ran, 0.0 when none ran.
    pub fn failure_rate(&self) -> f64 {
        let ran = self.successful_calls + self.failed_calls;
        if ran == 0 {
            0.0
        } else {
            self.failed_calls as f64 / ran as f64
        }
    }

    /// Complement of [`failure_rate`](Self::failure_rate), 1.0 when none ran.
    pub fn success_rate(&self) -> f64 {
        1.0 - self.failure_rate()
    }
}

type FailureFilter = Arc<dyn Fn(&ApplicationError) -> bool + Send + Sync>;

struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    last_failure_at: Option<DateTime<Utc>>,
    last_success_at: Option<DateTime<Utc>>,
    trial_in_flight: bool,
    total_calls: u64,
    successful_calls: u64,
    failed_calls: u64,
    rejected_calls: u64,
    transitions: VecDeque<StateTransition>,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure: None,
            last_failure_at: None,
            last_success_at: None,
            trial_in_flight: false,
            total_calls: 0,
            successful_calls: 0,
            failed_calls: 0,
            rejected_calls: 0,
            transitions: VecDeque::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Permit {
    Normal,
    Trial,
}

/// Protects one logical dependency.
///
/// # Examples
///
/// ```
/// use ferrous_bulwark::{ApplicationError, CircuitBreaker, CircuitBreakerConfig, CircuitState};
/// use std::time::Duration;
///
/// let breaker = CircuitBreaker::new(
///     "forecast-api",
///     CircuitBreakerConfig::new(2, Duration::from_secs(30)),
/// );
///
/// for _ in 0..2 {
///     let _ = breaker.call(|| Err::<(), _>(ApplicationError::network("connection reset")));
/// }
/// assert_eq!(breaker.state(), CircuitState::Open);
///
/// // Rejected without running the operation.
/// let err = breaker.call(|| Ok::<_, ApplicationError>(1)).unwrap_err();
/// assert!(err.is_circuit_open());
/// ```
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    failure_filter: Option<FailureFilter>,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            failure_filter: None,
            inner: Mutex::new(BreakerState::new()),
        }
    }

    /// Restricts which errors count as failures.
    ///
    /// Errors for which `filter` returns `false` are passed through to the
    /// caller without affecting the breaker. By default every error counts.
    pub fn with_failure_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&ApplicationError) -> bool + Send + Sync + 'static,
    {
        self.failure_filter = Some(Arc::new(filter));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Runs `operation` through the breaker.
    ///
    /// When the breaker is open the operation is not run and the call fails
    /// with a `ServiceUnavailableError` (see
    /// [`ApplicationError::is_circuit_open`]); otherwise the operation's own
    /// result is returned unchanged.
    pub fn call<T, F>(&self, operation: F) -> AppResult<T>
    where
        F: FnOnce() -> AppResult<T>,
    {
        let permit = self.acquire()?;
        let mut outcome = PermitGuard {
            breaker: self,
            permit,
            settled: false,
        };

        let result = operation();
        match &result {
            Ok(_) => outcome.settle(true),
            Err(err) if self.counts_as_failure(err) => outcome.settle(false),
            Err(_) => outcome.settle_neutral(),
        }
        result
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    pub fn last_failure_time(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().last_failure_at
    }

    pub fn last_success_time(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().last_success_at
    }

    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        let inner = self.inner.lock();
        CircuitBreakerStats {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            total_calls: inner.total_calls,
            successful_calls: inner.successful_calls,
            failed_calls: inner.failed_calls,
            rejected_calls: inner.rejected_calls,
            last_failure_at: inner.last_failure_at,
            last_success_at: inner.last_success_at,
            transitions: inner.transitions.iter().cloned().collect(),
        }
    }

    /// Forces the breaker closed and clears its failure count.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        self.transition(&mut inner, CircuitState::Closed);
        inner.failure_count = 0;
        inner.last_failure = None;
        inner.trial_in_flight = false;
    }

    fn counts_as_failure(&self, err: &ApplicationError) -> bool {
        self.failure_filter.as_ref().map_or(true, |filter| filter(err))
    }

    fn acquire(&self) -> AppResult<Permit> {
        let mut inner = self.inner.lock();
        inner.total_calls += 1;

        let state = inner.state;
        match state {
            CircuitState::Closed => Ok(Permit::Normal),
            CircuitState::Open => {
                let elapsed = inner.last_failure.map_or(Duration::MAX, |at| at.elapsed());
                if elapsed < self.config.recovery_timeout {
                    inner.rejected_calls += 1;
                    let retry_after = self.config.recovery_timeout - elapsed;
                    return Err(self.rejection(Some(retry_after)));
                }
                self.transition(&mut inner, CircuitState::HalfOpen);
                inner.trial_in_flight = true;
                Ok(Permit::Trial)
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    inner.rejected_calls += 1;
                    return Err(self.rejection(None));
                }
                inner.trial_in_flight = true;
                Ok(Permit::Trial)
            }
        }
    }

    fn record(&self, permit: Permit, success: bool) {
        let mut inner = self.inner.lock();
        if success {
            inner.successful_calls += 1;
            inner.last_success_at = Some(Utc::now());
        } else {
            inner.failed_calls += 1;
        }

        match (permit, success) {
            (Permit::Trial, true) => {
                inner.trial_in_flight = false;
                inner.failure_count = 0;
                self.transition(&mut inner, CircuitState::Closed);
            }
            (Permit::Trial, false) => {
                inner.trial_in_flight = false;
                self.mark_failure(&mut inner);
                self.transition(&mut inner, CircuitState::Open);
            }
            (Permit::Normal, true) => {
                if inner.state == CircuitState::Closed {
                    inner.failure_count = 0;
                }
            }
            (Permit::Normal, false) => {
                if inner.state != CircuitState::Closed {
                    return;
                }
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    self.mark_failure(&mut inner);
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
        }
    }

    /// Releases a trial permit whose outcome does not count either way.
    fn release(&self, permit: Permit) {
        if permit == Permit::Trial {
            self.inner.lock().trial_in_flight = false;
        }
    }

    fn mark_failure(&self, inner: &mut BreakerState) {
        inner.last_failure = Some(Instant::now());
        inner.last_failure_at = Some(Utc::now());
    }

    fn transition(&self, inner: &mut BreakerState, to: CircuitState) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        if inner.transitions.len() == MAX_TRANSITIONS {
            inner.transitions.pop_front();
        }
        inner.transitions.push_back(StateTransition {
            from,
            to,
            at: Utc::now(),
        });

        match to {
            CircuitState::Open => tracing::warn!(
                circuit_breaker = %self.name,
                from = %from,
                to = %to,
                failure_count = inner.failure_count,
                "circuit breaker opened"
            ),
            _ => tracing::info!(
                circuit_breaker = %self.name,
                from = %from,
                to = %to,
                "circuit breaker state changed"
            ),
        }
    }

    fn rejection(&self, retry_after: Option<Duration>) -> ApplicationError {
        let mut err = ApplicationError::service_unavailable(self.name.clone(), retry_after)
            .with_context("circuit_breaker", self.name.clone());
        if let Some(wait) = retry_after {
            err = err.with_context("retry_after_seconds", wait.as_secs_f64());
        }
        err
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("config", &self.config)
            .finish()
    }
}

/// Settles a permit exactly once, treating an unwinding operation as a failure.
struct PermitGuard<'b> {
    breaker: &'b CircuitBreaker,
    permit: Permit,
    settled: bool,
}

impl PermitGuard<'_> {
    fn settle(&mut self, success: bool) {
        self.settled = true;
        self.breaker.record(self.permit, success);
    }

    fn settle_neutral(&mut self) {
        self.settled = true;
        self.breaker.release(self.permit);
    }
}

impl Drop for PermitGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.record(self.permit, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fail() -> AppResult<()> {
        Err(ApplicationError::network("down"))
    }

    #[test]
    fn success_in_closed_resets_count() {
        let breaker = CircuitBreaker::new("svc", CircuitBreakerConfig::new(3, Duration::from_secs(1)));
        let _ = breaker.call(fail);
        let _ = breaker.call(fail);
        assert_eq!(breaker.failure_count(), 2);
        breaker.call(|| Ok(())).unwrap();
        assert_eq!(breaker.failure_count(), 0);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn filtered_errors_do_not_trip() {
        let breaker = CircuitBreaker::new("svc", CircuitBreakerConfig::new(1, Duration::from_secs(1)))
            .with_failure_filter(|e| e.is_transient());
        let _ = breaker.call(|| Err::<(), _>(ApplicationError::validation("q", "empty")));
        assert_eq!(breaker.state(), CircuitState::Closed);
        let _ = breaker.call(fail);
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn panicking_trial_reopens() {
        let breaker = CircuitBreaker::new("svc", CircuitBreakerConfig::new(1, Duration::ZERO));
        let _ = breaker.call(fail);
        assert_eq!(breaker.state(), CircuitState::Open);

        let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            breaker.call::<(), _>(|| panic!("trial blew up"))
        }));
        assert!(caught.is_err());
        assert_eq!(breaker.state(), CircuitState::Open);

        // The trial slot was released, so the next call may try again.
        breaker.call(|| Ok(())).unwrap();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn transitions_are_recorded() {
        let breaker = CircuitBreaker::new("svc", CircuitBreakerConfig::new(1, Duration::ZERO));
        let _ = breaker.call(fail);
        breaker.call(|| Ok(())).unwrap();
        let stats = breaker.stats();
        let states: Vec<_> = stats.transitions.iter().map(|t| t.to).collect();
        assert_eq!(states, vec![CircuitState::Open, CircuitState::HalfOpen, CircuitState::Closed]);
        assert_eq!(stats.failed_calls, 1);
        assert_eq!(stats.successful_calls, 1);
    }
}
