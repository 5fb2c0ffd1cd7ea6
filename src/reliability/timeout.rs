//! Deadline enforcement for blocking operations.

use std::collections::{BTreeMap, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::cancellation::CancellationToken;
use crate::error::{AppResult, ApplicationError};

/// Serializable form of a [`TimeoutManager`].
///
/// ```
/// use ferrous_bulwark::TimeoutConfig;
/// use std::time::Duration;
///
/// let config: TimeoutConfig = serde_json::from_str(
///     r#"{"default_timeout": "10s", "operations": {"fetch_weather": "2s"}}"#,
/// ).unwrap();
/// let manager = config.build();
/// assert_eq!(manager.timeout_for("fetch_weather"), Duration::from_secs(2));
/// assert_eq!(manager.timeout_for("other"), Duration::from_secs(10));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    #[serde(with = "humantime_serde")]
    pub default_timeout: Duration,
    pub operations: BTreeMap<String, humantime_serde::Serde<Duration>>,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(30),
            operations: BTreeMap::new(),
        }
    }
}

impl TimeoutConfig {
    pub fn validate(&self) -> AppResult<()> {
        if self.default_timeout.is_zero() {
            return Err(ApplicationError::configuration(
                "default_timeout",
                "default_timeout must be greater than zero",
            ));
        }
        Ok(())
    }

    pub fn build(&self) -> TimeoutManager {
        self.operations
            .iter()
            .fold(TimeoutManager::new(self.default_timeout), |manager, (name, timeout)| {
                manager.with_operation_timeout(name.clone(), timeout.into_inner())
            })
    }
}

/// Bounds operations by a deadline.
///
/// Blocking operations run on a worker thread while the caller waits at
/// most the timeout. A worker that misses its deadline cannot be killed: it
/// is abandoned and its result discarded. Use
/// [`execute_cancellable`](Self::execute_cancellable) when the operation can
/// poll a [`CancellationToken`] and stop early.
///
/// The per-operation table is fixed at construction, so a manager can be
/// shared freely.
///
/// # Examples
///
/// ```
/// use ferrous_bulwark::TimeoutManager;
/// use std::time::Duration;
///
/// let manager = TimeoutManager::new(Duration::from_millis(50));
///
/// let fast = manager.execute("fast", || Ok(42));
/// assert_eq!(fast.unwrap(), 42);
///
/// let slow = manager.execute("slow", || {
///     std::thread::sleep(Duration::from_millis(500));
///     Ok(())
/// });
/// assert!(slow.unwrap_err().is_timeout());
/// ```
#[derive(Debug, Clone)]
pub struct TimeoutManager {
    default_timeout: Duration,
    operation_timeouts: HashMap<String, Duration>,
}

impl Default for TimeoutManager {
    fn default() -> Self {
        Self::new(TimeoutConfig::default().default_timeout)
    }
}

impl TimeoutManager {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            default_timeout,
            operation_timeouts: HashMap::new(),
        }
    }

    /// Overrides the timeout for one operation name.
    pub fn with_operation_timeout(mut self, operation: impl Into<String>, timeout: Duration) -> Self {
        self.operation_timeouts.insert(operation.into(), timeout);
        self
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn timeout_for(&self, operation: &str) -> Duration {
        self.operation_timeouts
            .get(operation)
            .copied()
            .unwrap_or(self.default_timeout)
    }

    /// Runs `op` bounded by the timeout configured for `operation`.
    pub fn execute<T, F>(&self, operation: &str, op: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> AppResult<T> + Send + 'static,
    {
        self.execute_with(operation, self.timeout_for(operation), op)
    }

    /// Runs `op` bounded by an explicit `timeout`.
    pub fn execute_with<T, F>(&self, operation: &str, timeout: Duration, op: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> AppResult<T> + Send + 'static,
    {
        run_bounded(operation, timeout, move |_token| op())
    }

    /// Runs `op` with a token that is cancelled once the deadline passes.
    pub fn execute_cancellable<T, F>(&self, operation: &str, timeout: Duration, op: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(CancellationToken) -> AppResult<T> + Send + 'static,
    {
        run_bounded(operation, timeout, op)
    }

    /// Awaits `future` for at most the timeout configured for `operation`.
    ///
    /// The future is dropped on expiry, which cancels it.
    #[cfg(feature = "async")]
    pub async fn execute_async<T, Fut>(&self, operation: &str, future: Fut) -> AppResult<T>
    where
        Fut: std::future::Future<Output = AppResult<T>>,
    {
        let timeout = self.timeout_for(operation);
        match tokio::time::timeout(timeout, future).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(operation, timeout_ms = timeout.as_millis() as u64, "operation timed out");
                Err(ApplicationError::timeout(operation, timeout))
            }
        }
    }
}

/// Runs `op` on a worker thread and waits at most `timeout` for it.
pub(crate) fn run_bounded<T, F>(operation: &str, timeout: Duration, op: F) -> AppResult<T>
where
    T: Send + 'static,
    F: FnOnce(CancellationToken) -> AppResult<T> + Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel(1);
    let token = CancellationToken::new();
    let worker_token = token.clone();
    let started = Instant::now();

    thread::Builder::new()
        .name(worker_name(operation))
        .spawn(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| op(worker_token)));
            // The receiver is gone when the caller already timed out.
            let _ = tx.send(outcome);
        })
        .map_err(|e| {
            ApplicationError::service(operation, format!("failed to start worker for '{operation}'"))
                .with_source(e)
        })?;

    match rx.recv_timeout(timeout) {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => Err(ApplicationError::service(
            operation,
            format!("Operation '{operation}' panicked"),
        )),
        Err(RecvTimeoutError::Timeout) => {
            token.cancel();
            tracing::warn!(
                operation,
                timeout_ms = timeout.as_millis() as u64,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "operation timed out; worker abandoned"
            );
            Err(ApplicationError::timeout(operation, timeout))
        }
        Err(RecvTimeoutError::Disconnected) => Err(ApplicationError::service(
            operation,
            format!("Operation '{operation}' exited without a result"),
        )),
    }
}

/// Thread names may not contain NUL, which caller-supplied operation names can.
fn worker_name(operation: &str) -> String {
    let mut name = String::from("bulwark-timeout-");
    name.extend(operation.chars().filter(|c| *c != '\0'));
    name
}
