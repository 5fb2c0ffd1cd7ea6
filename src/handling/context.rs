use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use super::{log_error, panic_message};
use crate::error::{AppResult, ApplicationError};

type ErrorCallback = Arc<dyn Fn(&ApplicationError) + Send + Sync>;

/// Standard treatment of a failing operation.
///
/// On failure the error is converted into an [`ApplicationError`], tagged
/// with `operation`, `execution_time_seconds` and the handler's own context
/// entries, logged according to its severity, and passed to the callback.
/// It is then returned to the caller, unless a fallback value was set, in
/// which case the fallback is returned instead. [`reraise`](Self::reraise)
/// overrides that choice; without a fallback the error always propagates.
///
/// # Examples
///
/// ```
/// use ferrous_bulwark::{ApplicationError, ErrorHandler};
///
/// let strict = ErrorHandler::<u32>::new("parse_count");
/// let err = strict
///     .run(|| "x".parse::<u32>().map_err(|e| ApplicationError::validation("count", e.to_string())))
///     .unwrap_err();
/// assert_eq!(err.context_value("operation").unwrap(), "parse_count");
///
/// let lenient = ErrorHandler::new("parse_count").with_fallback(0u32);
/// assert_eq!(lenient.run(|| Err::<u32, _>("bad input")).unwrap(), 0);
/// ```
pub struct ErrorHandler<T> {
    operation: String,
    log_errors: bool,
    reraise: Option<bool>,
    fallback: Option<T>,
    context: BTreeMap<String, Value>,
    callback: Option<ErrorCallback>,
}

impl<T> ErrorHandler<T> {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            log_errors: true,
            reraise: None,
            fallback: None,
            context: BTreeMap::new(),
            callback: None,
        }
    }

    /// Logs and always propagates.
    pub fn fail_fast(operation: impl Into<String>) -> Self {
        Self::new(operation).reraise(true)
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn without_logging(mut self) -> Self {
        self.log_errors = false;
        self
    }

    pub fn reraise(mut self, reraise: bool) -> Self {
        self.reraise = Some(reraise);
        self
    }

    pub fn with_fallback(mut self, value: T) -> Self {
        self.fallback = Some(value);
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Called with every handled error. A panicking callback is logged and ignored.
    pub fn on_error<C>(mut self, callback: C) -> Self
    where
        C: Fn(&ApplicationError) + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }

    fn should_reraise(&self) -> bool {
        self.reraise.unwrap_or(self.fallback.is_none())
    }

    fn annotate(&self, error: ApplicationError, started: Instant) -> ApplicationError {
        let error = error
            .with_context("operation", self.operation.clone())
            .with_context("execution_time_seconds", started.elapsed().as_secs_f64());
        self.context
            .iter()
            .fold(error, |error, (key, value)| error.with_context(key.clone(), value.clone()))
    }

    fn notify(&self, error: &ApplicationError) {
        if self.log_errors {
            log_error(&self.operation, error);
        }
        if let Some(callback) = &self.callback {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(error))) {
                tracing::error!(
                    operation = %self.operation,
                    "error callback failed: {}",
                    panic_message(payload.as_ref())
                );
            }
        }
    }
}

impl<T: Default> ErrorHandler<T> {
    /// Logs failures and returns `T::default()` instead.
    pub fn log_and_suppress(operation: impl Into<String>) -> Self {
        Self::new(operation).with_fallback(T::default())
    }
}

impl<T: Clone> ErrorHandler<T> {
    /// Runs `f` under this handler.
    pub fn run<E, F>(&self, f: F) -> AppResult<T>
    where
        E: Into<ApplicationError>,
        F: FnOnce() -> Result<T, E>,
    {
        let started = Instant::now();
        let error = match f() {
            Ok(value) => return Ok(value),
            Err(err) => self.annotate(err.into(), started),
        };
        self.notify(&error);

        match self.fallback {
            Some(ref fallback) if !self.should_reraise() => Ok(fallback.clone()),
            _ => Err(error),
        }
    }
}

impl<T> std::fmt::Debug for ErrorHandler<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorHandler")
            .field("operation", &self.operation)
            .field("log_errors", &self.log_errors)
            .field("reraise", &self.should_reraise())
            .field("has_fallback", &self.fallback.is_some())
            .field("context", &self.context)
            .finish()
    }
}

/// Runs `f` under `handler`; see [`ErrorHandler`].
pub fn handle_errors<T, E, F>(handler: &ErrorHandler<T>, f: F) -> AppResult<T>
where
    T: Clone,
    E: Into<ApplicationError>,
    F: FnOnce() -> Result<T, E>,
{
    handler.run(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn foreign_errors_are_converted_and_annotated() {
        let handler = ErrorHandler::<()>::new("load_settings").with_context("path", "/etc/app.json");
        let err = handler
            .run(|| Err(std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused")))
            .unwrap_err();
        assert_eq!(err.error_code(), "NetworkError");
        assert_eq!(err.context_value("operation").unwrap(), "load_settings");
        assert_eq!(err.context_value("path").unwrap(), "/etc/app.json");
        assert!(err.context_value("execution_time_seconds").unwrap().is_f64());
    }

    #[test]
    fn reraise_wins_over_fallback() {
        let handler = ErrorHandler::new("op").with_fallback(1).reraise(true);
        assert!(handler.run(|| Err::<i32, _>("nope")).is_err());
    }

    #[test]
    fn callback_sees_error_and_panics_are_contained() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let handler = ErrorHandler::<i32>::log_and_suppress("op").on_error(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            panic!("callback bug");
        });
        assert_eq!(handler.run(|| Err::<i32, _>("boom")).unwrap(), 0);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn success_passes_through_untouched() {
        let handler = ErrorHandler::fail_fast("op");
        assert_eq!(handle_errors(&handler, || Ok::<_, ApplicationError>(7)).unwrap(), 7);
    }
}
