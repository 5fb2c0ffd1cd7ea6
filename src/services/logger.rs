use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::LoggingService;
use crate::container::ResolverContext;
use crate::error::AppResult;
use crate::logging::{is_sensitive_key, redact, REDACTED};
use crate::traits::Injectable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Scrubs credentials out of structured fields.
fn scrub_fields(fields: &[(&str, Value)]) -> serde_json::Map<String, Value> {
    fields
        .iter()
        .map(|(key, value)| {
            let value = match value {
                _ if is_sensitive_key(key) => Value::from(REDACTED),
                Value::String(s) => Value::from(redact(s)),
                other => other.clone(),
            };
            (key.to_string(), value)
        })
        .collect()
}

/// Forwards to `tracing` under a component name.
///
/// Debug messages are only emitted when the service is verbose.
#[derive(Debug, Clone)]
pub struct TracingLoggingService {
    component: String,
    verbose: bool,
}

impl TracingLoggingService {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            verbose: false,
        }
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

impl LoggingService for TracingLoggingService {
    fn log(&self, level: LogLevel, message: &str, fields: &[(&str, Value)]) {
        let message = redact(message);
        let fields = Value::Object(scrub_fields(fields));
        let component = self.component.as_str();
        match level {
            LogLevel::Debug if self.verbose => tracing::debug!(component, fields = %fields, "{}", message),
            LogLevel::Debug => {}
            LogLevel::Info => tracing::info!(component, fields = %fields, "{}", message),
            LogLevel::Warn => tracing::warn!(component, fields = %fields, "{}", message),
            LogLevel::Error => tracing::error!(component, fields = %fields, "{}", message),
        }
    }
}

/// One captured log call.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub level: LogLevel,
    pub message: String,
    pub fields: serde_json::Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

/// Captures log calls in memory for assertions.
///
/// ```
/// use ferrous_bulwark::{LogLevel, LoggingService, MockLoggingService};
///
/// let logger = MockLoggingService::new();
/// logger.warn("cache miss storm");
/// assert_eq!(logger.messages(), vec!["cache miss storm".to_string()]);
/// assert_eq!(logger.count(LogLevel::Warn), 1);
/// ```
#[derive(Debug, Default)]
pub struct MockLoggingService {
    records: Mutex<Vec<LogRecord>>,
}

impl MockLoggingService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.records.lock().iter().map(|r| r.message.clone()).collect()
    }

    pub fn count(&self, level: LogLevel) -> usize {
        self.records.lock().iter().filter(|r| r.level == level).count()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl Injectable for MockLoggingService {
    fn inject(_: &ResolverContext<'_>) -> AppResult<Self> {
        Ok(Self::new())
    }
}

crate::implements!(MockLoggingService => dyn LoggingService);

impl LoggingService for MockLoggingService {
    fn log(&self, level: LogLevel, message: &str, fields: &[(&str, Value)]) {
        self.records.lock().push(LogRecord {
            level,
            message: redact(message),
            fields: scrub_fields(fields),
            timestamp: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captured_fields_are_scrubbed() {
        let logger = MockLoggingService::new();
        logger.log(
            LogLevel::Info,
            "calling api",
            &[("api_key", Value::from("abc")), ("city", Value::from("Oslo"))],
        );
        let record = &logger.records()[0];
        assert_eq!(record.fields["api_key"], REDACTED);
        assert_eq!(record.fields["city"], "Oslo");
    }
}
