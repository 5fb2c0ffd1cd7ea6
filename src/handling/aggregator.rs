use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use super::log_error;
use crate::error::{AppResult, ApplicationError, ErrorCategory, ErrorReport, ErrorSeverity};

#[derive(Default)]
struct Collected {
    errors: Vec<ApplicationError>,
    warnings: Vec<String>,
}

/// Read-only view of an [`ErrorAggregator`], computed on demand.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorSummary {
    pub operation: String,
    pub total_errors: usize,
    pub warning_count: usize,
    pub by_severity: BTreeMap<ErrorSeverity, usize>,
    pub by_category: BTreeMap<ErrorCategory, usize>,
    pub errors: Vec<ErrorReport>,
    pub warnings: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Collects the failures of a batch of independent operations.
///
/// Errors keep their insertion order. The aggregator is shared by
/// reference across worker threads; nothing is cleared except by
/// [`reset`](Self::reset).
///
/// # Examples
///
/// ```
/// use ferrous_bulwark::{ApplicationError, ErrorAggregator, ErrorSeverity};
///
/// let aggregator = ErrorAggregator::new("import_entries");
/// aggregator.add_error(ApplicationError::validation("date", "not a date"));
/// aggregator.add_message("row 7 could not be stored");
/// aggregator.add_warning("row 9 had trailing whitespace");
///
/// let summary = aggregator.summary();
/// assert_eq!(summary.total_errors, 2);
/// assert_eq!(summary.warning_count, 1);
/// assert_eq!(summary.by_severity[&ErrorSeverity::Low], 1);
/// assert!(aggregator.raise_if_errors().is_err());
/// ```
pub struct ErrorAggregator {
    operation: String,
    collected: Mutex<Collected>,
}

impl Default for ErrorAggregator {
    fn default() -> Self {
        Self::new("batch_operation")
    }
}

impl ErrorAggregator {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            collected: Mutex::new(Collected::default()),
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Appends an error, tagging it with this batch's operation name.
    pub fn add_error(&self, error: impl Into<ApplicationError>) {
        self.push(error.into(), std::iter::empty());
    }

    /// Appends an error with extra context entries.
    pub fn add_error_with_context<I, K>(&self, error: impl Into<ApplicationError>, context: I)
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.push(error.into(), context.into_iter().map(|(k, v)| (k.into(), v)));
    }

    /// Appends a `ServiceError` with `message`.
    pub fn add_message(&self, message: impl Into<String>) {
        let error = ApplicationError::service(self.operation.clone(), message);
        self.push(error, std::iter::empty());
    }

    pub fn add_warning(&self, message: impl Into<String>) {
        self.collected.lock().warnings.push(message.into());
    }

    fn push(&self, error: ApplicationError, context: impl Iterator<Item = (String, Value)>) {
        let error = context.fold(error, |error, (key, value)| error.with_context(key, value));
        let error = error.with_context_defaults([("batch_operation", Value::from(self.operation.clone()))]);
        self.collected.lock().errors.push(error);
    }

    pub fn errors(&self) -> Vec<ApplicationError> {
        self.collected.lock().errors.clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.collected.lock().warnings.clone()
    }

    pub fn error_count(&self) -> usize {
        self.collected.lock().errors.len()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    pub fn has_warnings(&self) -> bool {
        !self.collected.lock().warnings.is_empty()
    }

    /// Errors of exactly `severity`, in insertion order.
    pub fn errors_by_severity(&self, severity: ErrorSeverity) -> Vec<ApplicationError> {
        self.collected
            .lock()
            .errors
            .iter()
            .filter(|e| e.severity() == severity)
            .cloned()
            .collect()
    }

    pub fn errors_by_category(&self, category: ErrorCategory) -> Vec<ApplicationError> {
        self.collected
            .lock()
            .errors
            .iter()
            .filter(|e| e.category() == category)
            .cloned()
            .collect()
    }

    pub fn summary(&self) -> ErrorSummary {
        let collected = self.collected.lock();
        let mut by_severity = BTreeMap::new();
        let mut by_category = BTreeMap::new();
        for error in &collected.errors {
            *by_severity.entry(error.severity()).or_insert(0) += 1;
            *by_category.entry(error.category()).or_insert(0) += 1;
        }

        ErrorSummary {
            operation: self.operation.clone(),
            total_errors: collected.errors.len(),
            warning_count: collected.warnings.len(),
            by_severity,
            by_category,
            errors: collected.errors.iter().map(ApplicationError::to_report).collect(),
            warnings: collected.warnings.clone(),
            timestamp: Utc::now(),
        }
    }

    /// Fails with one `ServiceError` describing every collected error.
    pub fn raise_if_errors(&self) -> AppResult<()> {
        let summary = self.summary();
        if summary.total_errors == 0 {
            return Ok(());
        }
        let messages: Vec<String> = self.errors().iter().map(ToString::to_string).collect();
        let by_severity: serde_json::Map<String, Value> = summary
            .by_severity
            .iter()
            .map(|(severity, count)| (severity.as_str().to_string(), Value::from(*count)))
            .collect();

        Err(ApplicationError::service(
            self.operation.clone(),
            format!("Multiple errors in {}: {}", self.operation, messages.join("; ")),
        )
        .with_context("total_errors", summary.total_errors)
        .with_context("by_severity", Value::Object(by_severity)))
    }

    pub fn log_all(&self) {
        let collected = self.collected.lock();
        for error in &collected.errors {
            log_error(&self.operation, error);
        }
        for warning in &collected.warnings {
            tracing::warn!(operation = %self.operation, "warning: {}", warning);
        }
    }

    pub fn reset(&self) {
        let mut collected = self.collected.lock();
        collected.errors.clear();
        collected.warnings.clear();
    }
}

impl std::fmt::Debug for ErrorAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let collected = self.collected.lock();
        f.debug_struct("ErrorAggregator")
            .field("operation", &self.operation)
            .field("errors", &collected.errors.len())
            .field("warnings", &collected.warnings.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_counts_by_severity_and_category() {
        let aggregator = ErrorAggregator::default();
        aggregator.add_error(ApplicationError::database("insert", "locked"));
        aggregator.add_error(ApplicationError::network("reset"));
        aggregator.add_error(ApplicationError::timeout("fetch", std::time::Duration::from_secs(1)));

        let summary = aggregator.summary();
        assert_eq!(summary.total_errors, 3);
        assert_eq!(summary.by_severity[&ErrorSeverity::High], 1);
        assert_eq!(summary.by_severity[&ErrorSeverity::Medium], 2);
        assert_eq!(summary.by_category[&ErrorCategory::ExternalService], 2);
        assert_eq!(summary.by_category[&ErrorCategory::DataAccess], 1);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["by_severity"]["MEDIUM"], 2);
    }

    #[test]
    fn context_is_attached() {
        let aggregator = ErrorAggregator::new("sync");
        aggregator.add_error_with_context(
            ApplicationError::network("reset"),
            [("row", Value::from(4))],
        );
        let error = &aggregator.errors()[0];
        assert_eq!(error.context_value("row"), Some(&Value::from(4)));
        assert_eq!(error.context_value("batch_operation"), Some(&Value::from("sync")));
    }

    #[test]
    fn reset_clears_everything() {
        let aggregator = ErrorAggregator::new("sync");
        aggregator.add_message("one");
        aggregator.add_warning("two");
        aggregator.reset();
        assert!(!aggregator.has_errors());
        assert!(!aggregator.has_warnings());
        assert!(aggregator.raise_if_errors().is_ok());
    }
}
