//! Call-site error handling.
//!
//! Wrappers that turn the error taxonomy and the reliability primitives into
//! reusable patterns:
//!
//! - [`ErrorHandler`] / [`handle_errors`]: convert, annotate, log, then
//!   re-raise or substitute a fallback
//! - [`error_boundary`]: absorbs every failure, panics included
//! - [`safe_execute`] and [`ResiliencePipeline`]: compose timeout, retry and
//!   circuit breaker around one operation
//! - [`ErrorAggregator`]: collects failures from a batch
//! - [`ErrorRecovery`]: recovery strategies per error category
//!
//! `error_boundary`, `safe_execute` and [`ResiliencePipeline::execute_or`]
//! are the only places where an error is absorbed into a fallback value.

mod aggregator;
mod boundary;
mod context;
mod pipeline;
mod recovery;

pub use aggregator::{ErrorAggregator, ErrorSummary};
pub use boundary::{error_boundary, BoundaryOutcome};
pub use context::{handle_errors, ErrorHandler};
pub use pipeline::{safe_execute, Layer, ResiliencePipeline};
pub use recovery::ErrorRecovery;

use crate::error::{ApplicationError, ErrorSeverity};
use crate::logging::redact;

/// Logs `error` at a level derived from its severity.
pub fn log_error(operation: &str, error: &ApplicationError) {
    let message = redact(error.message());
    match error.severity() {
        ErrorSeverity::Critical | ErrorSeverity::High => tracing::error!(
            operation,
            error_code = error.error_code(),
            severity = %error.severity(),
            category = %error.category(),
            correlation_id = error.correlation_id(),
            "{} severity error in {}: {}",
            error.severity(),
            operation,
            message
        ),
        ErrorSeverity::Medium => tracing::warn!(
            operation,
            error_code = error.error_code(),
            severity = %error.severity(),
            category = %error.category(),
            correlation_id = error.correlation_id(),
            "{} severity error in {}: {}",
            error.severity(),
            operation,
            message
        ),
        ErrorSeverity::Low | ErrorSeverity::Info => tracing::info!(
            operation,
            error_code = error.error_code(),
            severity = %error.severity(),
            category = %error.category(),
            correlation_id = error.correlation_id(),
            "{} severity error in {}: {}",
            error.severity(),
            operation,
            message
        ),
    }
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
