use std::panic::{self, AssertUnwindSafe};

use serde::Serialize;

use super::{log_error, panic_message};
use crate::error::{ApplicationError, ErrorReport};

/// What happened inside an [`error_boundary`].
///
/// On success `value` holds the result and `error` is empty. On failure
/// `value` holds the fallback, if one was given, and `error` the failure.
#[derive(Debug, Clone)]
pub struct BoundaryOutcome<T> {
    pub operation: String,
    pub success: bool,
    pub value: Option<T>,
    pub error: Option<ApplicationError>,
}

impl<T> BoundaryOutcome<T> {
    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn into_value(self) -> Option<T> {
        self.value
    }

    pub fn value_or(self, default: T) -> T {
        self.value.unwrap_or(default)
    }

    /// Converts back into a `Result`, dropping the fallback.
    pub fn into_result(self) -> Result<T, ApplicationError> {
        match (self.value, self.error) {
            (_, Some(error)) => Err(error),
            (Some(value), None) => Ok(value),
            (None, None) => Err(ApplicationError::service(
                self.operation,
                "error boundary completed without a value",
            )),
        }
    }

    /// Redacted form of the captured error.
    pub fn error_report(&self) -> Option<ErrorReport> {
        self.error.as_ref().map(ApplicationError::to_report)
    }
}

#[derive(Serialize)]
struct OutcomeView<'a, T> {
    operation: &'a str,
    success: bool,
    value: &'a Option<T>,
    error: Option<ErrorReport>,
}

impl<T: Serialize> Serialize for BoundaryOutcome<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        OutcomeView {
            operation: &self.operation,
            success: self.success,
            value: &self.value,
            error: self.error_report(),
        }
        .serialize(serializer)
    }
}

/// Runs `f` and absorbs any failure, returned or panicked.
///
/// Never returns an error and never lets a panic from `f` escape.
///
/// # Examples
///
/// ```
/// use ferrous_bulwark::{error_boundary, ApplicationError};
///
/// let outcome = error_boundary("render_widget", Some("n/a"), || {
///     Err::<&str, _>(ApplicationError::network("feed offline"))
/// });
/// assert!(!outcome.success);
/// assert_eq!(outcome.value, Some("n/a"));
/// assert!(outcome.error.is_some());
///
/// let outcome = error_boundary("render_widget", None, || Ok::<_, ApplicationError>("22°C"));
/// assert!(outcome.success);
/// assert_eq!(outcome.value, Some("22°C"));
/// ```
pub fn error_boundary<T, E, F>(operation: &str, fallback: Option<T>, f: F) -> BoundaryOutcome<T>
where
    E: Into<ApplicationError>,
    F: FnOnce() -> Result<T, E>,
{
    let error = match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => {
            return BoundaryOutcome {
                operation: operation.to_string(),
                success: true,
                value: Some(value),
                error: None,
            }
        }
        Ok(Err(err)) => err.into(),
        Err(payload) => ApplicationError::service(
            operation,
            format!("Error in {operation}: panicked: {}", panic_message(payload.as_ref())),
        ),
    }
    .with_context("operation", operation);

    log_error(operation, &error);
    BoundaryOutcome {
        operation: operation.to_string(),
        success: false,
        value: fallback,
        error: Some(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panics_are_captured() {
        let outcome = error_boundary::<u8, ApplicationError, _>("explode", Some(9), || panic!("kaboom"));
        assert!(!outcome.success);
        assert_eq!(outcome.value, Some(9));
        let error = outcome.error.unwrap();
        assert_eq!(error.error_code(), "ServiceError");
        assert!(error.message().contains("kaboom"));
    }

    #[test]
    fn into_result_prefers_error() {
        let outcome = error_boundary("op", Some(1), || Err::<i32, _>("bad"));
        assert!(outcome.into_result().is_err());
    }

    #[test]
    fn serializes_redacted_error() {
        let outcome = error_boundary("op", None::<i32>, || {
            Err::<i32, _>(ApplicationError::authentication("bad password=swordfish"))
        });
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["success"], false);
        assert!(!json["error"]["message"].as_str().unwrap().contains("swordfish"));
    }
}
