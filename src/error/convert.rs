//! Conversions from low-level failures into [`ApplicationError`].

use std::io;

use super::{ApplicationError, ErrorKind};
use crate::cancellation::CancellationError;

impl From<io::Error> for ApplicationError {
    fn from(err: io::Error) -> Self {
        let message = err.to_string();
        let kind = match err.kind() {
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::AddrNotAvailable
            | io::ErrorKind::BrokenPipe => ErrorKind::Network { host: None },
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ErrorKind::Timeout {
                operation: "io".to_string(),
                timeout: std::time::Duration::ZERO,
            },
            io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => ErrorKind::Validation {
                field: None,
                value: None,
                constraint: None,
            },
            _ => ErrorKind::Service { operation: None },
        };
        ApplicationError::new(kind, message).with_source(err)
    }
}

impl From<serde_json::Error> for ApplicationError {
    fn from(err: serde_json::Error) -> Self {
        let message = format!("Malformed JSON: {err}");
        ApplicationError::new(
            ErrorKind::Validation {
                field: None,
                value: None,
                constraint: Some("valid JSON".to_string()),
            },
            message,
        )
        .with_source(err)
    }
}

impl From<CancellationError> for ApplicationError {
    fn from(err: CancellationError) -> Self {
        ApplicationError::new(ErrorKind::Cancelled { operation: None }, err.to_string())
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for ApplicationError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        match err.downcast::<ApplicationError>() {
            Ok(app) => *app,
            Err(other) => match other.downcast::<io::Error>() {
                Ok(io_err) => ApplicationError::from(*io_err),
                Err(other) => ApplicationError::new(
                    ErrorKind::Service { operation: None },
                    format!("Unexpected error: {other}"),
                ),
            },
        }
    }
}

impl From<String> for ApplicationError {
    fn from(message: String) -> Self {
        ApplicationError::new(ErrorKind::Service { operation: None }, message)
    }
}

impl From<&str> for ApplicationError {
    fn from(message: &str) -> Self {
        ApplicationError::new(ErrorKind::Service { operation: None }, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorCategory;

    #[test]
    fn connection_errors_become_network_errors() {
        let err: ApplicationError = io::Error::new(io::ErrorKind::ConnectionRefused, "refused").into();
        assert_eq!(err.error_code(), "NetworkError");
        assert_eq!(err.category(), ErrorCategory::ExternalService);
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn timed_out_becomes_timeout() {
        let err: ApplicationError = io::Error::new(io::ErrorKind::TimedOut, "slow").into();
        assert!(err.is_timeout());
    }

    #[test]
    fn boxed_application_error_is_unwrapped() {
        let original = ApplicationError::authentication("bad token").with_correlation_id("c-1");
        let boxed: Box<dyn std::error::Error + Send + Sync> = Box::new(original);
        let err = ApplicationError::from(boxed);
        assert_eq!(err.error_code(), "AuthenticationError");
        assert_eq!(err.correlation_id(), "c-1");
    }

    #[test]
    fn bad_json_is_validation() {
        let parse = serde_json::from_str::<serde_json::Value>("{nope").unwrap_err();
        let err = ApplicationError::from(parse);
        assert_eq!(err.category(), ErrorCategory::Validation);
    }
}
