//! Structured application errors.
//!
//! Every failure that crosses a component boundary is an [`ApplicationError`]:
//! a single concrete type carrying an [`ErrorKind`] (the subtype together with
//! its specific fields), a severity, a category, a correlation id, a context
//! map, an end-user message and a construction timestamp.
//!
//! Errors are built with the `with_*` methods at the failure site and are not
//! mutated after being handed out. Code shown to an end user must use
//! [`ApplicationError::user_message`], never [`ApplicationError::message`].
//!
//! # Examples
//!
//! ```
//! use ferrous_bulwark::{ApplicationError, ErrorCategory, ErrorSeverity};
//!
//! let err = ApplicationError::validation("email", "address is missing an @")
//!     .with_context("form", "signup")
//!     .with_severity(ErrorSeverity::Medium);
//!
//! assert_eq!(err.error_code(), "ValidationError");
//! assert_eq!(err.category(), ErrorCategory::Validation);
//! assert!(!err.user_message().contains('@'));
//! ```

mod convert;
mod kind;

pub use kind::{ErrorCategory, ErrorKind, ErrorSeverity};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// Result type used throughout the crate.
pub type AppResult<T> = Result<T, ApplicationError>;

/// The single error type of the crate.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ApplicationError {
    kind: ErrorKind,
    message: String,
    error_code: String,
    severity: ErrorSeverity,
    category: ErrorCategory,
    correlation_id: String,
    context: BTreeMap<String, Value>,
    user_message: String,
    timestamp: DateTime<Utc>,
    #[source]
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl ApplicationError {
    /// Creates an error of the given kind with the kind's defaults for
    /// error code, severity, category and user message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            error_code: kind.type_name().to_string(),
            severity: kind.default_severity(),
            category: kind.default_category(),
            user_message: kind.default_user_message().to_string(),
            kind,
            message: message.into(),
            correlation_id: Uuid::new_v4().to_string(),
            context: BTreeMap::new(),
            timestamp: Utc::now(),
            source: None,
        }
    }

    pub fn application(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Application, message)
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::Validation {
                field: Some(field.into()),
                value: None,
                constraint: None,
            },
            message,
        )
    }

    /// Validation failure with the offending value and the violated constraint.
    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        constraint: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(
            ErrorKind::Validation {
                field: Some(field.into()),
                value: Some(value.into()),
                constraint: Some(constraint.into()),
            },
            message,
        )
    }

    pub fn service(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::Service {
                operation: Some(operation.into()),
            },
            message,
        )
    }

    pub fn external_service(service_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::ExternalService {
                service_name: service_name.into(),
                endpoint: None,
                status_code: None,
                response_body: None,
            },
            message,
        )
    }

    /// External service failure described by an HTTP-like response.
    pub fn external_response(
        service_name: impl Into<String>,
        endpoint: impl Into<String>,
        status_code: u16,
        response_body: Option<String>,
    ) -> Self {
        let service_name = service_name.into();
        let endpoint = endpoint.into();
        let message = format!("{service_name} returned status {status_code} for {endpoint}");
        Self::new(
            ErrorKind::ExternalService {
                service_name,
                endpoint: Some(endpoint),
                status_code: Some(status_code),
                response_body,
            },
            message,
        )
    }

    /// Rejection by an open circuit breaker.
    pub fn service_unavailable(service: impl Into<String>, retry_after: Option<Duration>) -> Self {
        let service = service.into();
        let message = format!("Circuit breaker '{service}' is open; call rejected");
        Self::new(ErrorKind::ServiceUnavailable { service, retry_after }, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network { host: None }, message)
    }

    pub fn timeout(operation: impl Into<String>, timeout: Duration) -> Self {
        let operation = operation.into();
        let message = format!("Operation '{operation}' timed out after {timeout:?}");
        Self::new(ErrorKind::Timeout { operation, timeout }, message)
    }

    pub fn database(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::Database {
                operation: Some(operation.into()),
                table: None,
            },
            message,
        )
    }

    pub fn configuration(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration { key: Some(key.into()) }, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authentication, message)
    }

    pub fn authorization(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::Authorization {
                resource: Some(resource.into()),
            },
            message,
        )
    }

    pub fn rate_limited(retry_after: Option<Duration>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimit { retry_after }, message)
    }

    pub fn cancelled(operation: impl Into<String>) -> Self {
        let operation = operation.into();
        let message = format!("Operation '{operation}' was cancelled");
        Self::new(
            ErrorKind::Cancelled {
                operation: Some(operation),
            },
            message,
        )
    }

    /// No registration exists for the requested service.
    pub fn service_not_registered(service: &str) -> Self {
        Self::new(
            ErrorKind::ServiceResolution {
                service: service.to_string(),
            },
            format!("Service not registered: {service}"),
        )
    }

    /// The service exists but cannot be resolved from this resolver.
    pub fn resolution_failed(service: &str, reason: impl AsRef<str>) -> Self {
        Self::new(
            ErrorKind::ServiceResolution {
                service: service.to_string(),
            },
            format!("Cannot resolve {service}: {}", reason.as_ref()),
        )
    }

    /// Cycle in the resolution graph. `chain` ends with the repeated service.
    pub fn circular_dependency(chain: Vec<String>) -> Self {
        let message = format!("Circular dependency detected: {}", chain.join(" -> "));
        Self::new(ErrorKind::CircularDependency { chain }, message)
    }

    pub fn with_severity(mut self, severity: ErrorSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_category(mut self, category: ErrorCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_error_code(mut self, code: impl Into<String>) -> Self {
        self.error_code = code.into();
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = id.into();
        self
    }

    pub fn with_user_message(mut self, message: impl Into<String>) -> Self {
        self.user_message = message.into();
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Adds context entries that are not already present.
    pub fn with_context_defaults<I, K>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        for (key, value) in entries {
            self.context.entry(key.into()).or_insert(value);
        }
        self
    }

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Arc::new(source));
        self
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn error_code(&self) -> &str {
        &self.error_code
    }

    pub fn severity(&self) -> ErrorSeverity {
        self.severity
    }

    pub fn category(&self) -> ErrorCategory {
        self.category
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn context(&self) -> &BTreeMap<String, Value> {
        &self.context
    }

    pub fn context_value(&self, key: &str) -> Option<&Value> {
        self.context.get(key)
    }

    /// Text safe to show to an end user.
    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }

    /// True when this error came from an open circuit breaker rather than
    /// from the protected operation.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self.kind, ErrorKind::ServiceUnavailable { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.kind, ErrorKind::Timeout { .. })
    }

    /// Serializable snapshot for logs and summaries.
    ///
    /// Context entries whose key looks like a credential are redacted.
    pub fn to_report(&self) -> ErrorReport {
        let context = self
            .context
            .iter()
            .map(|(k, v)| {
                let value = if crate::logging::is_sensitive_key(k) {
                    Value::String(crate::logging::REDACTED.to_string())
                } else {
                    v.clone()
                };
                (k.clone(), value)
            })
            .collect();

        ErrorReport {
            error_type: self.kind.type_name(),
            error_code: self.error_code.clone(),
            message: crate::logging::redact(&self.message),
            user_message: self.user_message.clone(),
            severity: self.severity,
            category: self.category,
            correlation_id: self.correlation_id.clone(),
            context,
            timestamp: self.timestamp,
            details: self.kind.clone(),
            source: self.source.as_ref().map(|s| crate::logging::redact(&s.to_string())),
        }
    }

    pub fn to_json(&self) -> String {
        // ErrorReport holds only strings, numbers and maps with string keys.
        serde_json::to_string(&self.to_report()).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Serialized form of an [`ApplicationError`].
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub error_type: &'static str,
    pub error_code: String,
    pub message: String,
    pub user_message: String,
    pub severity: ErrorSeverity,
    pub category: ErrorCategory,
    pub correlation_id: String,
    pub context: BTreeMap<String, Value>,
    pub timestamp: DateTime<Utc>,
    pub details: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}
