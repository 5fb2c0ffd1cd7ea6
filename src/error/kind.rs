//! Error kinds, severities and categories.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How urgently an error needs attention.
///
/// Variants are ordered from most to least severe, so `Critical < Info`
/// under `Ord`. Log level selection follows severity: `Critical` and `High`
/// are logged as errors, `Medium` as warnings, the rest as info.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorSeverity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl ErrorSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorSeverity::Critical => "CRITICAL",
            ErrorSeverity::High => "HIGH",
            ErrorSeverity::Medium => "MEDIUM",
            ErrorSeverity::Low => "LOW",
            ErrorSeverity::Info => "INFO",
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Broad classification of where a failure originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    /// Bad input, fixable by the caller
    Validation,
    /// Third-party dependency failure, including network and timeout
    ExternalService,
    /// Failures of the runtime environment itself
    Infrastructure,
    /// Authentication and authorization
    Security,
    /// Storage failures
    DataAccess,
    /// Missing or invalid setup
    Configuration,
    /// Internal operation failure
    BusinessLogic,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Validation => "VALIDATION",
            ErrorCategory::ExternalService => "EXTERNAL_SERVICE",
            ErrorCategory::Infrastructure => "INFRASTRUCTURE",
            ErrorCategory::Security => "SECURITY",
            ErrorCategory::DataAccess => "DATA_ACCESS",
            ErrorCategory::Configuration => "CONFIGURATION",
            ErrorCategory::BusinessLogic => "BUSINESS_LOGIC",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The concrete error type, with the fields specific to it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ErrorKind {
    /// Generic application failure with no more specific type
    Application,
    Validation {
        field: Option<String>,
        value: Option<String>,
        constraint: Option<String>,
    },
    Service {
        operation: Option<String>,
    },
    ExternalService {
        service_name: String,
        endpoint: Option<String>,
        status_code: Option<u16>,
        response_body: Option<String>,
    },
    /// Raised by an open circuit breaker without calling the dependency
    ServiceUnavailable {
        service: String,
        #[serde(with = "humantime_serde")]
        retry_after: Option<Duration>,
    },
    Network {
        host: Option<String>,
    },
    Timeout {
        operation: String,
        #[serde(with = "humantime_serde")]
        timeout: Duration,
    },
    Database {
        operation: Option<String>,
        table: Option<String>,
    },
    Configuration {
        key: Option<String>,
    },
    Authentication,
    Authorization {
        resource: Option<String>,
    },
    RateLimit {
        #[serde(with = "humantime_serde")]
        retry_after: Option<Duration>,
    },
    Cancelled {
        operation: Option<String>,
    },
    /// Unregistered service or lifetime mismatch
    ServiceResolution {
        service: String,
    },
    CircularDependency {
        chain: Vec<String>,
    },
}

impl ErrorKind {
    /// Type name used as the default error code.
    pub fn type_name(&self) -> &'static str {
        match self {
            ErrorKind::Application => "BaseApplicationError",
            ErrorKind::Validation { .. } => "ValidationError",
            ErrorKind::Service { .. } => "ServiceError",
            ErrorKind::ExternalService { .. } => "ExternalServiceError",
            ErrorKind::ServiceUnavailable { .. } => "ServiceUnavailableError",
            ErrorKind::Network { .. } => "NetworkError",
            ErrorKind::Timeout { .. } => "TimeoutError",
            ErrorKind::Database { .. } => "DatabaseError",
            ErrorKind::Configuration { .. } => "ConfigurationError",
            ErrorKind::Authentication => "AuthenticationError",
            ErrorKind::Authorization { .. } => "AuthorizationError",
            ErrorKind::RateLimit { .. } => "RateLimitError",
            ErrorKind::Cancelled { .. } => "CancelledError",
            ErrorKind::ServiceResolution { .. } => "ServiceResolutionError",
            ErrorKind::CircularDependency { .. } => "CircularDependencyError",
        }
    }

    pub fn default_severity(&self) -> ErrorSeverity {
        match self {
            ErrorKind::Configuration { .. }
            | ErrorKind::ServiceResolution { .. }
            | ErrorKind::CircularDependency { .. } => ErrorSeverity::Critical,
            ErrorKind::ServiceUnavailable { .. }
            | ErrorKind::Database { .. }
            | ErrorKind::Authentication
            | ErrorKind::Authorization { .. } => ErrorSeverity::High,
            ErrorKind::Application
            | ErrorKind::Service { .. }
            | ErrorKind::ExternalService { .. }
            | ErrorKind::Network { .. }
            | ErrorKind::Timeout { .. } => ErrorSeverity::Medium,
            ErrorKind::Validation { .. } | ErrorKind::RateLimit { .. } => ErrorSeverity::Low,
            ErrorKind::Cancelled { .. } => ErrorSeverity::Info,
        }
    }

    pub fn default_category(&self) -> ErrorCategory {
        match self {
            ErrorKind::Validation { .. } => ErrorCategory::Validation,
            ErrorKind::ExternalService { .. }
            | ErrorKind::ServiceUnavailable { .. }
            | ErrorKind::Network { .. }
            | ErrorKind::Timeout { .. }
            | ErrorKind::RateLimit { .. } => ErrorCategory::ExternalService,
            ErrorKind::Database { .. } => ErrorCategory::DataAccess,
            ErrorKind::Configuration { .. }
            | ErrorKind::ServiceResolution { .. }
            | ErrorKind::CircularDependency { .. } => ErrorCategory::Configuration,
            ErrorKind::Authentication | ErrorKind::Authorization { .. } => ErrorCategory::Security,
            ErrorKind::Application | ErrorKind::Service { .. } | ErrorKind::Cancelled { .. } => {
                ErrorCategory::BusinessLogic
            }
        }
    }

    /// Canned end-user text. Never contains details from the failure itself.
    pub fn default_user_message(&self) -> &'static str {
        match self {
            ErrorKind::Application => "An unexpected error occurred. Please try again later.",
            ErrorKind::Validation { .. } => {
                "The provided input is invalid. Please check it and try again."
            }
            ErrorKind::Service { .. } => "The operation could not be completed. Please try again.",
            ErrorKind::ExternalService { .. } => {
                "An external service is not responding. Please try again later."
            }
            ErrorKind::ServiceUnavailable { .. } => {
                "Service is temporarily unavailable due to repeated failures."
            }
            ErrorKind::Network { .. } => {
                "A network problem occurred. Please check your connection."
            }
            ErrorKind::Timeout { .. } => {
                "The operation took too long to complete. Please try again."
            }
            ErrorKind::Database { .. } => "A data storage problem occurred. Please try again later.",
            ErrorKind::Configuration { .. }
            | ErrorKind::ServiceResolution { .. }
            | ErrorKind::CircularDependency { .. } => {
                "The application is not configured correctly. Please contact support."
            }
            ErrorKind::Authentication => "Authentication failed. Please sign in again.",
            ErrorKind::Authorization { .. } => "You do not have permission to perform this action.",
            ErrorKind::RateLimit { .. } => "Too many requests. Please wait a moment and try again.",
            ErrorKind::Cancelled { .. } => "The operation was cancelled.",
        }
    }

    /// Whether a later attempt of the same operation could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorKind::ExternalService { .. }
                | ErrorKind::Network { .. }
                | ErrorKind::Timeout { .. }
                | ErrorKind::Database { .. }
                | ErrorKind::RateLimit { .. }
        )
    }
}
