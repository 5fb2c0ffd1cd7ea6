use ferrous_bulwark::{ApplicationError, ErrorCategory, ErrorKind, ErrorSeverity};
use serde_json::{json, Value};
use std::error::Error as _;
use std::io;
use std::time::Duration;

// ===== Taxonomy Defaults =====

#[test]
fn test_default_classification_per_type() {
    let cases = [
        (ApplicationError::application("boom"), "BaseApplicationError", ErrorSeverity::Medium, ErrorCategory::BusinessLogic),
        (ApplicationError::validation("email", "missing @"), "ValidationError", ErrorSeverity::Low, ErrorCategory::Validation),
        (ApplicationError::service("sync", "failed"), "ServiceError", ErrorSeverity::Medium, ErrorCategory::BusinessLogic),
        (ApplicationError::external_service("maps", "502"), "ExternalServiceError", ErrorSeverity::Medium, ErrorCategory::ExternalService),
        (ApplicationError::network("reset"), "NetworkError", ErrorSeverity::Medium, ErrorCategory::ExternalService),
        (ApplicationError::timeout("fetch", Duration::from_secs(2)), "TimeoutError", ErrorSeverity::Medium, ErrorCategory::ExternalService),
        (ApplicationError::database("insert", "locked"), "DatabaseError", ErrorSeverity::High, ErrorCategory::DataAccess),
        (ApplicationError::configuration("api_url", "missing"), "ConfigurationError", ErrorSeverity::Critical, ErrorCategory::Configuration),
        (ApplicationError::authentication("bad token"), "AuthenticationError", ErrorSeverity::High, ErrorCategory::Security),
        (ApplicationError::authorization("reports", "denied"), "AuthorizationError", ErrorSeverity::High, ErrorCategory::Security),
        (ApplicationError::rate_limited(None, "slow down"), "RateLimitError", ErrorSeverity::Low, ErrorCategory::ExternalService),
        (ApplicationError::service_unavailable("payments", None), "ServiceUnavailableError", ErrorSeverity::High, ErrorCategory::ExternalService),
    ];

    for (err, code, severity, category) in cases {
        assert_eq!(err.error_code(), code);
        assert_eq!(err.severity(), severity, "{code}");
        assert_eq!(err.category(), category, "{code}");
        assert!(!err.user_message().is_empty());
    }
}

#[test]
fn test_transient_classification() {
    assert!(ApplicationError::network("reset").is_transient());
    assert!(ApplicationError::timeout("op", Duration::from_secs(1)).is_transient());
    assert!(ApplicationError::database("q", "deadlock").is_transient());
    assert!(!ApplicationError::validation("f", "bad").is_transient());
    assert!(!ApplicationError::configuration("k", "missing").is_transient());
    assert!(!ApplicationError::service_unavailable("svc", None).is_transient());
}

#[test]
fn test_severity_orders_most_severe_first() {
    let mut severities = vec![ErrorSeverity::Info, ErrorSeverity::Critical, ErrorSeverity::Medium];
    severities.sort();
    assert_eq!(severities, vec![ErrorSeverity::Critical, ErrorSeverity::Medium, ErrorSeverity::Info]);
}

// ===== Construction =====

#[test]
fn test_builders_override_defaults() {
    let err = ApplicationError::service("charge", "card declined")
        .with_severity(ErrorSeverity::Critical)
        .with_category(ErrorCategory::BusinessLogic)
        .with_error_code("PAYMENT_DECLINED")
        .with_correlation_id("req-42")
        .with_user_message("Your card was declined.")
        .with_context("order_id", 1001);

    assert_eq!(err.error_code(), "PAYMENT_DECLINED");
    assert_eq!(err.severity(), ErrorSeverity::Critical);
    assert_eq!(err.correlation_id(), "req-42");
    assert_eq!(err.user_message(), "Your card was declined.");
    assert_eq!(err.context_value("order_id"), Some(&json!(1001)));
    assert_eq!(err.to_string(), "card declined");
}

#[test]
fn test_context_defaults_do_not_overwrite() {
    let err = ApplicationError::network("reset")
        .with_context("attempt", 3)
        .with_context_defaults([("attempt", json!(1)), ("host", json!("api.example.com"))]);
    assert_eq!(err.context_value("attempt"), Some(&json!(3)));
    assert_eq!(err.context_value("host"), Some(&json!("api.example.com")));
}

#[test]
fn test_correlation_ids_are_unique() {
    let a = ApplicationError::network("a");
    let b = ApplicationError::network("b");
    assert_ne!(a.correlation_id(), b.correlation_id());
}

#[test]
fn test_external_response_fields() {
    let err = ApplicationError::external_response("weather-api", "/v1/forecast", 503, Some("maintenance".into()));
    match err.kind() {
        ErrorKind::ExternalService { status_code, endpoint, .. } => {
            assert_eq!(*status_code, Some(503));
            assert_eq!(endpoint.as_deref(), Some("/v1/forecast"));
        }
        other => panic!("unexpected kind {other:?}"),
    }
    assert!(err.message().contains("503"));
}

#[test]
fn test_user_message_never_echoes_details() {
    let err = ApplicationError::database("select", "relation \"users_secret\" does not exist");
    assert!(!err.user_message().contains("users_secret"));
}

// ===== Conversions =====

#[test]
fn test_io_errors_keep_their_source() {
    let err: ApplicationError = io::Error::new(io::ErrorKind::TimedOut, "read timed out").into();
    assert!(err.is_timeout());
    assert!(err.source().is_some());
}

#[test]
fn test_json_errors_become_validation_errors() {
    let parse: Result<Value, _> = serde_json::from_str("{not json");
    let err: ApplicationError = parse.unwrap_err().into();
    assert_eq!(err.error_code(), "ValidationError");
    assert!(err.message().starts_with("Malformed JSON"));
}

#[test]
fn test_boxed_application_error_round_trips() {
    let original = ApplicationError::configuration("db_url", "missing").with_correlation_id("keep-me");
    let boxed: Box<dyn std::error::Error + Send + Sync> = Box::new(original);
    let err = ApplicationError::from(boxed);
    assert_eq!(err.correlation_id(), "keep-me");
}

// ===== Serialization =====

#[test]
fn test_report_shape() {
    let err = ApplicationError::validation("email", "address is missing an @").with_context("form", "signup");
    let json: Value = serde_json::from_str(&err.to_json()).unwrap();

    assert_eq!(json["error_type"], "ValidationError");
    assert_eq!(json["error_code"], "ValidationError");
    assert_eq!(json["severity"], "LOW");
    assert_eq!(json["category"], "VALIDATION");
    assert_eq!(json["context"]["form"], "signup");
    assert_eq!(json["details"]["type"], "Validation");
    assert_eq!(json["details"]["field"], "email");
    assert!(json["timestamp"].is_string());
    assert!(json.get("source").is_none());
}

#[test]
fn test_report_redacts_secrets() {
    let err = ApplicationError::authentication("login failed with password=hunter2")
        .with_context("api_key", "sk-live-123")
        .with_context("user", "ops@example.com");
    let report = err.to_report();

    assert!(!report.message.contains("hunter2"));
    assert_eq!(report.context["api_key"], "[REDACTED]");
    // Non-sensitive keys keep their values.
    assert_eq!(report.context["user"], "ops@example.com");
    // The error itself is untouched.
    assert!(err.message().contains("hunter2"));
}

#[test]
fn test_timeout_details_use_human_durations() {
    let err = ApplicationError::timeout("fetch", Duration::from_millis(1500));
    let json: Value = serde_json::from_str(&err.to_json()).unwrap();
    assert_eq!(json["details"]["timeout"], "1s 500ms");
}
