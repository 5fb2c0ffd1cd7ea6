use ferrous_bulwark::{
    error_boundary, handle_errors, safe_execute, ApplicationError, ErrorAggregator, ErrorCategory, ErrorHandler,
    ErrorRecovery, ErrorSeverity,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ===== ErrorHandler =====

#[test]
fn test_handler_without_fallback_reraises_with_context() {
    let handler: ErrorHandler<u32> = ErrorHandler::new("parse_quantity").with_context("sku", "A-100");
    let err = handle_errors(&handler, || "x12".parse::<u32>().map_err(|e| e.to_string())).unwrap_err();

    assert_eq!(err.context_value("operation"), Some(&json!("parse_quantity")));
    assert_eq!(err.context_value("sku"), Some(&json!("A-100")));
    assert!(err.context_value("execution_time_seconds").unwrap().is_f64());
}

#[test]
fn test_handler_with_fallback_suppresses() {
    let handler = ErrorHandler::new("load_preferences").with_fallback(vec!["default".to_string()]);
    let prefs = handler.run(|| Err::<Vec<String>, _>(ApplicationError::database("select", "timeout"))).unwrap();
    assert_eq!(prefs, vec!["default".to_string()]);
}

#[test]
fn test_explicit_reraise_wins_over_fallback() {
    let handler = ErrorHandler::new("charge").with_fallback(0u64).reraise(true);
    assert!(handler.run(|| Err::<u64, _>("declined")).is_err());

    let strict: ErrorHandler<u64> = ErrorHandler::fail_fast("charge");
    assert!(strict.run(|| Err::<u64, _>("declined")).is_err());
}

#[test]
fn test_log_and_suppress_uses_default() {
    let handler: ErrorHandler<Option<String>> = ErrorHandler::log_and_suppress("lookup_nickname");
    assert_eq!(handler.run(|| Err::<Option<String>, _>("missing")).unwrap(), None);
}

#[test]
fn test_success_passes_through_untouched() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let handler = ErrorHandler::new("noop").on_error(move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(handler.run(|| Ok::<_, ApplicationError>(7)).unwrap(), 7);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_callback_sees_error_and_may_panic() {
    let codes = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = codes.clone();
    let handler = ErrorHandler::new("sync_contacts")
        .without_logging()
        .with_fallback(0usize)
        .on_error(move |err| {
            sink.lock().push(err.error_code().to_string());
            panic!("callback bug");
        });

    let result = handler.run(|| Err::<usize, _>(ApplicationError::network("reset")));
    assert_eq!(result.unwrap(), 0);
    assert_eq!(*codes.lock(), vec!["NetworkError".to_string()]);
}

// ===== Boundaries =====

#[test]
fn test_boundary_contains_panics_and_errors() {
    let outcome = error_boundary("render_sidebar", Some("<empty/>"), || -> Result<&str, ApplicationError> {
        panic!("template missing")
    });
    assert!(!outcome.is_success());
    assert_eq!(outcome.clone().value_or("unused"), "<empty/>");
    let report = outcome.error_report().unwrap();
    assert_eq!(report.error_code, "ServiceError");
    assert_eq!(report.context["operation"], "render_sidebar");

    let ok = error_boundary("render_header", None, || Ok::<_, ApplicationError>("<h1/>"));
    assert!(ok.is_success());
    assert_eq!(ok.into_result().unwrap(), "<h1/>");
}

#[test]
fn test_boundary_without_fallback_has_no_value() {
    let outcome = error_boundary::<u8, _, _>("count", None, || Err(ApplicationError::network("down")));
    assert!(outcome.value.is_none());
    assert!(outcome.into_value().is_none());
}

#[test]
fn test_safe_execute_returns_default() {
    assert_eq!(safe_execute("ratio", 0.0, || Err::<f64, _>("division by zero")), 0.0);
    assert_eq!(safe_execute("ratio", 0.0, || Ok::<_, ApplicationError>(0.5)), 0.5);
    let len = safe_execute("panicky", 0usize, || -> Result<usize, ApplicationError> { panic!("oops") });
    assert_eq!(len, 0);
}

// ===== Recovery =====

#[test]
fn test_recovery_by_category() {
    let recovery: ErrorRecovery<Value> = ErrorRecovery::new();
    recovery.register_strategy(ErrorCategory::ExternalService, |err| {
        Ok(json!({ "stale": true, "reason": err.error_code() }))
    });
    assert!(recovery.has_strategy(ErrorCategory::ExternalService));
    assert!(!recovery.has_strategy(ErrorCategory::DataAccess));

    let value = recovery
        .run(|| Err(ApplicationError::timeout("fetch", Duration::from_secs(1))))
        .unwrap();
    assert_eq!(value["reason"], "TimeoutError");

    let err = recovery.run(|| Err(ApplicationError::database("select", "gone"))).unwrap_err();
    assert_eq!(err.error_code(), "DatabaseError");
}

// ===== Aggregation =====

#[test]
fn test_aggregator_summary_by_severity() {
    let aggregator = ErrorAggregator::new("nightly_sync");
    aggregator.add_error(ApplicationError::database("insert", "constraint violated"));
    aggregator.add_error(ApplicationError::authentication("token expired"));
    aggregator.add_error(ApplicationError::network("reset"));
    aggregator.add_error(ApplicationError::timeout("fetch", Duration::from_secs(5)));
    aggregator.add_error(ApplicationError::service("transform", "bad row"));

    let summary = aggregator.summary();
    assert_eq!(summary.total_errors, 5);
    assert_eq!(summary.by_severity[&ErrorSeverity::High], 2);
    assert_eq!(summary.by_severity[&ErrorSeverity::Medium], 3);
    assert!(!summary.by_severity.contains_key(&ErrorSeverity::Critical));
    assert_eq!(aggregator.errors_by_severity(ErrorSeverity::High).len(), 2);
    assert_eq!(aggregator.errors_by_category(ErrorCategory::Security).len(), 1);

    let err = aggregator.raise_if_errors().unwrap_err();
    assert!(err.message().starts_with("Multiple errors in nightly_sync: constraint violated; token expired"));
    assert_eq!(err.context_value("total_errors"), Some(&json!(5)));
    assert_eq!(err.context_value("by_severity").unwrap()["HIGH"], 2);
}

#[test]
fn test_aggregator_preserves_order_and_redacts_summary() {
    let aggregator = ErrorAggregator::default();
    assert_eq!(aggregator.operation(), "batch_operation");
    aggregator.add_error(ApplicationError::validation("row 1", "bad date"));
    aggregator.add_error_with_context(
        ApplicationError::authentication("rejected"),
        [("api_key", json!("sk-live-secret"))],
    );

    let messages: Vec<String> = aggregator.errors().iter().map(|e| e.message().to_string()).collect();
    assert_eq!(messages, vec!["bad date", "rejected"]);

    let summary = serde_json::to_value(aggregator.summary()).unwrap();
    assert_eq!(summary["errors"][1]["context"]["api_key"], "[REDACTED]");
    assert_eq!(summary["by_category"]["SECURITY"], 1);
}
