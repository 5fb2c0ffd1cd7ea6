use ferrous_bulwark::{
    ApplicationError, CircuitBreaker, CircuitBreakerConfig, GracefulDegradation, ResiliencePipeline, RetryPolicy,
    RetryWithBackoff, TimeoutManager,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
struct Forecast {
    city: String,
    source: &'static str,
}

fn forecast(source: &'static str) -> Forecast {
    Forecast {
        city: "oslo".into(),
        source,
    }
}

#[test]
fn test_open_breaker_switches_to_fallback() {
    let breaker = Arc::new(CircuitBreaker::new(
        "forecast-api",
        CircuitBreakerConfig::new(2, Duration::from_secs(60)),
    ));
    let degradation = GracefulDegradation::new();
    let watched = breaker.clone();
    degradation.register_fallback("forecast", || Ok(forecast("cache")), move || watched.is_open());

    let primary_calls = AtomicUsize::new(0);
    let fetch = || {
        breaker.call(|| {
            primary_calls.fetch_add(1, Ordering::SeqCst);
            Err::<Forecast, _>(ApplicationError::network("api unreachable"))
        })
    };

    // While closed the primary runs; its failures fall through to the chain.
    assert_eq!(degradation.execute("forecast", fetch).unwrap().source, "cache");
    assert_eq!(degradation.execute("forecast", fetch).unwrap().source, "cache");
    assert_eq!(primary_calls.load(Ordering::SeqCst), 2);
    assert!(breaker.is_open());

    // Once open the primary is not attempted at all.
    assert_eq!(degradation.execute("forecast", fetch).unwrap().source, "cache");
    assert_eq!(primary_calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_primary_result_wins_when_healthy() {
    let degradation = GracefulDegradation::new();
    degradation.register_fallback("forecast", || Ok(forecast("cache")), || false);
    let value = degradation.execute("forecast", || Ok(forecast("live"))).unwrap();
    assert_eq!(value, forecast("live"));
}

#[test]
fn test_failing_degraded_fallback_is_returned_as_is() {
    let degradation: GracefulDegradation<Forecast> = GracefulDegradation::new();
    degradation.register_fallback(
        "forecast",
        || Err(ApplicationError::service("cache", "cache empty")),
        || true,
    );
    let err = degradation.execute("forecast", || Ok(forecast("live"))).unwrap_err();
    assert_eq!(err.message(), "cache empty");
}

#[test]
fn test_keys_are_independent() {
    let degradation = GracefulDegradation::new();
    degradation.register_fallback("weather", || Ok(1), || false);
    assert!(degradation.has_fallback("weather"));
    assert!(!degradation.has_fallback("news"));
    let err = degradation
        .execute("news", || Err(ApplicationError::network("down")))
        .unwrap_err();
    assert_eq!(err.error_code(), "NetworkError");
}

#[test]
fn test_pipeline_behind_degradation() {
    let breaker = Arc::new(CircuitBreaker::new("geo", CircuitBreakerConfig::new(1, Duration::from_secs(60))));
    let pipeline = ResiliencePipeline::standard(
        "geocode",
        TimeoutManager::new(Duration::from_millis(200)),
        RetryWithBackoff::new("geocode", RetryPolicy::new(2, Duration::from_millis(1)).without_jitter()),
        breaker.clone(),
    );

    let degradation = GracefulDegradation::new();
    degradation.register_fallback("geocode", || Ok((0.0, 0.0)), || false);

    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let coordinates = degradation
        .execute("geocode", || {
            pipeline.execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(f64, f64), _>(ApplicationError::timeout("geocode", Duration::from_millis(200)))
            })
        })
        .unwrap();

    assert_eq!(coordinates, (0.0, 0.0));
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert!(breaker.is_open());
}
