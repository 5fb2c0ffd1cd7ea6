//! Reliability primitives.
//!
//! Four independent units, each usable on its own or stacked through
//! [`ResiliencePipeline`](crate::ResiliencePipeline):
//!
//! - [`CircuitBreaker`] stops calling a dependency that keeps failing
//! - [`RetryWithBackoff`] re-runs failed attempts with exponential delays
//! - [`TimeoutManager`] bounds how long the caller waits
//! - [`HealthCheck`] probes a dependency on demand
//!
//! [`GracefulDegradation`] picks a fallback when a primary is unavailable.
//! No state is shared between instances; use one breaker per dependency.

mod circuit_breaker;
mod degradation;
mod health;
mod retry;
mod timeout;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState, StateTransition,
};
pub use degradation::GracefulDegradation;
pub use health::{HealthCheck, HealthCheckConfig, HealthMonitor, HealthReport, HealthStatus};
pub use retry::{RetryPolicy, RetryWithBackoff};
pub use timeout::{TimeoutConfig, TimeoutManager};

use serde::{Deserialize, Serialize};

use crate::error::AppResult;

/// Settings for one protected dependency, loadable from JSON.
///
/// ```
/// use ferrous_bulwark::ResilienceConfig;
/// use std::time::Duration;
///
/// let config = ResilienceConfig::from_json(r#"{
///     "circuit_breaker": { "failure_threshold": 3, "recovery_timeout": "30s" },
///     "retry": { "max_attempts": 4, "base_delay": "200ms" },
///     "timeout": { "default_timeout": "5s" }
/// }"#).unwrap();
///
/// assert_eq!(config.circuit_breaker.failure_threshold, 3);
/// assert_eq!(config.retry.base_delay, Duration::from_millis(200));
/// assert_eq!(config.timeout.default_timeout, Duration::from_secs(5));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub circuit_breaker: CircuitBreakerConfig,
    pub retry: RetryPolicy,
    pub timeout: TimeoutConfig,
}

impl ResilienceConfig {
    /// Parses and validates a JSON document.
    pub fn from_json(json: &str) -> AppResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        self.circuit_breaker.validate()?;
        self.retry.validate()?;
        self.timeout.validate()
    }
}
