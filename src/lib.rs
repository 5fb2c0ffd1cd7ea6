//! # ferrous-bulwark
//!
//! Dependency injection, reliability primitives and structured error
//! handling for service-oriented applications.
//!
//! ## Features
//!
//! - **Dependency container**: singleton, scoped and transient lifetimes,
//!   trait-object interfaces, constructor injection and cycle detection
//! - **Error taxonomy**: one [`ApplicationError`] type with severity,
//!   category, correlation id, context and a safe end-user message
//! - **Reliability**: circuit breaker, retry with backoff and jitter,
//!   timeouts, health checks and graceful degradation
//! - **Error handling**: handlers with fallbacks, error boundaries,
//!   aggregation for batches and per-category recovery
//! - **Service registry**: production, development and testing wiring of
//!   configuration, logging, cache and storage services
//!
//! ## Quick Start
//!
//! ```rust
//! use ferrous_bulwark::{bootstrap, CacheService, Environment, RegistrySettings};
//! use serde_json::json;
//!
//! let registry = bootstrap(Environment::Testing, &RegistrySettings::default()).unwrap();
//!
//! let cache = registry.require::<dyn CacheService>().unwrap();
//! cache.set("forecast:oslo", json!({"temp": -3}), None).unwrap();
//! assert!(cache.exists("forecast:oslo").unwrap());
//! ```
//!
//! ## Service Lifetimes
//!
//! - **Singleton**: created once and shared by the whole container
//! - **Scoped**: created once per [`Scope`]
//! - **Transient**: created on every resolution
//!
//! ## Trait Resolution
//!
//! ```rust
//! use ferrous_bulwark::{
//!     implements, AppResult, DependencyContainer, Injectable, Resolver, ResolverContext,
//! };
//!
//! trait Notifier: Send + Sync {
//!     fn notify(&self, message: &str) -> String;
//! }
//!
//! struct ConsoleNotifier;
//! impl Notifier for ConsoleNotifier {
//!     fn notify(&self, message: &str) -> String {
//!         format!("[notify] {message}")
//!     }
//! }
//! impl Injectable for ConsoleNotifier {
//!     fn inject(_: &ResolverContext<'_>) -> AppResult<Self> {
//!         Ok(ConsoleNotifier)
//!     }
//! }
//! implements!(ConsoleNotifier => dyn Notifier);
//!
//! let container = DependencyContainer::new();
//! container.register_singleton::<dyn Notifier, ConsoleNotifier>();
//!
//! let notifier = container.resolve::<dyn Notifier>().unwrap();
//! assert_eq!(notifier.notify("deployed"), "[notify] deployed");
//! ```
//!
//! ## Resilient Calls
//!
//! ```rust
//! use ferrous_bulwark::{ApplicationError, CircuitBreaker, CircuitBreakerConfig, CircuitState};
//! use std::time::Duration;
//!
//! let breaker = CircuitBreaker::new("payments", CircuitBreakerConfig::new(2, Duration::from_secs(30)));
//! for _ in 0..2 {
//!     let _ = breaker.call(|| Err::<(), _>(ApplicationError::network("connection reset")));
//! }
//! assert_eq!(breaker.state(), CircuitState::Open);
//! assert!(breaker.call(|| Ok::<_, ApplicationError>(())).unwrap_err().is_circuit_open());
//! ```
//!
//! ## Feature Flags
//!
//! - `async`: `tokio`-based `execute_async` on [`RetryWithBackoff`] and
//!   [`TimeoutManager`]

pub mod cancellation;
pub mod container;
pub mod error;
pub mod handling;
pub mod key;
pub mod lifetime;
pub mod logging;
pub mod observer;
pub mod registry;
pub mod reliability;
pub mod services;
pub mod traits;

mod internal;
mod registration;

pub use cancellation::{CancellationError, CancellationToken};
pub use container::{default_container, DependencyContainer, ResolverContext, Scope};
pub use error::{AppResult, ApplicationError, ErrorCategory, ErrorKind, ErrorReport, ErrorSeverity};
pub use handling::{
    error_boundary, handle_errors, log_error, safe_execute, BoundaryOutcome, ErrorAggregator, ErrorHandler,
    ErrorRecovery, ErrorSummary, Layer, ResiliencePipeline,
};
pub use key::{key_of, Key};
pub use lifetime::ServiceLifetime;
pub use logging::{init_logging, LoggingConfig};
pub use observer::{ContainerObserver, TracingObserver};
pub use registration::{RegistrationKind, ServiceDescriptor};
pub use registry::{bootstrap, ConfigurationReport, Environment, RegistrySettings, ServiceInfo, ServiceRegistry};
pub use reliability::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState, GracefulDegradation, HealthCheck,
    HealthCheckConfig, HealthMonitor, HealthReport, HealthStatus, ResilienceConfig, RetryPolicy, RetryWithBackoff,
    StateTransition, TimeoutConfig, TimeoutManager,
};
pub use services::{
    CacheService, CacheSettings, ConfigurationService, EnvConfigurationService, InMemoryStore, KeyValueStore, LogLevel,
    LogRecord, LoggingService, MemoryCacheService, MockCacheService, MockConfigurationService, MockLoggingService,
    MockStore, ResilientStore, TracingLoggingService,
};
pub use traits::{AsyncDispose, Dispose, Implements, Injectable, Resolver, ResolverCore};
