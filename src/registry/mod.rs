//! Environment-specific service wiring.
//!
//! The registry is the only place that names concrete implementations.
//! Application code resolves the interfaces from [`crate::services`] and
//! stays unaware of which environment bound them.

mod settings;

pub use settings::{Environment, RegistrySettings, ENVIRONMENT_VAR};

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use crate::container::{default_container, DependencyContainer, ResolverContext};
use crate::error::{AppResult, ApplicationError};
use crate::key::{key_of, Key};
use crate::lifetime::ServiceLifetime;
use crate::logging::init_logging;
use crate::reliability::{CircuitBreaker, RetryWithBackoff};
use crate::registration::ServiceDescriptor;
use crate::services::{
    CacheService, ConfigurationService, EnvConfigurationService, InMemoryStore, KeyValueStore,
    LoggingService, MemoryCacheService, MockCacheService, MockConfigurationService,
    MockLoggingService, MockStore, ResilientStore, TracingLoggingService,
};
use crate::traits::{Implements, Resolver, ResolverCore};

/// Outcome of [`ServiceRegistry::validate_configuration`].
#[derive(Debug, Clone, Serialize)]
pub struct ConfigurationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    /// Short names of every registered service, sorted
    pub registered_services: Vec<String>,
    pub environment: Option<Environment>,
}

/// Snapshot returned by [`ServiceRegistry::service_info`].
#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    pub environment: Option<Environment>,
    pub is_configured: bool,
    pub total_services: usize,
    pub services: Vec<ServiceDescriptor>,
}

#[derive(Default)]
struct RegistryState {
    environment: Option<Environment>,
    expected: Vec<Key>,
}

/// Binds the application's service interfaces for one environment.
///
/// Every `configure_*` call clears the container and registers a complete
/// set of implementations, so switching environments never leaves stale
/// bindings behind.
///
/// # Examples
///
/// ```
/// use ferrous_bulwark::{CacheService, DependencyContainer, ServiceRegistry};
/// use serde_json::json;
///
/// let registry = ServiceRegistry::new(DependencyContainer::new());
/// registry.configure_for_testing().unwrap();
///
/// let report = registry.validate_configuration();
/// assert!(report.is_valid, "{:?}", report.errors);
///
/// let cache = registry.require::<dyn CacheService>().unwrap();
/// cache.set("greeting", json!("hello"), None).unwrap();
/// assert_eq!(cache.get("greeting").unwrap(), Some(json!("hello")));
/// ```
pub struct ServiceRegistry {
    container: DependencyContainer,
    state: RwLock<RegistryState>,
}

impl ServiceRegistry {
    pub fn new(container: DependencyContainer) -> Self {
        Self {
            container,
            state: RwLock::new(RegistryState::default()),
        }
    }

    pub fn container(&self) -> &DependencyContainer {
        &self.container
    }

    pub fn environment(&self) -> Option<Environment> {
        self.state.read().environment
    }

    pub fn is_configured(&self) -> bool {
        self.environment().is_some()
    }

    /// Configures for `environment`.
    pub fn configure(&self, environment: Environment, settings: &RegistrySettings) -> AppResult<()> {
        match environment {
            Environment::Production => self.configure_for_production(settings),
            Environment::Development => self.configure_for_development(settings),
            Environment::Testing => self.configure_for_testing(),
        }
    }

    /// Real implementations: environment-backed configuration, JSON logs
    /// through `tracing`, a 1000 entry cache with a one hour TTL and a store
    /// behind a circuit breaker and retries.
    pub fn configure_for_production(&self, settings: &RegistrySettings) -> AppResult<()> {
        self.configure_real(Environment::Production, settings, false)
    }

    /// Same implementations as production with verbose logging, a small
    /// short-lived cache and a more tolerant circuit breaker.
    pub fn configure_for_development(&self, settings: &RegistrySettings) -> AppResult<()> {
        self.configure_real(Environment::Development, settings, true)
    }

    /// Mock implementations only. The concrete mocks are registered as
    /// well, so tests can resolve e.g. [`MockLoggingService`] to inspect it.
    pub fn configure_for_testing(&self) -> AppResult<()> {
        self.container.clear();
        bind_mock::<dyn ConfigurationService, MockConfigurationService>(&self.container);
        bind_mock::<dyn LoggingService, MockLoggingService>(&self.container);
        bind_mock::<dyn CacheService, MockCacheService>(&self.container);
        bind_mock::<dyn KeyValueStore, MockStore>(&self.container);
        self.finish(Environment::Testing);
        Ok(())
    }

    fn configure_real(&self, environment: Environment, settings: &RegistrySettings, verbose: bool) -> AppResult<()> {
        settings.validate()?;
        let cache_settings = settings.cache_for(environment);
        let breaker_config = settings.circuit_breaker_for(environment);
        let retry_policy = settings.retry_for(environment);

        let config = settings
            .required_settings
            .iter()
            .fold(
                EnvConfigurationService::new(settings.config_prefix.clone())
                    .with_overrides(settings.settings.clone()),
                |config, key| config.require(key.clone()),
            );

        self.container.clear();
        self.container
            .register_instance::<dyn ConfigurationService>(Arc::new(config))
            .register_factory::<dyn LoggingService, _>(
                move |_| {
                    let logger: Arc<dyn LoggingService> =
                        Arc::new(TracingLoggingService::new(environment.as_str()).verbose(verbose));
                    Ok(logger)
                },
                ServiceLifetime::Singleton,
            )
            .register_factory::<dyn CacheService, _>(
                move |ctx| {
                    let cache: Arc<dyn CacheService> = Arc::new(
                        MemoryCacheService::new(cache_settings.clone())
                            .with_logger(ctx.resolve::<dyn LoggingService>()?),
                    );
                    Ok(cache)
                },
                ServiceLifetime::Singleton,
            )
            .register_singleton::<InMemoryStore, InMemoryStore>()
            .register_factory::<dyn KeyValueStore, _>(
                move |ctx| {
                    let backend: Arc<dyn KeyValueStore> = ctx.resolve::<InMemoryStore>()?;
                    let store: Arc<dyn KeyValueStore> = Arc::new(ResilientStore::new(
                        backend,
                        CircuitBreaker::new("key-value-store", breaker_config.clone()),
                        RetryWithBackoff::new("key-value-store", retry_policy.clone()).transient_only(),
                    ));
                    Ok(store)
                },
                ServiceLifetime::Singleton,
            );

        self.finish(environment);
        Ok(())
    }

    fn finish(&self, environment: Environment) {
        self.state.write().environment = Some(environment);
        tracing::info!(
            environment = %environment,
            services = self.container.len(),
            "services configured"
        );
    }

    /// Resolves `I`; fails if it is not registered or cannot be built.
    pub fn require<I>(&self) -> AppResult<Arc<I>>
    where
        I: ?Sized + Send + Sync + 'static,
    {
        self.container.resolve::<I>()
    }

    /// Adds `I` to the services checked by [`validate_configuration`](Self::validate_configuration).
    pub fn expect_service<I>(&self) -> &Self
    where
        I: ?Sized + 'static,
    {
        let key = key_of::<I>();
        let mut state = self.state.write();
        if !state.expected.contains(&key) {
            state.expected.push(key);
        }
        self
    }

    /// Registers an application-specific service next to the standard ones.
    pub fn register_custom_service<I, F>(&self, factory: F, lifetime: ServiceLifetime) -> &Self
    where
        I: ?Sized + Send + Sync + 'static,
        F: Fn(&ResolverContext<'_>) -> AppResult<Arc<I>> + Send + Sync + 'static,
    {
        self.container.register_factory::<I, F>(factory, lifetime);
        tracing::info!(
            service = %key_of::<I>().short_name(),
            lifetime = %lifetime,
            "custom service registered"
        );
        self
    }

    /// Checks that every expected interface is registered.
    ///
    /// Nothing is resolved, so validation has no side effects and cannot
    /// trigger construction failures.
    pub fn validate_configuration(&self) -> ConfigurationReport {
        let state = self.state.read();
        let mut errors = Vec::new();
        if state.environment.is_none() {
            errors.push("Services have not been configured".to_string());
        }

        let required = required_services();
        for key in required.iter().chain(state.expected.iter()) {
            if !self.container.contains_key(key) {
                errors.push(format!("{}: Service not registered", key.short_name()));
            }
        }

        let registered_services = self
            .container
            .registered_services()
            .into_iter()
            .map(|descriptor| descriptor.service)
            .collect();

        let report = ConfigurationReport {
            is_valid: errors.is_empty(),
            errors,
            registered_services,
            environment: state.environment,
        };
        if !report.is_valid {
            tracing::warn!(errors = ?report.errors, "service configuration is invalid");
        }
        report
    }

    pub fn service_info(&self) -> ServiceInfo {
        let services = self.container.registered_services();
        ServiceInfo {
            environment: self.environment(),
            is_configured: self.is_configured(),
            total_services: services.len(),
            services,
        }
    }

    /// Removes every registration and forgets the environment.
    pub fn reset_configuration(&self) {
        self.container.clear();
        self.state.write().environment = None;
        tracing::debug!("service configuration reset");
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("environment", &self.environment())
            .field("services", &self.container.len())
            .finish()
    }
}

fn required_services() -> [Key; 4] {
    [
        key_of::<dyn ConfigurationService>(),
        key_of::<dyn LoggingService>(),
        key_of::<dyn CacheService>(),
        key_of::<dyn KeyValueStore>(),
    ]
}

/// Registers `T` as a singleton under its own type and exposes the same
/// instance as `I`.
fn bind_mock<I, T>(container: &DependencyContainer)
where
    I: ?Sized + Send + Sync + 'static,
    T: Implements<T> + Implements<I>,
{
    container
        .register_singleton::<T, T>()
        .register_factory::<I, _>(
            |ctx| Ok(<T as Implements<I>>::upcast(ctx.resolve::<T>()?)),
            ServiceLifetime::Singleton,
        );
}

/// Builds the application's root container for `environment`.
///
/// Installs the global log subscriber when `settings.logging` is set, then
/// configures and validates the services. Meant to be called once at
/// startup; the returned registry owns the container that the rest of the
/// application is handed.
///
/// # Errors
///
/// A ConfigurationError when the settings are invalid or the resulting
/// configuration fails validation.
pub fn bootstrap(environment: Environment, settings: &RegistrySettings) -> AppResult<ServiceRegistry> {
    if let Some(logging) = &settings.logging {
        init_logging(logging)?;
    }

    let registry = ServiceRegistry::new(default_container());
    registry.configure(environment, settings)?;

    let report = registry.validate_configuration();
    if !report.is_valid {
        return Err(ApplicationError::configuration(
            "services",
            format!("Service configuration is invalid: {}", report.errors.join("; ")),
        )
        .with_context("errors", report.errors));
    }

    let config = registry.require::<dyn ConfigurationService>()?;
    config.validate()?;

    tracing::info!(environment = %environment, "application bootstrapped");
    Ok(registry)
}
