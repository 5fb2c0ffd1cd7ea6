//! Observation hooks for container resolution events.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::error::ApplicationError;
use crate::key::Key;
use crate::lifetime::ServiceLifetime;

/// Receives resolution events from a [`DependencyContainer`](crate::DependencyContainer).
///
/// Calls are made synchronously on the resolving thread, so implementations
/// should be cheap. Nested resolutions made by factories are reported too.
///
/// # Examples
///
/// ```
/// use ferrous_bulwark::{ContainerObserver, DependencyContainer, Key, Resolver, ServiceLifetime};
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::time::Duration;
///
/// #[derive(Default)]
/// struct Counter(AtomicUsize);
///
/// impl ContainerObserver for Counter {
///     fn resolving(&self, _key: &Key) {}
///     fn resolved(&self, _key: &Key, _lifetime: ServiceLifetime, _elapsed: Duration) {
///         self.0.fetch_add(1, Ordering::SeqCst);
///     }
/// }
///
/// let counter = Arc::new(Counter::default());
/// let container = DependencyContainer::new();
/// container.add_observer(counter.clone());
/// container.register_instance::<u32>(Arc::new(7));
///
/// container.resolve::<u32>().unwrap();
/// assert_eq!(counter.0.load(Ordering::SeqCst), 1);
/// ```
pub trait ContainerObserver: Send + Sync {
    /// Called before a service is looked up.
    fn resolving(&self, key: &Key);

    /// Called after a service was resolved. `elapsed` includes construction.
    fn resolved(&self, key: &Key, lifetime: ServiceLifetime, elapsed: Duration);

    /// Called when resolution fails for any reason.
    fn resolution_failed(&self, key: &Key, error: &ApplicationError) {
        let _ = (key, error);
    }
}

/// Emits resolution events as `tracing` events.
///
/// Successful resolutions are logged at `TRACE`, failures at `WARN`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ContainerObserver for TracingObserver {
    fn resolving(&self, key: &Key) {
        tracing::trace!(service = key.display_name(), "resolving service");
    }

    fn resolved(&self, key: &Key, lifetime: ServiceLifetime, elapsed: Duration) {
        tracing::trace!(
            service = key.display_name(),
            lifetime = %lifetime,
            elapsed_us = elapsed.as_micros() as u64,
            "service resolved"
        );
    }

    fn resolution_failed(&self, key: &Key, error: &ApplicationError) {
        tracing::warn!(
            service = key.display_name(),
            error_code = error.error_code(),
            correlation_id = error.correlation_id(),
            "service resolution failed: {}",
            error
        );
    }
}

/// Registered observers of one container.
#[derive(Default)]
pub(crate) struct Observers {
    observers: RwLock<Vec<Arc<dyn ContainerObserver>>>,
}

impl Observers {
    pub(crate) fn add(&self, observer: Arc<dyn ContainerObserver>) {
        self.observers.write().push(observer);
    }

    /// Snapshot of the current observers, `None` when there are none.
    #[inline]
    pub(crate) fn snapshot(&self) -> Option<Vec<Arc<dyn ContainerObserver>>> {
        let observers = self.observers.read();
        if observers.is_empty() {
            None
        } else {
            Some(observers.clone())
        }
    }
}
