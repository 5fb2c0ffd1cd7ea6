//! The dependency container.
//!
//! A [`DependencyContainer`] maps interface identities to registrations and
//! builds instances on demand according to their [`ServiceLifetime`].
//! Registration methods take `&self` and may be called at any time; each one
//! replaces any previous registration of the same interface. Resolution only
//! holds the registration read lock long enough to clone the registration,
//! so resolving different interfaces never contends on construction.

pub mod context;
pub mod scope;

pub use context::ResolverContext;
pub use scope::Scope;

pub(crate) use context::ChainResolver;

use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};

use crate::error::{AppResult, ApplicationError};
use crate::internal::{BoxFutureUnit, CellId, DisposeBag, InFlight, ResolutionStack};
use crate::key::{key_of, Key};
use crate::lifetime::ServiceLifetime;
use crate::observer::{ContainerObserver, Observers, TracingObserver};
use crate::registration::{AnyArc, Ctor, Registration, RegistrationKind, Registry, ServiceDescriptor};
use crate::traits::{Implements, ResolverCore};

/// Registers services and resolves them by interface.
///
/// Cloning is cheap and yields a handle to the same container.
///
/// # Examples
///
/// ```
/// use ferrous_bulwark::{DependencyContainer, Resolver, ServiceLifetime};
/// use std::sync::Arc;
///
/// struct Settings { url: String }
/// struct Repository { settings: Arc<Settings> }
///
/// let container = DependencyContainer::new();
/// container
///     .register_instance::<Settings>(Arc::new(Settings { url: "mem://".into() }))
///     .register_factory::<Repository, _>(
///         |ctx| Ok(Arc::new(Repository { settings: ctx.resolve::<Settings>()? })),
///         ServiceLifetime::Transient,
///     );
///
/// let a = container.resolve::<Repository>().unwrap();
/// let b = container.resolve::<Repository>().unwrap();
/// assert!(!Arc::ptr_eq(&a, &b));
/// assert!(Arc::ptr_eq(&a.settings, &b.settings));
/// assert_eq!(a.settings.url, "mem://");
/// ```
#[derive(Clone, Default)]
pub struct DependencyContainer {
    inner: Arc<ContainerInner>,
}

#[derive(Default)]
pub(crate) struct ContainerInner {
    registry: RwLock<Registry>,
    disposers: Mutex<DisposeBag>,
    observers: Observers,
    in_flight: InFlight,
}

/// Creates the application's root container with resolution tracing enabled.
///
/// Call once at startup and pass the container (or clones of it) to the
/// code that needs it.
pub fn default_container() -> DependencyContainer {
    DependencyContainer::with_tracing()
}

impl DependencyContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a container that reports resolutions through [`TracingObserver`].
    pub fn with_tracing() -> Self {
        let container = Self::new();
        container.add_observer(Arc::new(TracingObserver));
        container
    }

    /// Registers `T` as the singleton implementation of `I`.
    ///
    /// The instance is built on first resolution and shared afterwards.
    pub fn register_singleton<I, T>(&self) -> &Self
    where
        I: ?Sized + Send + Sync + 'static,
        T: Implements<I>,
    {
        self.register_type::<I, T>(ServiceLifetime::Singleton)
    }

    /// Registers `T` as the transient implementation of `I`.
    pub fn register_transient<I, T>(&self) -> &Self
    where
        I: ?Sized + Send + Sync + 'static,
        T: Implements<I>,
    {
        self.register_type::<I, T>(ServiceLifetime::Transient)
    }

    /// Registers `T` as the scoped implementation of `I`.
    pub fn register_scoped<I, T>(&self) -> &Self
    where
        I: ?Sized + Send + Sync + 'static,
        T: Implements<I>,
    {
        self.register_type::<I, T>(ServiceLifetime::Scoped)
    }

    /// Registers `T` as the implementation of `I` with the given lifetime.
    pub fn register_type<I, T>(&self, lifetime: ServiceLifetime) -> &Self
    where
        I: ?Sized + Send + Sync + 'static,
        T: Implements<I>,
    {
        let ctor: Ctor = Arc::new(|ctx: &ResolverContext<'_>| {
            let value = T::inject(ctx)?;
            let service: Arc<I> = <T as Implements<I>>::upcast(Arc::new(value));
            Ok(Arc::new(service) as AnyArc)
        });
        self.insert(Registration::new(
            key_of::<I>(),
            lifetime,
            RegistrationKind::Type,
            std::any::type_name::<T>(),
            ctor,
        ))
    }

    /// Registers a factory for `I`.
    ///
    /// The factory receives a [`ResolverContext`] for resolving its own
    /// dependencies. A failing singleton factory caches nothing, so the next
    /// resolution runs it again.
    pub fn register_factory<I, F>(&self, factory: F, lifetime: ServiceLifetime) -> &Self
    where
        I: ?Sized + Send + Sync + 'static,
        F: Fn(&ResolverContext<'_>) -> AppResult<Arc<I>> + Send + Sync + 'static,
    {
        let ctor: Ctor = Arc::new(move |ctx: &ResolverContext<'_>| {
            factory(ctx).map(|service| Arc::new(service) as AnyArc)
        });
        self.insert(Registration::new(
            key_of::<I>(),
            lifetime,
            RegistrationKind::Factory,
            std::any::type_name::<F>(),
            ctor,
        ))
    }

    /// Registers an already-built instance as the singleton for `I`.
    pub fn register_instance<I>(&self, instance: Arc<I>) -> &Self
    where
        I: ?Sized + Send + Sync + 'static,
    {
        self.insert(Registration::instance(
            key_of::<I>(),
            std::any::type_name::<I>(),
            Arc::new(instance) as AnyArc,
        ))
    }

    /// Removes the registration for `I`. Returns whether one existed.
    pub fn unregister<I>(&self) -> bool
    where
        I: ?Sized + 'static,
    {
        self.inner.registry.write().remove(&key_of::<I>()).is_some()
    }

    /// Removes every registration and cached singleton.
    ///
    /// Disposal hooks already collected are kept until [`dispose`](Self::dispose).
    pub fn clear(&self) {
        let mut registry = self.inner.registry.write();
        let removed = registry.len();
        registry.clear();
        tracing::debug!(removed, "container cleared");
    }

    pub fn len(&self) -> usize {
        self.inner.registry.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All registrations, sorted by service name.
    pub fn registered_services(&self) -> Vec<ServiceDescriptor> {
        self.inner.registry.read().descriptors()
    }

    pub fn registration_info<I>(&self) -> Option<ServiceDescriptor>
    where
        I: ?Sized + 'static,
    {
        self.inner
            .registry
            .read()
            .get(&key_of::<I>())
            .map(|registration| registration.descriptor())
    }

    pub fn create_scope(&self) -> Scope {
        Scope::new(self.clone())
    }

    pub fn add_observer(&self, observer: Arc<dyn ContainerObserver>) {
        self.inner.observers.add(observer);
    }

    /// Runs the synchronous disposal hooks of singletons in LIFO order.
    ///
    /// Returns the number of hooks run. Async hooks are left for
    /// [`dispose_async`](Self::dispose_async).
    pub fn dispose(&self) -> usize {
        let mut hooks = self.inner.disposers.lock().take_sync();
        hooks.run_sync_reverse()
    }

    /// Runs async hooks first, then sync hooks, each in LIFO order.
    pub async fn dispose_async(&self) -> usize {
        let mut bag = self.inner.disposers.lock().take();
        let ran = bag.run_async_reverse().await;
        ran + bag.run_sync_reverse()
    }

    pub(crate) fn inner(&self) -> &ContainerInner {
        &self.inner
    }

    fn insert(&self, registration: Registration) -> &Self {
        let service = registration.key.display_name();
        let lifetime = registration.lifetime;
        let replaced = self.inner.registry.write().insert(registration).is_some();
        tracing::debug!(service, lifetime = %lifetime, replaced, "service registered");
        self
    }
}

impl ContainerInner {
    pub(crate) fn registration(&self, key: &Key) -> AppResult<Arc<Registration>> {
        self.registry
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| ApplicationError::service_not_registered(key.display_name()))
    }

    /// Runs `resolve` and reports it to observers.
    pub(crate) fn observe<F>(&self, key: &Key, resolve: F) -> AppResult<AnyArc>
    where
        F: FnOnce() -> AppResult<(AnyArc, ServiceLifetime)>,
    {
        let Some(observers) = self.observers.snapshot() else {
            return resolve().map(|(value, _)| value);
        };

        for observer in &observers {
            observer.resolving(key);
        }
        let started = Instant::now();
        match resolve() {
            Ok((value, lifetime)) => {
                let elapsed = started.elapsed();
                for observer in &observers {
                    observer.resolved(key, lifetime, elapsed);
                }
                Ok(value)
            }
            Err(err) => {
                for observer in &observers {
                    observer.resolution_failed(key, &err);
                }
                Err(err)
            }
        }
    }

    /// Returns the cached singleton or builds it exactly once.
    ///
    /// Concurrent callers block on the registration's cell while one of them
    /// constructs. A failed construction leaves the cell empty.
    pub(crate) fn singleton(&self, registration: &Registration, stack: &ResolutionStack) -> AppResult<AnyArc> {
        let cell = &registration.singleton;
        if let Some(value) = cell.get() {
            return Ok(value.clone());
        }
        self.init_cell(cell, registration.key, stack, || {
            (registration.ctor)(&ResolverContext::new(self, stack))
        })
    }

    /// Initialises a singleton or scoped cell, failing instead of blocking
    /// when the wait would close a loop of threads building each other's
    /// dependencies.
    pub(crate) fn init_cell<F>(
        &self,
        cell: &OnceCell<AnyArc>,
        key: Key,
        stack: &ResolutionStack,
        build: F,
    ) -> AppResult<AnyArc>
    where
        F: FnOnce() -> AppResult<AnyArc>,
    {
        // Entering the stack first turns re-entrant initialisation into a
        // circular dependency error instead of a deadlock on the cell.
        let _guard = stack.enter(key)?;
        let id = CellId::of(cell, key);
        let _waiting = self.in_flight.wait_for(id, stack)?;
        cell.get_or_try_init(|| {
            let _owner = self.in_flight.own(id);
            build()
        })
        .cloned()
    }

    pub(crate) fn construct(
        resolver: &dyn ChainResolver,
        registration: &Registration,
        stack: &ResolutionStack,
    ) -> AppResult<AnyArc> {
        let _guard = stack.enter(registration.key)?;
        (registration.ctor)(&ResolverContext::new(resolver, stack))
    }
}

impl ChainResolver for ContainerInner {
    fn resolve_in(&self, key: &Key, stack: &ResolutionStack) -> AppResult<AnyArc> {
        self.observe(key, || {
            let registration = self.registration(key)?;
            let value = match registration.lifetime {
                ServiceLifetime::Singleton => self.singleton(&registration, stack)?,
                ServiceLifetime::Transient => Self::construct(self, &registration, stack)?,
                ServiceLifetime::Scoped => {
                    return Err(ApplicationError::resolution_failed(
                        key.display_name(),
                        "scoped services must be resolved from a scope created with create_scope()",
                    ))
                }
            };
            Ok((value, registration.lifetime))
        })
    }

    fn has_registration(&self, key: &Key) -> bool {
        self.registry.read().contains(key)
    }

    fn add_sync_disposer(&self, f: Box<dyn FnOnce() + Send>) {
        self.disposers.lock().push_sync(f);
    }

    fn add_async_disposer(&self, f: Box<dyn FnOnce() -> BoxFutureUnit + Send>) {
        self.disposers.lock().push_async(f);
    }
}

impl ResolverCore for DependencyContainer {
    fn resolve_any(&self, key: &Key) -> AppResult<Arc<dyn Any + Send + Sync>> {
        let stack = ResolutionStack::new();
        self.inner.resolve_in(key, &stack)
    }

    fn contains_key(&self, key: &Key) -> bool {
        self.inner.has_registration(key)
    }

    fn push_sync_disposer(&self, f: Box<dyn FnOnce() + Send>) {
        self.inner.add_sync_disposer(f);
    }

    fn push_async_disposer(
        &self,
        f: Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>,
    ) {
        self.inner.add_async_disposer(f);
    }
}

impl Drop for ContainerInner {
    fn drop(&mut self) {
        let pending = self.disposers.get_mut().len();
        if pending > 0 {
            tracing::warn!(pending, "container dropped with undisposed services; call dispose() first");
        }
    }
}

impl std::fmt::Debug for DependencyContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyContainer")
            .field("services", &self.len())
            .finish()
    }
}
