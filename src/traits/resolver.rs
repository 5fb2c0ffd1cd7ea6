//! Resolver traits for service resolution.

use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::{AppResult, ApplicationError};
use crate::key::{key_of, Key};
use crate::traits::{AsyncDispose, Dispose};

/// Object-safe core of every resolver.
///
/// Implemented by [`DependencyContainer`](crate::DependencyContainer),
/// [`Scope`](crate::Scope) and [`ResolverContext`](crate::ResolverContext).
/// Most callers use the generic methods of [`Resolver`] instead.
pub trait ResolverCore {
    /// Resolves the type-erased service registered under `key`.
    ///
    /// The returned value always holds an `Arc<I>` for the interface `I`
    /// that `key` identifies.
    fn resolve_any(&self, key: &Key) -> AppResult<Arc<dyn Any + Send + Sync>>;

    /// Whether a registration exists for `key`. Never constructs anything.
    fn contains_key(&self, key: &Key) -> bool;

    /// Registers a synchronous disposal hook with the owning container or scope.
    fn push_sync_disposer(&self, f: Box<dyn FnOnce() + Send>);

    /// Registers an asynchronous disposal hook with the owning container or scope.
    fn push_async_disposer(
        &self,
        f: Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>,
    );
}

/// Typed resolution on top of [`ResolverCore`].
///
/// # Examples
///
/// ```
/// use ferrous_bulwark::{DependencyContainer, Resolver};
/// use std::sync::Arc;
///
/// trait Greeter: Send + Sync {
///     fn greet(&self) -> String;
/// }
///
/// struct English;
/// impl Greeter for English {
///     fn greet(&self) -> String { "hello".into() }
/// }
///
/// let container = DependencyContainer::new();
/// container.register_instance::<dyn Greeter>(Arc::new(English));
///
/// assert!(container.is_registered::<dyn Greeter>());
/// let greeter = container.resolve::<dyn Greeter>().unwrap();
/// assert_eq!(greeter.greet(), "hello");
/// assert!(container.try_resolve::<String>().unwrap().is_none());
/// ```
pub trait Resolver: ResolverCore {
    /// Resolves the service registered for interface `I`.
    ///
    /// Fails with a `ServiceResolutionError` when `I` is not registered and
    /// with a `CircularDependencyError` when `I` is already being
    /// constructed further up the same resolution chain.
    fn resolve<I>(&self) -> AppResult<Arc<I>>
    where
        I: ?Sized + Send + Sync + 'static,
    {
        let key = key_of::<I>();
        let any = self.resolve_any(&key)?;
        any.downcast::<Arc<I>>()
            .map(|boxed| (*boxed).clone())
            .map_err(|_| ApplicationError::resolution_failed(key.display_name(), "stored instance has a different type"))
    }

    /// Like [`resolve`](Self::resolve) but returns `Ok(None)` when `I` is
    /// not registered. Construction failures still propagate.
    fn try_resolve<I>(&self) -> AppResult<Option<Arc<I>>>
    where
        I: ?Sized + Send + Sync + 'static,
    {
        if self.contains_key(&key_of::<I>()) {
            self.resolve::<I>().map(Some)
        } else {
            Ok(None)
        }
    }

    fn is_registered<I>(&self) -> bool
    where
        I: ?Sized + 'static,
    {
        self.contains_key(&key_of::<I>())
    }

    /// Runs `service.dispose()` when the owning container or scope is disposed.
    fn register_disposer<T>(&self, service: Arc<T>)
    where
        T: Dispose,
    {
        self.push_sync_disposer(Box::new(move || service.dispose()));
    }

    /// Runs `service.dispose().await` when the owner is disposed asynchronously.
    fn register_async_disposer<T>(&self, service: Arc<T>)
    where
        T: AsyncDispose,
    {
        self.push_async_disposer(Box::new(move || {
            Box::pin(async move { service.dispose().await })
                as Pin<Box<dyn Future<Output = ()> + Send>>
        }));
    }
}

impl<R: ResolverCore + ?Sized> Resolver for R {}
