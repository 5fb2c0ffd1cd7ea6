//! Resolver handed to factories and `Injectable::inject`.

use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::AppResult;
use crate::internal::{BoxFutureUnit, ResolutionStack};
use crate::key::Key;
use crate::registration::AnyArc;
use crate::traits::ResolverCore;

/// Resolution within an in-flight resolution chain.
pub(crate) trait ChainResolver: Send + Sync {
    fn resolve_in(&self, key: &Key, stack: &ResolutionStack) -> AppResult<AnyArc>;
    fn has_registration(&self, key: &Key) -> bool;
    fn add_sync_disposer(&self, f: Box<dyn FnOnce() + Send>);
    fn add_async_disposer(&self, f: Box<dyn FnOnce() -> BoxFutureUnit + Send>);
}

/// Resolver passed to factories while a service is being constructed.
///
/// Dependencies resolved through the context join the current resolution
/// chain, which is how cycles such as `A -> B -> A` are detected. Singleton
/// factories receive a context bound to the root container, so they cannot
/// capture scoped services. Scoped and transient factories resolved from a
/// [`Scope`](crate::Scope) receive a context bound to that scope.
pub struct ResolverContext<'a> {
    resolver: &'a dyn ChainResolver,
    stack: &'a ResolutionStack,
}

impl<'a> ResolverContext<'a> {
    pub(crate) fn new(resolver: &'a dyn ChainResolver, stack: &'a ResolutionStack) -> Self {
        Self { resolver, stack }
    }
}

impl ResolverCore for ResolverContext<'_> {
    fn resolve_any(&self, key: &Key) -> AppResult<Arc<dyn Any + Send + Sync>> {
        self.resolver.resolve_in(key, self.stack)
    }

    fn contains_key(&self, key: &Key) -> bool {
        self.resolver.has_registration(key)
    }

    fn push_sync_disposer(&self, f: Box<dyn FnOnce() + Send>) {
        self.resolver.add_sync_disposer(f);
    }

    fn push_async_disposer(
        &self,
        f: Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>,
    ) {
        self.resolver.add_async_disposer(f);
    }
}
