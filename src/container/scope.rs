//! Caller-managed resolution scopes.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use uuid::Uuid;

use super::{ChainResolver, ContainerInner, DependencyContainer, ResolverContext};
use crate::error::{AppResult, ApplicationError};
use crate::internal::{BoxFutureUnit, DisposeBag, ResolutionStack};
use crate::key::Key;
use crate::lifetime::ServiceLifetime;
use crate::registration::{AnyArc, Registration};
use crate::traits::ResolverCore;

/// A unit of work with its own instances of scoped services.
///
/// Within one scope a scoped service is built once and shared; a new scope
/// builds a new instance. Singletons still come from the root container and
/// transients are always fresh. The scope is an ordinary value owned by the
/// caller: nothing is attached to the current thread.
///
/// Disposal hooks registered by scoped and transient factories run when the
/// scope is disposed, explicitly or on drop. A disposed scope refuses
/// further resolution.
///
/// # Examples
///
/// ```
/// use ferrous_bulwark::{DependencyContainer, Resolver, ServiceLifetime};
/// use std::sync::Arc;
///
/// struct UnitOfWork;
///
/// let container = DependencyContainer::new();
/// container.register_factory::<UnitOfWork, _>(|_| Ok(Arc::new(UnitOfWork)), ServiceLifetime::Scoped);
///
/// let outcome = container.create_scope().using(|scope| {
///     let a = scope.resolve::<UnitOfWork>()?;
///     let b = scope.resolve::<UnitOfWork>()?;
///     Ok::<_, ferrous_bulwark::ApplicationError>(Arc::ptr_eq(&a, &b))
/// });
/// assert!(outcome.unwrap());
/// ```
pub struct Scope {
    id: Uuid,
    root: DependencyContainer,
    cells: Mutex<HashMap<Key, Arc<OnceCell<AnyArc>>>>,
    disposers: Mutex<DisposeBag>,
    disposed: AtomicBool,
}

impl Scope {
    pub(crate) fn new(root: DependencyContainer) -> Self {
        let id = Uuid::new_v4();
        tracing::trace!(scope_id = %id, "scope created");
        Self {
            id,
            root,
            cells: Mutex::new(HashMap::new()),
            disposers: Mutex::new(DisposeBag::default()),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The container this scope was created from.
    pub fn container(&self) -> &DependencyContainer {
        &self.root
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Runs `f` with this scope and disposes the scope afterwards.
    pub fn using<R>(self, f: impl FnOnce(&Scope) -> R) -> R {
        let result = f(&self);
        self.dispose();
        result
    }

    /// Ends the scope: runs sync disposal hooks in LIFO order and drops the
    /// cached scoped instances. Returns the number of hooks run.
    ///
    /// Calling it again is a no-op.
    pub fn dispose(&self) -> usize {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return 0;
        }
        let mut hooks = self.disposers.lock().take_sync();
        let ran = hooks.run_sync_reverse();
        self.cells.lock().clear();
        tracing::trace!(scope_id = %self.id, hooks = ran, "scope disposed");
        ran
    }

    /// Like [`dispose`](Self::dispose), running async hooks before sync hooks.
    pub async fn dispose_async(&self) -> usize {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return 0;
        }
        let mut hooks = self.disposers.lock().take();
        let ran = hooks.run_async_reverse().await + hooks.run_sync_reverse();
        self.cells.lock().clear();
        ran
    }

    fn root_inner(&self) -> &ContainerInner {
        self.root.inner()
    }

    fn scoped(
        &self,
        key: &Key,
        registration: &Registration,
        stack: &ResolutionStack,
    ) -> AppResult<AnyArc> {
        let cell = self
            .cells
            .lock()
            .entry(*key)
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        if let Some(value) = cell.get() {
            return Ok(value.clone());
        }
        self.root_inner().init_cell(&cell, *key, stack, || {
            (registration.ctor)(&ResolverContext::new(self, stack))
        })
    }
}

impl ChainResolver for Scope {
    fn resolve_in(&self, key: &Key, stack: &ResolutionStack) -> AppResult<AnyArc> {
        let root = self.root_inner();
        root.observe(key, || {
            if self.is_disposed() {
                return Err(ApplicationError::resolution_failed(
                    key.display_name(),
                    "the scope has already been disposed",
                ));
            }
            let registration = root.registration(key)?;
            let value = match registration.lifetime {
                ServiceLifetime::Singleton => root.singleton(&registration, stack)?,
                ServiceLifetime::Transient => ContainerInner::construct(self, &registration, stack)?,
                ServiceLifetime::Scoped => self.scoped(key, &registration, stack)?,
            };
            Ok((value, registration.lifetime))
        })
    }

    fn has_registration(&self, key: &Key) -> bool {
        self.root_inner().has_registration(key)
    }

    fn add_sync_disposer(&self, f: Box<dyn FnOnce() + Send>) {
        self.disposers.lock().push_sync(f);
    }

    fn add_async_disposer(&self, f: Box<dyn FnOnce() -> BoxFutureUnit + Send>) {
        self.disposers.lock().push_async(f);
    }
}

impl ResolverCore for Scope {
    fn resolve_any(&self, key: &Key) -> AppResult<Arc<dyn Any + Send + Sync>> {
        let stack = ResolutionStack::new();
        self.resolve_in(key, &stack)
    }

    fn contains_key(&self, key: &Key) -> bool {
        self.has_registration(key)
    }

    fn push_sync_disposer(&self, f: Box<dyn FnOnce() + Send>) {
        self.add_sync_disposer(f);
    }

    fn push_async_disposer(
        &self,
        f: Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>,
    ) {
        self.add_async_disposer(f);
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        if self.is_disposed() {
            return;
        }
        self.dispose();
        let pending = self.disposers.get_mut().len();
        if pending > 0 {
            tracing::warn!(
                scope_id = %self.id,
                pending,
                "scope dropped with async disposal hooks pending; call dispose_async() first"
            );
        }
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.id)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
