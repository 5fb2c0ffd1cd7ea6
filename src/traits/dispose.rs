//! Disposal traits for resource cleanup.

/// Synchronous teardown for services holding resources.
///
/// Hooks registered through
/// [`Resolver::register_disposer`](crate::Resolver::register_disposer) run in
/// LIFO order when the owning scope or container is disposed.
///
/// # Examples
///
/// ```
/// use ferrous_bulwark::{DependencyContainer, Dispose, Resolver, ServiceLifetime};
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicBool, Ordering};
///
/// struct Connection { closed: AtomicBool }
/// impl Dispose for Connection {
///     fn dispose(&self) { self.closed.store(true, Ordering::SeqCst); }
/// }
///
/// let container = DependencyContainer::new();
/// container.register_factory::<Connection, _>(|ctx| {
///     let conn = Arc::new(Connection { closed: AtomicBool::new(false) });
///     ctx.register_disposer(conn.clone());
///     Ok(conn)
/// }, ServiceLifetime::Scoped);
///
/// let scope = container.create_scope();
/// let conn = scope.resolve::<Connection>().unwrap();
/// scope.dispose();
/// assert!(conn.closed.load(Ordering::SeqCst));
/// ```
pub trait Dispose: Send + Sync + 'static {
    fn dispose(&self);
}

/// Asynchronous teardown, run before synchronous hooks.
#[async_trait::async_trait]
pub trait AsyncDispose: Send + Sync + 'static {
    async fn dispose(&self);
}
