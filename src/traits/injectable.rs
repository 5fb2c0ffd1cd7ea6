//! Constructor injection.

use std::sync::Arc;

use crate::container::ResolverContext;
use crate::error::AppResult;

/// A type the container can build by resolving its own dependencies.
///
/// # Examples
///
/// ```
/// use ferrous_bulwark::{
///     implements, AppResult, DependencyContainer, Injectable, Resolver, ResolverContext,
/// };
/// use std::sync::Arc;
///
/// trait Clock: Send + Sync {
///     fn now(&self) -> u64;
/// }
///
/// struct FixedClock;
/// impl Clock for FixedClock {
///     fn now(&self) -> u64 { 42 }
/// }
/// impl Injectable for FixedClock {
///     fn inject(_: &ResolverContext<'_>) -> AppResult<Self> { Ok(FixedClock) }
/// }
/// implements!(FixedClock => dyn Clock);
///
/// struct Stamper { clock: Arc<dyn Clock> }
/// impl Injectable for Stamper {
///     fn inject(ctx: &ResolverContext<'_>) -> AppResult<Self> {
///         Ok(Stamper { clock: ctx.resolve::<dyn Clock>()? })
///     }
/// }
///
/// let container = DependencyContainer::new();
/// container.register_singleton::<dyn Clock, FixedClock>();
/// container.register_transient::<Stamper, Stamper>();
///
/// assert_eq!(container.resolve::<Stamper>().unwrap().clock.now(), 42);
/// ```
pub trait Injectable: Sized + Send + Sync + 'static {
    fn inject(ctx: &ResolverContext<'_>) -> AppResult<Self>;
}

/// Marks `Self` as an implementation of interface `I`.
///
/// Every injectable type implements itself. Use [`implements!`](crate::implements)
/// to bind a type to trait-object interfaces.
pub trait Implements<I: ?Sized>: Injectable {
    fn upcast(self: Arc<Self>) -> Arc<I>;
}

impl<T: Injectable> Implements<T> for T {
    fn upcast(self: Arc<Self>) -> Arc<T> {
        self
    }
}

/// Implements [`Implements`] for one or more trait-object interfaces.
///
/// `implements!(SmtpMailer => dyn Mailer, dyn HealthProbe);`
#[macro_export]
macro_rules! implements {
    ($impl_ty:ty => $($iface:ty),+ $(,)?) => {
        $(
            impl $crate::Implements<$iface> for $impl_ty {
                fn upcast(self: ::std::sync::Arc<Self>) -> ::std::sync::Arc<$iface> {
                    self
                }
            }
        )+
    };
}
