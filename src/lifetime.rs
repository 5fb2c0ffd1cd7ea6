//! Service lifetime definitions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Controls how instances of a registered service are shared.
///
/// # Examples
///
/// ```rust
/// use ferrous_bulwark::{DependencyContainer, Resolver, ServiceLifetime};
/// use std::sync::Arc;
///
/// struct RequestId(u64);
///
/// let container = DependencyContainer::new();
/// container.register_factory::<RequestId, _>(
///     |_| Ok(Arc::new(RequestId(7))),
///     ServiceLifetime::Scoped,
/// );
///
/// let scope_a = container.create_scope();
/// let scope_b = container.create_scope();
/// let a1 = scope_a.resolve::<RequestId>().unwrap();
/// let a2 = scope_a.resolve::<RequestId>().unwrap();
/// let b1 = scope_b.resolve::<RequestId>().unwrap();
///
/// assert!(Arc::ptr_eq(&a1, &a2)); // same scope, same instance
/// assert!(!Arc::ptr_eq(&a1, &b1)); // new scope, new instance
/// assert_eq!(b1.0, 7);
///
/// // Scoped services need a scope.
/// assert!(container.resolve::<RequestId>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceLifetime {
    /// One instance for the container's lifetime, built on first resolution
    Singleton,
    /// One instance per [`Scope`](crate::Scope)
    Scoped,
    /// A new instance on every resolution
    Transient,
}

impl ServiceLifetime {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceLifetime::Singleton => "singleton",
            ServiceLifetime::Scoped => "scoped",
            ServiceLifetime::Transient => "transient",
        }
    }
}

impl fmt::Display for ServiceLifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
