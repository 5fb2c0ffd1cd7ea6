//! Service identity used for registration and lookup.

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Identifies a service interface in the container.
///
/// A key pairs the `TypeId` of the interface type with its type name. The
/// interface may be a concrete type or a trait object such as
/// `dyn Logger`; both have a stable `TypeId`. Equality and hashing use only
/// the `TypeId`, the name is kept for diagnostics.
///
/// # Examples
///
/// ```
/// use ferrous_bulwark::{key_of, Key};
///
/// trait Clock: Send + Sync {}
///
/// let a = key_of::<dyn Clock>();
/// let b = Key::of::<dyn Clock>();
/// assert_eq!(a, b);
/// assert!(a.display_name().contains("Clock"));
/// assert_ne!(a, key_of::<String>());
/// ```
#[derive(Clone, Copy)]
pub struct Key {
    id: TypeId,
    name: &'static str,
}

impl Key {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Key {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Full type name, e.g. `dyn my_app::services::Logger`.
    pub fn display_name(&self) -> &'static str {
        self.name
    }

    /// Type name with module paths stripped, e.g. `dyn Logger`.
    pub fn short_name(&self) -> String {
        short_type_name(self.name)
    }

    pub fn type_id(&self) -> TypeId {
        self.id
    }
}

/// Shorthand for [`Key::of`].
pub fn key_of<T: ?Sized + 'static>() -> Key {
    Key::of::<T>()
}

/// Strips module paths from every path segment of a type name.
pub(crate) fn short_type_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut segment = String::new();
    for ch in name.chars() {
        if ch.is_alphanumeric() || ch == '_' || ch == ':' {
            segment.push(ch);
        } else {
            out.push_str(segment.rsplit("::").next().unwrap_or(&segment));
            segment.clear();
            out.push(ch);
        }
    }
    out.push_str(segment.rsplit("::").next().unwrap_or(&segment));
    out
}

impl PartialEq for Key {
    #[inline(always)]
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Key {}

impl Hash for Key {
    #[inline(always)]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self.name)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
