//! Service registration types.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde::Serialize;

use crate::container::ResolverContext;
use crate::error::AppResult;
use crate::key::{short_type_name, Key};
use crate::lifetime::ServiceLifetime;

// Type-erased Arc for storage. Always holds an `Arc<I>` for interface `I`.
pub(crate) type AnyArc = Arc<dyn Any + Send + Sync>;

pub(crate) type Ctor = Arc<dyn for<'a> Fn(&ResolverContext<'a>) -> AppResult<AnyArc> + Send + Sync>;

/// How a registration was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationKind {
    /// An `Injectable` implementation type
    Type,
    /// A factory closure
    Factory,
    /// A pre-built instance
    Instance,
}

/// Binding of one interface to its constructor and lifetime.
///
/// Immutable once stored. Re-registering an interface replaces the whole
/// registration, cached singleton included.
pub(crate) struct Registration {
    pub(crate) key: Key,
    pub(crate) lifetime: ServiceLifetime,
    pub(crate) kind: RegistrationKind,
    pub(crate) implementation: &'static str,
    pub(crate) ctor: Ctor,
    /// Singleton cache, written only after a successful construction
    pub(crate) singleton: OnceCell<AnyArc>,
}

impl Registration {
    pub(crate) fn new(
        key: Key,
        lifetime: ServiceLifetime,
        kind: RegistrationKind,
        implementation: &'static str,
        ctor: Ctor,
    ) -> Self {
        Self {
            key,
            lifetime,
            kind,
            implementation,
            ctor,
            singleton: OnceCell::new(),
        }
    }

    pub(crate) fn instance(key: Key, implementation: &'static str, value: AnyArc) -> Self {
        let stored = value.clone();
        Self {
            key,
            lifetime: ServiceLifetime::Singleton,
            kind: RegistrationKind::Instance,
            implementation,
            ctor: Arc::new(move |_| Ok(stored.clone())),
            singleton: OnceCell::with_value(value),
        }
    }

    pub(crate) fn descriptor(&self) -> ServiceDescriptor {
        ServiceDescriptor {
            service: short_type_name(self.key.display_name()),
            service_type: self.key.display_name(),
            implementation: short_type_name(self.implementation),
            lifetime: self.lifetime,
            kind: self.kind,
            instantiated: self.singleton.get().is_some(),
        }
    }
}

/// Read-only description of a registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceDescriptor {
    /// Interface name without module paths
    pub service: String,
    /// Full interface type name
    pub service_type: &'static str,
    pub implementation: String,
    pub lifetime: ServiceLifetime,
    pub kind: RegistrationKind,
    /// Whether a singleton instance has been built
    pub instantiated: bool,
}

/// Registration table keyed by interface.
#[derive(Default)]
pub(crate) struct Registry {
    entries: HashMap<Key, Arc<Registration>>,
}

impl Registry {
    /// Inserts, returning the registration it replaced.
    pub(crate) fn insert(&mut self, registration: Registration) -> Option<Arc<Registration>> {
        self.entries.insert(registration.key, Arc::new(registration))
    }

    pub(crate) fn get(&self, key: &Key) -> Option<&Arc<Registration>> {
        self.entries.get(key)
    }

    pub(crate) fn contains(&self, key: &Key) -> bool {
        self.entries.contains_key(key)
    }

    pub(crate) fn remove(&mut self, key: &Key) -> Option<Arc<Registration>> {
        self.entries.remove(key)
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Descriptors sorted by service name.
    pub(crate) fn descriptors(&self) -> Vec<ServiceDescriptor> {
        let mut out: Vec<_> = self.entries.values().map(|r| r.descriptor()).collect();
        out.sort_by(|a, b| a.service.cmp(&b.service));
        out
    }
}
