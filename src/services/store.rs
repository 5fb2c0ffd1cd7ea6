use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use super::KeyValueStore;
use crate::container::ResolverContext;
use crate::error::{AppResult, ApplicationError};
use crate::reliability::{CircuitBreaker, CircuitBreakerStats, RetryWithBackoff};
use crate::traits::Injectable;

/// Process-local store backed by an ordered map.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    data: RwLock<BTreeMap<String, Value>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Injectable for InMemoryStore {
    fn inject(_: &ResolverContext<'_>) -> AppResult<Self> {
        Ok(Self::new())
    }
}

crate::implements!(InMemoryStore => dyn KeyValueStore);

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &str) -> AppResult<Option<Value>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: Value) -> AppResult<()> {
        self.data.write().insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> AppResult<bool> {
        Ok(self.data.write().remove(key).is_some())
    }

    fn keys(&self) -> AppResult<Vec<String>> {
        Ok(self.data.read().keys().cloned().collect())
    }
}

/// A store guarded by a circuit breaker around retried calls.
///
/// Each operation is retried first; only a call that still fails after
/// every attempt counts as one breaker failure.
///
/// ```
/// use ferrous_bulwark::{
///     CircuitBreaker, CircuitBreakerConfig, InMemoryStore, KeyValueStore, ResilientStore,
///     RetryPolicy, RetryWithBackoff,
/// };
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let store = ResilientStore::new(
///     Arc::new(InMemoryStore::new()),
///     CircuitBreaker::new("store", CircuitBreakerConfig::default()),
///     RetryWithBackoff::new("store", RetryPolicy::new(3, Duration::from_millis(1))),
/// );
/// store.put("entry:1", serde_json::json!("sunny")).unwrap();
/// assert_eq!(store.keys().unwrap(), vec!["entry:1".to_string()]);
/// ```
pub struct ResilientStore {
    inner: Arc<dyn KeyValueStore>,
    breaker: CircuitBreaker,
    retry: RetryWithBackoff,
}

impl ResilientStore {
    pub fn new(inner: Arc<dyn KeyValueStore>, breaker: CircuitBreaker, retry: RetryWithBackoff) -> Self {
        Self { inner, breaker, retry }
    }

    pub fn breaker_stats(&self) -> CircuitBreakerStats {
        self.breaker.stats()
    }

    fn guarded<T>(&self, mut operation: impl FnMut(&dyn KeyValueStore) -> AppResult<T>) -> AppResult<T> {
        self.breaker
            .call(|| self.retry.execute(|| operation(self.inner.as_ref())))
    }
}

impl KeyValueStore for ResilientStore {
    fn get(&self, key: &str) -> AppResult<Option<Value>> {
        self.guarded(|store| store.get(key))
    }

    fn put(&self, key: &str, value: Value) -> AppResult<()> {
        self.guarded(|store| store.put(key, value.clone()))
    }

    fn delete(&self, key: &str) -> AppResult<bool> {
        self.guarded(|store| store.delete(key))
    }

    fn keys(&self) -> AppResult<Vec<String>> {
        self.guarded(|store| store.keys())
    }
}

impl std::fmt::Debug for ResilientStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientStore")
            .field("breaker", &self.breaker)
            .field("retry", &self.retry)
            .finish()
    }
}

/// Store for tests: can fail on demand and counts calls.
#[derive(Debug, Default)]
pub struct MockStore {
    data: InMemoryStore,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self, operation: &str) -> AppResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(ApplicationError::database(operation, "Mock store failure"));
        }
        Ok(())
    }
}

impl Injectable for MockStore {
    fn inject(_: &ResolverContext<'_>) -> AppResult<Self> {
        Ok(Self::new())
    }
}

crate::implements!(MockStore => dyn KeyValueStore);

impl KeyValueStore for MockStore {
    fn get(&self, key: &str) -> AppResult<Option<Value>> {
        self.check("get")?;
        self.data.get(key)
    }

    fn put(&self, key: &str, value: Value) -> AppResult<()> {
        self.check("put")?;
        self.data.put(key, value)
    }

    fn delete(&self, key: &str) -> AppResult<bool> {
        self.check("delete")?;
        self.data.delete(key)
    }

    fn keys(&self) -> AppResult<Vec<String>> {
        self.check("keys")?;
        self.data.keys()
    }
}
