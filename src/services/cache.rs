use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{CacheService, LogLevel, LoggingService};
use crate::container::ResolverContext;
use crate::error::{AppResult, ApplicationError};
use crate::traits::Injectable;

/// Capacity and expiry of a [`MemoryCacheService`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub max_entries: usize,
    #[serde(with = "humantime_serde")]
    pub default_ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self::production()
    }
}

impl CacheSettings {
    /// 1000 entries, one hour.
    pub fn production() -> Self {
        Self {
            max_entries: 1000,
            default_ttl: Duration::from_secs(3600),
        }
    }

    /// 100 entries, five minutes.
    pub fn development() -> Self {
        Self {
            max_entries: 100,
            default_ttl: Duration::from_secs(300),
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.max_entries == 0 {
            return Err(ApplicationError::configuration(
                "cache.max_entries",
                "max_entries must be greater than zero",
            ));
        }
        Ok(())
    }
}

struct Entry {
    value: Value,
    stored_at: Instant,
    /// `None` when the TTL reaches past what `Instant` can represent.
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Bounded in-process cache with per-entry expiry.
///
/// When full, expired entries are purged first; if that frees nothing the
/// oldest entry is evicted.
///
/// ```
/// use ferrous_bulwark::{CacheService, CacheSettings, MemoryCacheService};
/// use serde_json::json;
///
/// let cache = MemoryCacheService::new(CacheSettings::development());
/// cache.set("forecast:oslo", json!({"temp": 4}), None).unwrap();
/// assert_eq!(cache.get("forecast:oslo").unwrap(), Some(json!({"temp": 4})));
/// assert!(cache.delete("forecast:oslo").unwrap());
/// assert!(!cache.exists("forecast:oslo").unwrap());
/// ```
pub struct MemoryCacheService {
    settings: CacheSettings,
    entries: Mutex<HashMap<String, Entry>>,
    logger: Option<Arc<dyn LoggingService>>,
}

impl MemoryCacheService {
    pub fn new(settings: CacheSettings) -> Self {
        Self {
            settings,
            entries: Mutex::new(HashMap::new()),
            logger: None,
        }
    }

    /// Reports evictions through `logger`.
    pub fn with_logger(mut self, logger: Arc<dyn LoggingService>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Entries currently held, expired ones included until purged.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn make_room(&self, entries: &mut HashMap<String, Entry>) {
        let now = Instant::now();
        entries.retain(|_, entry| entry.is_live(now));
        if entries.len() < self.settings.max_entries {
            return;
        }
        let oldest = entries
            .iter()
            .min_by_key(|(_, entry)| entry.stored_at)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            entries.remove(&key);
            if let Some(logger) = &self.logger {
                logger.log(LogLevel::Debug, "cache entry evicted", &[("key", Value::from(key))]);
            }
        }
    }
}

impl CacheService for MemoryCacheService {
    fn get(&self, key: &str) -> AppResult<Option<Value>> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.is_live(Instant::now()) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> AppResult<()> {
        let now = Instant::now();
        let ttl = ttl.unwrap_or(self.settings.default_ttl);
        let mut entries = self.entries.lock();
        if !entries.contains_key(key) && entries.len() >= self.settings.max_entries {
            self.make_room(&mut entries);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value,
                stored_at: now,
                expires_at: now.checked_add(ttl),
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> AppResult<bool> {
        Ok(self.entries.lock().remove(key).is_some())
    }

    fn clear(&self) -> AppResult<()> {
        self.entries.lock().clear();
        Ok(())
    }
}

impl std::fmt::Debug for MemoryCacheService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCacheService")
            .field("settings", &self.settings)
            .field("entries", &self.len())
            .finish()
    }
}

/// Unbounded cache for tests that can be switched into a failing mode.
///
/// ```
/// use ferrous_bulwark::{CacheService, MockCacheService};
/// use serde_json::json;
///
/// let cache = MockCacheService::new();
/// cache.set("k", json!(1), None).unwrap();
/// cache.set_failing(true);
/// assert!(cache.get("k").is_err());
/// ```
#[derive(Debug, Default)]
pub struct MockCacheService {
    entries: Mutex<HashMap<String, Value>>,
    failing: AtomicBool,
}

impl MockCacheService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self, operation: &str) -> AppResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ApplicationError::service(
                format!("cache.{operation}"),
                "Mock cache failure",
            ));
        }
        Ok(())
    }
}

impl Injectable for MockCacheService {
    fn inject(_: &ResolverContext<'_>) -> AppResult<Self> {
        Ok(Self::new())
    }
}

crate::implements!(MockCacheService => dyn CacheService);

impl CacheService for MockCacheService {
    fn get(&self, key: &str) -> AppResult<Option<Value>> {
        self.check("get")?;
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value, _ttl: Option<Duration>) -> AppResult<()> {
        self.check("set")?;
        self.entries.lock().insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> AppResult<bool> {
        self.check("delete")?;
        Ok(self.entries.lock().remove(key).is_some())
    }

    fn clear(&self) -> AppResult<()> {
        self.check("clear")?;
        self.entries.lock().clear();
        Ok(())
    }
}
