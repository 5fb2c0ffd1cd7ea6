//! Application service interfaces and their implementations.
//!
//! The interfaces are what application code resolves from the container.
//! Each has a production implementation, tuned differently for development,
//! and a `Mock*` implementation for tests. The
//! [`ServiceRegistry`](crate::ServiceRegistry) picks which ones are bound.

mod cache;
mod config;
mod logger;
mod store;

pub use cache::{CacheSettings, MemoryCacheService, MockCacheService};
pub use config::{EnvConfigurationService, MockConfigurationService};
pub use logger::{LogLevel, LogRecord, MockLoggingService, TracingLoggingService};
pub use store::{InMemoryStore, MockStore, ResilientStore};

use std::time::Duration;

use serde_json::Value;

use crate::error::AppResult;

/// Read access to application settings and credentials.
pub trait ConfigurationService: Send + Sync {
    fn get_setting(&self, key: &str) -> Option<String>;

    /// Credential for an external service, looked up as `<service>_api_key`.
    fn get_api_key(&self, service_name: &str) -> Option<String> {
        self.get_setting(&format!("{}_api_key", service_name.to_lowercase()))
    }

    fn get_setting_or(&self, key: &str, default: &str) -> String {
        self.get_setting(key).unwrap_or_else(|| default.to_string())
    }

    /// Checks that every required setting is present.
    fn validate(&self) -> AppResult<()>;
}

/// Structured application log sink.
pub trait LoggingService: Send + Sync {
    fn log(&self, level: LogLevel, message: &str, fields: &[(&str, Value)]);

    fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message, &[]);
    }

    fn info(&self, message: &str) {
        self.log(LogLevel::Info, message, &[]);
    }

    fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message, &[]);
    }

    fn error(&self, message: &str) {
        self.log(LogLevel::Error, message, &[]);
    }
}

/// Expiring key-value cache.
pub trait CacheService: Send + Sync {
    fn get(&self, key: &str) -> AppResult<Option<Value>>;

    /// Stores `value`; `None` uses the cache's default time to live.
    fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> AppResult<()>;

    /// Returns whether an entry was removed.
    fn delete(&self, key: &str) -> AppResult<bool>;

    fn clear(&self) -> AppResult<()>;

    fn exists(&self, key: &str) -> AppResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}

/// Durable key-value storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> AppResult<Option<Value>>;

    fn put(&self, key: &str, value: Value) -> AppResult<()>;

    fn delete(&self, key: &str) -> AppResult<bool>;

    /// All keys in ascending order.
    fn keys(&self) -> AppResult<Vec<String>>;
}
