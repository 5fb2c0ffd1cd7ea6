use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppResult, ApplicationError};
use crate::logging::{is_sensitive_key, LoggingConfig, REDACTED};
use crate::reliability::{CircuitBreakerConfig, RetryPolicy};
use crate::services::CacheSettings;

/// Environment variable read by [`Environment::from_env`].
pub const ENVIRONMENT_VAR: &str = "BULWARK_ENV";

/// Which family of implementations the registry binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    Development,
    Testing,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Development => "development",
            Environment::Testing => "testing",
        }
    }

    /// Reads `BULWARK_ENV`, defaulting to production when unset.
    pub fn from_env() -> AppResult<Self> {
        match std::env::var(ENVIRONMENT_VAR) {
            Ok(value) if !value.trim().is_empty() => value.parse(),
            _ => Ok(Environment::Production),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = ApplicationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "development" | "dev" => Ok(Environment::Development),
            "testing" | "test" => Ok(Environment::Testing),
            other => Err(ApplicationError::configuration(
                ENVIRONMENT_VAR,
                format!("Unknown environment '{other}'; expected production, development or testing"),
            )),
        }
    }
}

/// Inputs for configuring a [`ServiceRegistry`](crate::ServiceRegistry).
///
/// Unset policy fields fall back to per-environment defaults.
///
/// ```
/// use ferrous_bulwark::{Environment, RegistrySettings};
///
/// let settings = RegistrySettings::from_json(r#"{
///     "settings": { "weather_api_key": "abc" },
///     "required_settings": ["weather_api_key"],
///     "cache": { "max_entries": 50, "default_ttl": "90s" }
/// }"#).unwrap();
///
/// assert_eq!(settings.cache_for(Environment::Production).max_entries, 50);
/// assert_eq!(settings.cache_for(Environment::Development).max_entries, 50);
/// assert_eq!(RegistrySettings::default().cache_for(Environment::Development).max_entries, 100);
/// ```
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// Prefix of the environment variables backing configuration lookups
    pub config_prefix: String,
    /// Explicit settings that take precedence over the environment
    pub settings: BTreeMap<String, String>,
    pub required_settings: Vec<String>,
    pub cache: Option<CacheSettings>,
    pub circuit_breaker: Option<CircuitBreakerConfig>,
    pub retry: Option<RetryPolicy>,
    /// Installed as the global subscriber by [`bootstrap`](crate::bootstrap)
    pub logging: Option<LoggingConfig>,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            config_prefix: "BULWARK_".to_string(),
            settings: BTreeMap::new(),
            required_settings: Vec::new(),
            cache: None,
            circuit_breaker: None,
            retry: None,
            logging: None,
        }
    }
}

impl RegistrySettings {
    pub fn from_json(json: &str) -> AppResult<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> AppResult<()> {
        if let Some(cache) = &self.cache {
            cache.validate()?;
        }
        if let Some(breaker) = &self.circuit_breaker {
            breaker.validate()?;
        }
        if let Some(retry) = &self.retry {
            retry.validate()?;
        }
        if let Some(logging) = &self.logging {
            crate::logging::parse_log_level(&logging.level)?;
        }
        Ok(())
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    pub fn require_setting(mut self, key: impl Into<String>) -> Self {
        self.required_settings.push(key.into());
        self
    }

    pub fn with_cache(mut self, cache: CacheSettings) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = Some(config);
        self
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    pub fn cache_for(&self, environment: Environment) -> CacheSettings {
        self.cache.clone().unwrap_or_else(|| match environment {
            Environment::Production => CacheSettings::production(),
            Environment::Development | Environment::Testing => CacheSettings::development(),
        })
    }

    /// Development trips later and recovers sooner than production.
    pub fn circuit_breaker_for(&self, environment: Environment) -> CircuitBreakerConfig {
        self.circuit_breaker.clone().unwrap_or_else(|| match environment {
            Environment::Production => CircuitBreakerConfig::default(),
            Environment::Development | Environment::Testing => {
                CircuitBreakerConfig::new(10, Duration::from_secs(10))
            }
        })
    }

    pub fn retry_for(&self, environment: Environment) -> RetryPolicy {
        self.retry.clone().unwrap_or_else(|| match environment {
            Environment::Production => RetryPolicy::default(),
            Environment::Development | Environment::Testing => {
                RetryPolicy::new(2, Duration::from_millis(100)).with_max_delay(Duration::from_secs(2))
            }
        })
    }
}

impl fmt::Debug for RegistrySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let settings: BTreeMap<&str, &str> = self
            .settings
            .iter()
            .map(|(k, v)| (k.as_str(), if is_sensitive_key(k) { REDACTED } else { v.as_str() }))
            .collect();
        f.debug_struct("RegistrySettings")
            .field("config_prefix", &self.config_prefix)
            .field("settings", &settings)
            .field("required_settings", &self.required_settings)
            .field("cache", &self.cache)
            .field("circuit_breaker", &self.circuit_breaker)
            .field("retry", &self.retry)
            .field("logging", &self.logging)
            .finish()
    }
}
