use std::collections::BTreeMap;

use parking_lot::RwLock;
use serde_json::Value;

use super::ConfigurationService;
use crate::container::ResolverContext;
use crate::error::{AppResult, ApplicationError};
use crate::logging::is_sensitive_key;
use crate::traits::Injectable;

/// Settings from explicit overrides first, then from prefixed environment
/// variables.
///
/// A key `cache.dir` with prefix `BULWARK_` is read from `BULWARK_CACHE_DIR`.
/// Empty variables count as unset.
///
/// ```
/// use ferrous_bulwark::{ConfigurationService, EnvConfigurationService};
///
/// let config = EnvConfigurationService::new("BULWARK_DOCTEST_")
///     .with_setting("weather_api_key", "k-123")
///     .require("weather_api_key");
///
/// assert_eq!(config.get_api_key("Weather").as_deref(), Some("k-123"));
/// assert!(config.validate().is_ok());
/// assert!(config.clone().require("db.url").validate().is_err());
/// ```
#[derive(Clone)]
pub struct EnvConfigurationService {
    prefix: String,
    overrides: BTreeMap<String, String>,
    required: Vec<String>,
}

impl EnvConfigurationService {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            overrides: BTreeMap::new(),
            required: Vec::new(),
        }
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.insert(key.into(), value.into());
        self
    }

    pub fn with_overrides(mut self, overrides: impl IntoIterator<Item = (String, String)>) -> Self {
        self.overrides.extend(overrides);
        self
    }

    /// Marks `key` as mandatory for [`validate`](ConfigurationService::validate).
    pub fn require(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        if !self.required.contains(&key) {
            self.required.push(key);
        }
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Environment variable consulted for `key`.
    pub fn env_var_name(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key.to_uppercase().replace(['.', '-'], "_"))
    }
}

impl ConfigurationService for EnvConfigurationService {
    fn get_setting(&self, key: &str) -> Option<String> {
        if let Some(value) = self.overrides.get(key) {
            return Some(value.clone());
        }
        std::env::var(self.env_var_name(key))
            .ok()
            .filter(|value| !value.is_empty())
    }

    fn validate(&self) -> AppResult<()> {
        let missing: Vec<String> = self
            .required
            .iter()
            .filter(|key| self.get_setting(key).is_none())
            .cloned()
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        Err(ApplicationError::configuration(
            missing[0].clone(),
            format!("Missing required settings: {}", missing.join(", ")),
        )
        .with_context("missing", missing))
    }
}

impl std::fmt::Debug for EnvConfigurationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let overrides: BTreeMap<&str, &str> = self
            .overrides
            .iter()
            .map(|(k, v)| {
                let shown = if is_sensitive_key(k) { crate::logging::REDACTED } else { v.as_str() };
                (k.as_str(), shown)
            })
            .collect();
        f.debug_struct("EnvConfigurationService")
            .field("prefix", &self.prefix)
            .field("overrides", &overrides)
            .field("required", &self.required)
            .finish()
    }
}

/// In-memory settings for tests. Never fails validation.
#[derive(Debug, Default)]
pub struct MockConfigurationService {
    settings: RwLock<BTreeMap<String, String>>,
}

impl MockConfigurationService {
    pub fn new() -> Self {
        Self::default().with_setting("environment", "testing")
    }

    pub fn with_setting(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.settings.write().insert(key.into(), value.into());
    }

    pub fn snapshot(&self) -> Value {
        Value::from(
            self.settings
                .read()
                .iter()
                .map(|(k, v)| (k.clone(), Value::from(v.clone())))
                .collect::<serde_json::Map<_, _>>(),
        )
    }
}

impl Injectable for MockConfigurationService {
    fn inject(_: &ResolverContext<'_>) -> AppResult<Self> {
        Ok(Self::new())
    }
}

crate::implements!(MockConfigurationService => dyn ConfigurationService);

impl ConfigurationService for MockConfigurationService {
    fn get_setting(&self, key: &str) -> Option<String> {
        self.settings.read().get(key).cloned()
    }

    fn get_api_key(&self, service_name: &str) -> Option<String> {
        Some(format!("mock-{}-key", service_name.to_lowercase()))
    }

    fn validate(&self) -> AppResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[serial_test::serial]
    fn reads_prefixed_environment() {
        std::env::set_var("BULWARK_UNIT_CACHE_DIR", "/tmp/cache");
        std::env::set_var("BULWARK_UNIT_EMPTY", "");
        let config = EnvConfigurationService::new("BULWARK_UNIT_");
        assert_eq!(config.get_setting("cache.dir").as_deref(), Some("/tmp/cache"));
        assert_eq!(config.get_setting("empty"), None);
        std::env::remove_var("BULWARK_UNIT_CACHE_DIR");
        std::env::remove_var("BULWARK_UNIT_EMPTY");
    }

    #[test]
    fn overrides_win() {
        let config = EnvConfigurationService::new("BULWARK_UNIT_").with_setting("PATH", "override");
        assert_eq!(config.get_setting("PATH").as_deref(), Some("override"));
    }

    #[test]
    fn debug_hides_secrets() {
        let config = EnvConfigurationService::new("X_").with_setting("db_password", "hunter2");
        assert!(!format!("{config:?}").contains("hunter2"));
    }

    #[test]
    fn mock_hands_out_fake_keys() {
        let config = MockConfigurationService::new();
        assert_eq!(config.get_api_key("GitHub").as_deref(), Some("mock-github-key"));
        assert_eq!(config.get_setting("environment").as_deref(), Some("testing"));
    }
}
