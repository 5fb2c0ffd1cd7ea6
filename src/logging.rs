//! Structured logging setup and credential scrubbing.
//!
//! Everything in the crate logs through `tracing`. Applications call
//! [`init_logging`] once at startup to install a subscriber; libraries
//! embedding the crate can install their own instead.

use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::error::{AppResult, ApplicationError};

/// Environment variable whose filter directives override the configured level.
pub const LOG_ENV_VAR: &str = "BULWARK_LOG";

/// Replacement text for scrubbed values.
pub const REDACTED: &str = "[REDACTED]";

static INITIALIZED: OnceCell<()> = OnceCell::new();

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json_format: bool,
    pub with_target: bool,
    pub with_thread_ids: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_target: true,
            with_thread_ids: false,
        }
    }
}

impl LoggingConfig {
    /// JSON lines at `info`, for log shippers.
    pub fn production() -> Self {
        Self {
            json_format: true,
            with_thread_ids: true,
            ..Self::default()
        }
    }

    /// Human-readable output at `debug`.
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            ..Self::default()
        }
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json_format = json;
        self
    }
}

/// Installs the global `tracing` subscriber.
///
/// `BULWARK_LOG` takes precedence over `config.level` when set. Calling this
/// again, or after another subscriber was installed, does nothing.
///
/// # Errors
///
/// A ConfigurationError when `config.level` is not a known level.
pub fn init_logging(config: &LoggingConfig) -> AppResult<()> {
    let level = parse_log_level(&config.level)?;
    if INITIALIZED.get().is_some() {
        return Ok(());
    }

    let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| EnvFilter::default().add_directive(LevelFilter::from_level(level).into()));
    let registry = Registry::default().with(filter);

    let installed = if config.json_format {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(config.with_target)
                    .with_thread_ids(config.with_thread_ids),
            )
            .try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(config.with_target)
                    .with_thread_ids(config.with_thread_ids),
            )
            .try_init()
    };
    let _ = INITIALIZED.set(());

    match installed {
        Ok(()) => tracing::info!(level = %level, json = config.json_format, "logging initialized"),
        Err(_) => tracing::debug!("a global subscriber was already installed"),
    }
    Ok(())
}

/// Parses a level name; `warning` is accepted as an alias of `warn`.
pub fn parse_log_level(level: &str) -> AppResult<Level> {
    match level.trim().to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(ApplicationError::configuration(
            "log_level",
            format!("Invalid log level: {level}. Use trace, debug, info, warn, or error"),
        )),
    }
}

static SCRUBBERS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"(?i)\bbearer\s+[A-Za-z0-9\-._~+/]+=*", "Bearer [REDACTED]"),
        (
            r#"(?i)\b(password|passwd|pwd|pass|secret|token|api[_-]?key|access[_-]?key)(\s*[:=]\s*)("?)[^\s",;&]+"#,
            "${1}${2}${3}[REDACTED]",
        ),
        (r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b", "[REDACTED_EMAIL]"),
        (r"\b[A-Za-z0-9]{32,}\b", REDACTED),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| Regex::new(pattern).ok().map(|re| (re, replacement)))
    .collect()
});

const SENSITIVE_KEY_PARTS: &[&str] = &[
    "password",
    "passwd",
    "pwd",
    "secret",
    "token",
    "api_key",
    "apikey",
    "api-key",
    "authorization",
    "credential",
    "private_key",
    "cookie",
];

/// Scrubs credentials and e-mail addresses from free text.
///
/// ```
/// use ferrous_bulwark::logging::redact;
///
/// let line = redact("login failed: password=hunter2 for ops@example.com");
/// assert!(!line.contains("hunter2"));
/// assert!(!line.contains("ops@example.com"));
/// ```
pub fn redact(text: &str) -> String {
    SCRUBBERS
        .iter()
        .fold(text.to_string(), |acc, (re, replacement)| {
            re.replace_all(&acc, *replacement).into_owned()
        })
}

/// Whether a context or settings key names a credential.
pub fn is_sensitive_key(key: &str) -> bool {
    let key = key.to_lowercase();
    SENSITIVE_KEY_PARTS.iter().any(|part| key.contains(part))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_levels() {
        assert_eq!(parse_log_level("WARNING").unwrap(), Level::WARN);
        assert_eq!(parse_log_level(" debug ").unwrap(), Level::DEBUG);
        let err = parse_log_level("loud").unwrap_err();
        assert_eq!(err.error_code(), "ConfigurationError");
    }

    #[test]
    fn redacts_bearer_and_key_values() {
        let scrubbed = redact("Authorization: Bearer abc.def-123 api_key=\"xyz\" token: t0k");
        assert!(!scrubbed.contains("abc.def-123"));
        assert!(!scrubbed.contains("xyz"));
        assert!(!scrubbed.contains("t0k"));
        assert!(scrubbed.contains("api_key=\"[REDACTED]"));
    }

    #[test]
    fn leaves_plain_text_alone() {
        assert_eq!(redact("connection refused"), "connection refused");
    }

    #[test]
    fn sensitive_keys() {
        assert!(is_sensitive_key("API_KEY"));
        assert!(is_sensitive_key("db_password"));
        assert!(is_sensitive_key("refresh_token"));
        assert!(!is_sensitive_key("endpoint"));
    }

    #[test]
    fn init_is_idempotent() {
        let config = LoggingConfig::default().with_level("warn");
        assert!(init_logging(&config).is_ok());
        assert!(init_logging(&config).is_ok());
        assert!(init_logging(&LoggingConfig::default().with_level("nope")).is_err());
    }
}
