//! Health probes and their aggregation.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use super::timeout::run_bounded;
use crate::error::{AppResult, ApplicationError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Upper bound for one probe run
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Intended cadence; checks never schedule themselves
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            interval: Duration::from_secs(30),
        }
    }
}

impl HealthCheckConfig {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }
}

/// Outcome of one probe run.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub name: String,
    pub is_healthy: bool,
    pub last_checked_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(with = "humantime_serde")]
    pub response_time: Duration,
}

type Probe = Arc<dyn Fn() -> AppResult<()> + Send + Sync>;

/// A named probe bounded by its own timeout.
///
/// [`get_status`](Self::get_status) runs the probe synchronously and records
/// the result. Running it on `interval` is left to an external scheduler;
/// [`is_due`](Self::is_due) tells the scheduler whether a run is needed.
///
/// # Examples
///
/// ```
/// use ferrous_bulwark::{HealthCheck, HealthCheckConfig};
///
/// let check = HealthCheck::new("cache", || Ok(()), HealthCheckConfig::default());
/// assert!(check.is_due());
///
/// let status = check.get_status();
/// assert!(status.is_healthy);
/// assert!(status.error.is_none());
/// assert!(!check.is_due());
/// ```
pub struct HealthCheck {
    name: String,
    probe: Probe,
    config: HealthCheckConfig,
    last: Mutex<Option<(Instant, HealthStatus)>>,
}

impl HealthCheck {
    pub fn new<P>(name: impl Into<String>, probe: P, config: HealthCheckConfig) -> Self
    where
        P: Fn() -> AppResult<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            probe: Arc::new(probe),
            config,
            last: Mutex::new(None),
        }
    }

    /// A check whose probe reports health as a plain boolean.
    pub fn from_predicate<P>(name: impl Into<String>, predicate: P, config: HealthCheckConfig) -> Self
    where
        P: Fn() -> bool + Send + Sync + 'static,
    {
        let name = name.into();
        let label = name.clone();
        Self::new(
            name,
            move || {
                if predicate() {
                    Ok(())
                } else {
                    Err(ApplicationError::service(
                        label.clone(),
                        format!("Health check '{label}' failed"),
                    ))
                }
            },
            config,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &HealthCheckConfig {
        &self.config
    }

    /// Runs the probe bounded by the configured timeout and records the result.
    pub fn get_status(&self) -> HealthStatus {
        let probe = Arc::clone(&self.probe);
        let started = Instant::now();
        let outcome = run_bounded(&self.name, self.config.timeout, move |_| probe());
        let response_time = started.elapsed();

        let status = HealthStatus {
            name: self.name.clone(),
            is_healthy: outcome.is_ok(),
            last_checked_at: Utc::now(),
            error: outcome
                .err()
                .map(|e| crate::logging::redact(e.message())),
            response_time,
        };

        match status.error {
            Some(ref error) => tracing::warn!(check = %self.name, error = %error, "health check failed"),
            None => tracing::debug!(
                check = %self.name,
                response_ms = response_time.as_millis() as u64,
                "health check passed"
            ),
        }

        *self.last.lock() = Some((Instant::now(), status.clone()));
        status
    }

    pub fn last_status(&self) -> Option<HealthStatus> {
        self.last.lock().as_ref().map(|(_, status)| status.clone())
    }

    /// True if the check never ran or its last run is older than `interval`.
    pub fn is_due(&self) -> bool {
        match *self.last.lock() {
            Some((ran_at, _)) => ran_at.elapsed() >= self.config.interval,
            None => true,
        }
    }
}

impl std::fmt::Debug for HealthCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthCheck")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("last_status", &self.last_status())
            .finish()
    }
}

/// Combined result of several health checks.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub checks: BTreeMap<String, HealthStatus>,
    pub errors: Vec<String>,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    fn from_statuses(statuses: impl IntoIterator<Item = HealthStatus>) -> Self {
        let mut checks = BTreeMap::new();
        let mut errors = Vec::new();
        for status in statuses {
            if let Some(ref error) = status.error {
                errors.push(format!("{}: {}", status.name, error));
            }
            checks.insert(status.name.clone(), status);
        }
        Self {
            healthy: errors.is_empty(),
            checks,
            errors,
            checked_at: Utc::now(),
        }
    }
}

/// A set of health checks reported together.
#[derive(Debug, Default)]
pub struct HealthMonitor {
    checks: RwLock<Vec<Arc<HealthCheck>>>,
}

impl HealthMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, check: HealthCheck) -> Arc<HealthCheck> {
        let check = Arc::new(check);
        self.checks.write().push(Arc::clone(&check));
        check
    }

    pub fn len(&self) -> usize {
        self.checks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs every check now.
    pub fn check_all(&self) -> HealthReport {
        let checks = self.checks.read().clone();
        HealthReport::from_statuses(checks.iter().map(|c| c.get_status()))
    }

    /// Runs only the checks that are due and reuses the last status of the rest.
    pub fn check_due(&self) -> HealthReport {
        let checks = self.checks.read().clone();
        HealthReport::from_statuses(checks.iter().map(|check| {
            if check.is_due() {
                return check.get_status();
            }
            check.last_status().unwrap_or_else(|| check.get_status())
        }))
    }
}
