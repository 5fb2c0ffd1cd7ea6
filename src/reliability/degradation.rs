//! Fallbacks for unavailable dependencies.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::AppResult;

type FallbackFn<T> = Arc<dyn Fn() -> AppResult<T> + Send + Sync>;
type ConditionFn = Arc<dyn Fn() -> bool + Send + Sync>;

struct Fallback<T> {
    run: FallbackFn<T>,
    condition: ConditionFn,
}

impl<T> Clone for Fallback<T> {
    fn clone(&self) -> Self {
        Self {
            run: Arc::clone(&self.run),
            condition: Arc::clone(&self.condition),
        }
    }
}

/// Substitutes fallback behavior when a primary dependency is unavailable.
///
/// Each service key holds a chain of fallbacks tried in registration order.
/// A fallback's `condition` reports that the primary is known to be down:
/// when any registered condition holds, the primary is skipped entirely and
/// that fallback's result is returned as is. Otherwise the primary runs and,
/// if it fails, the fallbacks are tried in order as a last resort. When they
/// all fail the primary's original error is returned.
///
/// # Examples
///
/// ```
/// use ferrous_bulwark::{ApplicationError, GracefulDegradation};
///
/// let degradation = GracefulDegradation::new();
/// degradation.register_fallback("forecast", || Ok("cached forecast".to_string()), || false);
///
/// let result = degradation.execute("forecast", || {
///     Err(ApplicationError::network("api unreachable"))
/// });
/// assert_eq!(result.unwrap(), "cached forecast");
/// ```
pub struct GracefulDegradation<T> {
    fallbacks: RwLock<HashMap<String, Vec<Fallback<T>>>>,
}

impl<T> Default for GracefulDegradation<T> {
    fn default() -> Self {
        Self {
            fallbacks: RwLock::new(HashMap::new()),
        }
    }
}

impl<T> GracefulDegradation<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a fallback to the chain for `service_key`.
    pub fn register_fallback<F, C>(&self, service_key: impl Into<String>, fallback: F, condition: C)
    where
        F: Fn() -> AppResult<T> + Send + Sync + 'static,
        C: Fn() -> bool + Send + Sync + 'static,
    {
        self.fallbacks
            .write()
            .entry(service_key.into())
            .or_default()
            .push(Fallback {
                run: Arc::new(fallback),
                condition: Arc::new(condition),
            });
    }

    pub fn has_fallback(&self, service_key: &str) -> bool {
        self.fallbacks
            .read()
            .get(service_key)
            .is_some_and(|chain| !chain.is_empty())
    }

    pub fn fallback_count(&self, service_key: &str) -> usize {
        self.fallbacks.read().get(service_key).map_or(0, Vec::len)
    }

    /// Runs `primary`, or a fallback when the primary is unavailable or fails.
    pub fn execute<F>(&self, service_key: &str, primary: F) -> AppResult<T>
    where
        F: FnOnce() -> AppResult<T>,
    {
        // Cloned so no lock is held while user code runs.
        let chain = self
            .fallbacks
            .read()
            .get(service_key)
            .cloned()
            .unwrap_or_default();

        if let Some(degraded) = chain.iter().find(|f| (f.condition)()) {
            tracing::info!(service = service_key, "primary marked unavailable, using fallback");
            return (degraded.run)();
        }

        let primary_error = match primary() {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if chain.is_empty() {
            return Err(primary_error);
        }

        tracing::warn!(service = service_key, error = %primary_error, "primary failed, trying fallbacks");
        for (index, fallback) in chain.iter().enumerate() {
            match (fallback.run)() {
                Ok(value) => {
                    tracing::info!(service = service_key, fallback = index + 1, "fallback succeeded");
                    return Ok(value);
                }
                Err(err) => {
                    tracing::warn!(service = service_key, fallback = index + 1, error = %err, "fallback failed");
                }
            }
        }

        tracing::error!(service = service_key, "all fallbacks failed");
        Err(primary_error)
    }
}

impl<T> std::fmt::Debug for GracefulDegradation<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let services: Vec<String> = self.fallbacks.read().keys().cloned().collect();
        f.debug_struct("GracefulDegradation")
            .field("services", &services)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApplicationError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn condition_skips_primary() {
        let degradation = GracefulDegradation::new();
        degradation.register_fallback("svc", || Ok(1), || true);

        let called = AtomicUsize::new(0);
        let value = degradation
            .execute("svc", || {
                called.fetch_add(1, Ordering::SeqCst);
                Ok(2)
            })
            .unwrap();
        assert_eq!(value, 1);
        assert_eq!(called.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn chain_is_tried_in_order() {
        let degradation = GracefulDegradation::new();
        degradation.register_fallback("svc", || Err(ApplicationError::network("down")), || false);
        degradation.register_fallback("svc", || Ok("second"), || false);

        let value = degradation
            .execute("svc", || Err(ApplicationError::service("primary", "failed")))
            .unwrap();
        assert_eq!(value, "second");
        assert_eq!(degradation.fallback_count("svc"), 2);
    }

    #[test]
    fn original_error_when_everything_fails() {
        let degradation: GracefulDegradation<()> = GracefulDegradation::new();
        degradation.register_fallback("svc", || Err(ApplicationError::network("down")), || false);

        let err = degradation
            .execute("svc", || Err(ApplicationError::validation("input", "bad input")))
            .unwrap_err();
        assert_eq!(err.error_code(), "ValidationError");
    }

    #[test]
    fn unknown_key_runs_primary_only() {
        let degradation: GracefulDegradation<u8> = GracefulDegradation::new();
        assert!(!degradation.has_fallback("none"));
        assert_eq!(degradation.execute("none", || Ok(5)).unwrap(), 5);
    }
}
