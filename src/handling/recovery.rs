use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{AppResult, ApplicationError, ErrorCategory};

type Strategy<T> = Arc<dyn Fn(&ApplicationError) -> AppResult<T> + Send + Sync>;

/// Recovery strategies keyed by [`ErrorCategory`].
///
/// A failed operation is handed to the strategy registered for its
/// category. If there is none, or the strategy fails too, the original
/// error is returned.
///
/// # Examples
///
/// ```
/// use ferrous_bulwark::{ApplicationError, ErrorCategory, ErrorRecovery};
///
/// let recovery = ErrorRecovery::new();
/// recovery.register_strategy(ErrorCategory::ExternalService, |_| Ok(Vec::<String>::new()));
///
/// let items = recovery.run(|| Err(ApplicationError::network("feed offline")));
/// assert!(items.unwrap().is_empty());
///
/// let err = recovery.run(|| Err::<Vec<String>, _>(ApplicationError::validation("q", "empty")));
/// assert_eq!(err.unwrap_err().error_code(), "ValidationError");
/// ```
pub struct ErrorRecovery<T> {
    strategies: RwLock<Vec<(ErrorCategory, Strategy<T>)>>,
}

impl<T> Default for ErrorRecovery<T> {
    fn default() -> Self {
        Self {
            strategies: RwLock::new(Vec::new()),
        }
    }
}

impl<T> ErrorRecovery<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the strategy for `category`, replacing any earlier one.
    pub fn register_strategy<S>(&self, category: ErrorCategory, strategy: S)
    where
        S: Fn(&ApplicationError) -> AppResult<T> + Send + Sync + 'static,
    {
        let mut strategies = self.strategies.write();
        strategies.retain(|(existing, _)| *existing != category);
        strategies.push((category, Arc::new(strategy)));
    }

    pub fn has_strategy(&self, category: ErrorCategory) -> bool {
        self.strategies.read().iter().any(|(c, _)| *c == category)
    }

    /// Attempts to recover from `error`.
    pub fn recover(&self, error: ApplicationError) -> AppResult<T> {
        let strategy = self
            .strategies
            .read()
            .iter()
            .find(|(category, _)| *category == error.category())
            .map(|(_, strategy)| Arc::clone(strategy));

        let Some(strategy) = strategy else {
            return Err(error);
        };

        tracing::info!(
            category = %error.category(),
            error_code = error.error_code(),
            "attempting error recovery"
        );
        strategy(&error).map_err(|recovery_error| {
            tracing::error!(
                error_code = error.error_code(),
                "recovery strategy failed: {}",
                recovery_error
            );
            error
        })
    }

    /// Runs `f`, recovering from its error if a strategy applies.
    pub fn run<F>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce() -> AppResult<T>,
    {
        f().or_else(|error| self.recover(error))
    }
}

impl<T> std::fmt::Debug for ErrorRecovery<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let categories: Vec<ErrorCategory> = self.strategies.read().iter().map(|(c, _)| *c).collect();
        f.debug_struct("ErrorRecovery").field("categories", &categories).finish()
    }
}
