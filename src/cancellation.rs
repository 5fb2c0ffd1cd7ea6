//! Cooperative cancellation.
//!
//! A [`CancellationToken`] is a shared flag. Retry loops check it before each
//! attempt and while sleeping between attempts; timeout-bounded operations
//! receive one that is cancelled when their deadline passes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

// Upper bound on how long `sleep` goes without checking the flag.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// A clonable cancellation signal.
///
/// Clones share the same flag. Child tokens are cancelled when any ancestor
/// is cancelled, but cancelling a child leaves the parent untouched.
///
/// # Examples
///
/// ```
/// use ferrous_bulwark::CancellationToken;
///
/// let parent = CancellationToken::new();
/// let child = parent.child_token();
///
/// child.cancel();
/// assert!(!parent.is_cancelled());
///
/// let other_child = parent.child_token();
/// parent.cancel();
/// assert!(other_child.is_cancelled());
/// assert!(other_child.throw_if_cancelled().is_err());
/// ```
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<CancellationTokenInner>,
}

struct CancellationTokenInner {
    cancelled: AtomicBool,
    parent: Option<CancellationToken>,
    created_at: Instant,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CancellationTokenInner {
                cancelled: AtomicBool::new(false),
                parent: None,
                created_at: Instant::now(),
            }),
        }
    }

    /// Creates a token cancelled together with this one.
    pub fn child_token(&self) -> Self {
        Self {
            inner: Arc::new(CancellationTokenInner {
                cancelled: AtomicBool::new(false),
                parent: Some(self.clone()),
                created_at: Instant::now(),
            }),
        }
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.inner.cancelled.load(Ordering::Acquire) {
            return true;
        }
        match self.inner.parent {
            Some(ref parent) => parent.is_cancelled(),
            None => false,
        }
    }

    /// # Errors
    ///
    /// Returns [`CancellationError`] if cancellation was requested.
    pub fn throw_if_cancelled(&self) -> Result<(), CancellationError> {
        if self.is_cancelled() {
            Err(CancellationError::new("Operation was cancelled"))
        } else {
            Ok(())
        }
    }

    /// Blocks for `duration` unless cancelled first.
    ///
    /// Returns early with an error once cancellation is observed; the flag
    /// is polled at least every few milliseconds.
    /// A duration too large to form a deadline sleeps until cancelled.
    pub fn sleep(&self, duration: Duration) -> Result<(), CancellationError> {
        let deadline = Instant::now().checked_add(duration);
        loop {
            self.throw_if_cancelled()?;
            let now = Instant::now();
            let remaining = match deadline {
                Some(deadline) if now >= deadline => return Ok(()),
                Some(deadline) => deadline - now,
                None => POLL_INTERVAL,
            };
            std::thread::sleep(remaining.min(POLL_INTERVAL));
        }
    }

    /// Completes once cancellation is requested.
    #[cfg(feature = "async")]
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.inner.created_at.elapsed()
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Returned when work is abandoned because of cancellation.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Cancellation error: {message}")]
pub struct CancellationError {
    message: String,
}

impl CancellationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
