//! Cancellation for blocking waits on project rules.
//!
//! A [`CancellationToken`] handed to `map_with_cancel`/`unmap_with_cancel`
//! lets another thread interrupt a caller that is still waiting for the
//! project's scheduling rule. Once the rule is held the operation runs to
//! completion; the token is not consulted again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared interruption flag.
///
/// Clones observe the same state, so one clone can be given to the waiting
/// thread and another kept by whoever may want to interrupt it.
///
/// ```
/// use team_core::cancel::CancellationToken;
///
/// let token = CancellationToken::new();
/// let remote = token.clone();
/// remote.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interrupt every wait observing this token.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Return an error if cancellation was requested.
    pub fn check(&self) -> Result<(), CancelledError> {
        if self.is_cancelled() {
            Err(CancelledError)
        } else {
            Ok(())
        }
    }
}

/// Error returned when a wait was interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelledError;

impl std::fmt::Display for CancelledError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Wait was interrupted")
    }
}

impl std::error::Error for CancelledError {}

impl From<CancelledError> for crate::error::TeamError {
    fn from(_: CancelledError) -> Self {
        crate::error::TeamError::Interrupted
    }
}
