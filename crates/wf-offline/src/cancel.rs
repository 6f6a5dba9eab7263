//! Cooperative cancellation

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{OfflineError, OfflineResult};

/// Shared cancel flag for one batch run.
///
/// Cloning shares the flag. Pipeline stages call [`CancelToken::check`] at
/// their yield points and bail out with [`OfflineError::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Check if cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once cancellation was requested
    #[inline]
    pub fn check(&self) -> OfflineResult<()> {
        if self.is_cancelled() {
            Err(OfflineError::Cancelled)
        } else {
            Ok(())
        }
    }
}
