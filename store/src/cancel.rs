//! Cooperative cancellation for in-flight operations.
//!
//! Every public store operation takes a token and checks it between
//! statements. A fired token rolls back the surrounding transaction and
//! surfaces [`Error::Cancelled`]. Timeouts are the caller's concern: arm a
//! timer that calls [`CancellationToken::cancel`].

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cloneable cancellation flag shared between a caller and an operation.
///
/// Cloning is cheap; clones observe the same flag. A token that is never
/// cancelled adds two atomic loads per operation.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a fresh, un-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the token. All clones observe the cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Whether the token has fired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Return `Err(Cancelled)` if the token has fired.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] once [`CancellationToken::cancel`] has
    /// been called on this token or any clone of it.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StatusCode;

    #[test]
    fn test_fresh_token_passes() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.check().is_ok());
    }

    #[test]
    fn test_clones_share_the_flag() {
        let token = CancellationToken::new();
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
        assert_eq!(
            clone.check().unwrap_err().status_code(),
            StatusCode::Cancelled
        );
    }
}
