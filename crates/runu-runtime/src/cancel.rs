//! Cooperative cancellation for operations waiting on an instance lock.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared flag flipped by a signal handler to abort pending lock waits.
///
/// Clones observe the same flag. Cancellation only affects waiting: once
/// a lock is held the operation runs to completion.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates a token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let token = CancelToken::new();
        let handler_side = token.clone();
        assert!(!token.is_cancelled());
        handler_side.cancel();
        assert!(token.is_cancelled());
    }
}
