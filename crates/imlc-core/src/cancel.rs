//! Cooperative cancellation for a single benchmark run
//!
//! A [`CancellationScope`] is created per run by the orchestrator and handed to
//! the supervisor and the output scanner. Blocking work polls it at fixed
//! checkpoints (before and after every line read) instead of being preempted.

use crate::error::{Error, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared cancellation flag bound to one run
///
/// Clones share the same flag. Identity (not value) is what the supervisor
/// compares when a finished run clears its scope.
#[derive(Debug, Clone, Default)]
pub struct CancellationScope {
    flag: Arc<AtomicBool>,
}

impl CancellationScope {
    /// Create a fresh, untriggered scope
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Checkpoint: `Err(Error::Cancelled)` once the scope has been triggered
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Whether `other` is a clone of this scope
    #[must_use]
    pub fn same_scope(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.flag, &other.flag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_scope_is_not_cancelled() {
        let scope = CancellationScope::new();
        assert!(!scope.is_cancelled());
        assert!(scope.check().is_ok());
    }

    #[test]
    fn test_cancel_is_visible_through_clones() {
        let scope = CancellationScope::new();
        let shared = scope.clone();
        shared.cancel();
        assert!(scope.is_cancelled());
        assert!(matches!(scope.check(), Err(Error::Cancelled)));
    }

    #[test]
    fn test_cancel_across_threads() {
        let scope = CancellationScope::new();
        let remote = scope.clone();
        std::thread::spawn(move || remote.cancel())
            .join()
            .expect("join");
        assert!(scope.is_cancelled());
    }

    #[test]
    fn test_same_scope_identity() {
        let a = CancellationScope::new();
        let b = CancellationScope::new();
        assert!(a.same_scope(&a.clone()));
        assert!(!a.same_scope(&b));
    }
}
