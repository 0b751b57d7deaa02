//! Cooperative cancellation flag
//!
//! Downloads and generations never abort in-flight native work; they check a
//! shared flag at defined suspension points and wind down on their own.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared cancellation flag checked cooperatively by in-flight tasks.
///
/// Cloning yields another handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    inner: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn set(&self) {
        self.inner.store(true, Ordering::SeqCst);
    }

    /// Re-arm the flag for a fresh operation.
    pub fn clear(&self) {
        self.inner.store(false, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.inner.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_starts_clear() {
        let flag = CancelFlag::new();
        assert!(!flag.is_set());
    }

    #[test]
    fn test_set_is_visible_through_clones() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        flag.set();
        assert!(clone.is_set());
    }

    #[test]
    fn test_clear_rearms() {
        let flag = CancelFlag::new();
        flag.set();
        flag.clear();
        assert!(!flag.is_set());
    }
}
