use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Whether a view is waiting on a write.
///
/// Clones share the flag, so a renderer can keep one while the owning view is
/// mutably borrowed by its own submit.
#[derive(Debug, Clone, Default)]
pub struct BusyFlag(Arc<AtomicBool>);

impl BusyFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Sets the flag until the guard drops, or returns `None` if it is already set.
    pub(crate) fn try_enter(&self) -> Option<BusyGuard<'_>> {
        if self.0.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some(BusyGuard(&self.0))
    }
}

/// Clears the flag when the write finishes or its future is dropped.
pub(crate) struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_clears_flag_for_all_clones() {
        let flag = BusyFlag::new();
        let observer = flag.clone();

        let guard = flag.try_enter().unwrap();
        assert!(observer.is_set());
        assert!(flag.try_enter().is_none());

        drop(guard);
        assert!(!observer.is_set());
        assert!(flag.try_enter().is_some());
    }
}
