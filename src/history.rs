//! Linear undo/redo over immutable snapshots.

use log::debug;

/// Maximum number of snapshots kept.
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// Snapshot stack with a cursor at the "current" entry.
///
/// Pushing while the cursor is behind the tail discards the redo branch.
/// When the capacity is exceeded the oldest snapshot is evicted and the
/// cursor shifted down so it still points at the same snapshot.
#[derive(Debug, Clone)]
pub struct HistoryStack<T> {
    entries: Vec<T>,
    cursor: usize,
    capacity: usize,
    restoring: bool,
}

impl<T: Clone> Default for HistoryStack<T> {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl<T: Clone> HistoryStack<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            cursor: 0,
            capacity: capacity.max(1),
            restoring: false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn current(&self) -> Option<&T> {
        self.entries.get(self.cursor)
    }

    pub fn entries(&self) -> &[T] {
        &self.entries
    }

    pub fn is_restoring(&self) -> bool {
        self.restoring
    }

    /// Record a snapshot. Returns `false` without recording while a restore
    /// is in progress.
    pub fn push(&mut self, snapshot: T) -> bool {
        if self.restoring {
            debug!("history push suppressed during restore");
            return false;
        }
        if !self.entries.is_empty() && self.cursor + 1 < self.entries.len() {
            self.entries.truncate(self.cursor + 1);
        }
        self.entries.push(snapshot);
        self.cursor = self.entries.len() - 1;

        if self.entries.len() > self.capacity {
            self.entries.remove(0);
            self.cursor -= 1;
        }
        debug!(
            "history push: {} entries, cursor {}",
            self.entries.len(),
            self.cursor
        );
        true
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }

    pub fn undo(&mut self) -> Option<T> {
        if !self.can_undo() {
            return None;
        }
        self.cursor -= 1;
        self.entries.get(self.cursor).cloned()
    }

    pub fn redo(&mut self) -> Option<T> {
        if !self.can_redo() {
            return None;
        }
        self.cursor += 1;
        self.entries.get(self.cursor).cloned()
    }

    /// Run `f` with recording suspended. Pushes made inside `f` are dropped.
    ///
    /// The flag is cleared again on every exit path, including unwinding.
    pub fn restoring<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        struct Reset<'a, T: Clone>(&'a mut HistoryStack<T>);

        impl<T: Clone> Drop for Reset<'_, T> {
            fn drop(&mut self) {
                self.0.restoring = false;
            }
        }

        self.restoring = true;
        let guard = Reset(self);
        f(&mut *guard.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undo_redo_roundtrip() {
        let mut h = HistoryStack::new();
        h.push(0);
        h.push(1);
        h.push(2);
        assert_eq!(h.undo(), Some(1));
        assert_eq!(h.undo(), Some(0));
        assert_eq!(h.undo(), None);
        assert_eq!(h.redo(), Some(1));
        assert_eq!(h.redo(), Some(2));
        assert_eq!(h.redo(), None);
    }

    #[test]
    fn test_empty_history_noops() {
        let mut h: HistoryStack<u32> = HistoryStack::new();
        assert!(!h.can_undo());
        assert!(!h.can_redo());
        assert_eq!(h.undo(), None);
        assert_eq!(h.redo(), None);
        assert_eq!(h.current(), None);
    }

    #[test]
    fn test_push_truncates_redo_branch() {
        let mut h = HistoryStack::new();
        for i in 0..4 {
            h.push(i);
        }
        h.undo();
        h.undo();
        h.push(10);
        assert_eq!(h.entries(), &[0, 1, 10]);
        assert_eq!(h.redo(), None);
        assert_eq!(h.current(), Some(&10));
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut h = HistoryStack::new();
        for i in 0..60 {
            h.push(i);
        }
        assert_eq!(h.len(), 50);
        assert_eq!(h.entries()[0], 10);
        assert_eq!(h.cursor(), 49);
        assert_eq!(h.current(), Some(&59));
    }

    #[test]
    fn test_capacity_eviction_after_undo() {
        let mut h = HistoryStack::with_capacity(3);
        h.push(1);
        h.push(2);
        h.push(3);
        h.undo();
        // Truncates to [1, 2], then [1, 2, 4] fits.
        h.push(4);
        assert_eq!(h.entries(), &[1, 2, 4]);
        h.push(5);
        assert_eq!(h.entries(), &[2, 4, 5]);
        assert_eq!(h.current(), Some(&5));
    }

    #[test]
    fn test_push_suppressed_while_restoring() {
        let mut h = HistoryStack::new();
        h.push(1);
        let recorded = h.restoring(|h| h.push(2));
        assert!(!recorded);
        assert!(!h.is_restoring());
        assert_eq!(h.entries(), &[1]);
        assert!(h.push(3));
    }

    #[test]
    fn test_restoring_flag_cleared_on_panic() {
        let mut h: HistoryStack<u32> = HistoryStack::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            h.restoring(|_| panic!("restore failed"));
        }));
        assert!(result.is_err());
        assert!(!h.is_restoring());
    }
}
