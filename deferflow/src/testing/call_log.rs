//! Ordered call recorder.

use parking_lot::Mutex;
use std::sync::Arc;

/// Thread-safe, cloneable log of named calls in the order they happened.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    pub fn record(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    /// Returns a closure that appends `entry` when called.
    pub fn recorder(&self, entry: impl Into<String>) -> impl FnOnce() + Send + 'static {
        let log = self.clone();
        let entry = entry.into();
        move || log.record(entry)
    }

    /// Returns a snapshot of all entries.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Returns the number of times `entry` was recorded.
    #[must_use]
    pub fn count(&self, entry: &str) -> usize {
        self.entries.lock().iter().filter(|e| *e == entry).count()
    }

    /// Clears the log.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_recorder() {
        let log = CallLog::new();
        log.record("a");
        let record_b = log.recorder("b");
        assert_eq!(log.len(), 1);

        record_b();
        assert_eq!(log.entries(), vec!["a", "b"]);
        assert_eq!(log.count("a"), 1);
    }

    #[test]
    fn test_clones_share_entries() {
        let log = CallLog::new();
        log.clone().record("x");
        assert!(!log.is_empty());

        log.clear();
        assert!(log.is_empty());
    }
}
