//! Lock-free snapshot cache with atomic swapping
//!
//! Backend data (hierarchy, catalog) is fetched asynchronously and read
//! synchronously. Readers never see a half-loaded value: a cell is either
//! `Pending`, `Ready` with an immutable value, or `Failed`.

use arc_swap::ArcSwap;
use chrono::{DateTime, Duration, Utc};
use ctrack_common::{TrackerError, TrackerResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Load state of a snapshot
#[derive(Debug)]
pub enum SnapshotState<T> {
    /// Never loaded, or invalidated
    Pending,
    Ready {
        value: Arc<T>,
        fetched_at: DateTime<Utc>,
    },
    /// Last fetch failed
    Failed { reason: String, at: DateTime<Utc> },
}

/// Atomically swappable snapshot
pub struct SnapshotCell<T> {
    name: &'static str,
    state: ArcSwap<SnapshotState<T>>,
    /// Bumped on every transition
    version: AtomicU64,
}

impl<T> SnapshotCell<T> {
    /// Create a pending cell; `name` is used in error messages
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: ArcSwap::from_pointee(SnapshotState::Pending),
            version: AtomicU64::new(0),
        }
    }

    /// Create a cell that is already loaded
    pub fn ready(name: &'static str, value: T) -> Self {
        let cell = Self::new(name);
        cell.set_ready(value);
        cell
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Current state (for inspection)
    pub fn state(&self) -> Arc<SnapshotState<T>> {
        self.state.load_full()
    }

    /// The loaded value, or `StaleSnapshot` while pending or failed
    pub fn get(&self) -> TrackerResult<Arc<T>> {
        match self.state.load().as_ref() {
            SnapshotState::Ready { value, .. } => Ok(Arc::clone(value)),
            SnapshotState::Pending => Err(TrackerError::StaleSnapshot(format!("{} is still loading", self.name))),
            SnapshotState::Failed { reason, .. } => {
                Err(TrackerError::StaleSnapshot(format!("{} failed to load: {reason}", self.name)))
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state.load().as_ref(), SnapshotState::Ready { .. })
    }

    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        match self.state.load().as_ref() {
            SnapshotState::Ready { fetched_at, .. } => Some(*fetched_at),
            _ => None,
        }
    }

    /// True when not ready or fetched more than `max_age` ago
    pub fn is_older_than(&self, max_age: Duration) -> bool {
        match self.fetched_at() {
            Some(fetched_at) => Utc::now() - fetched_at > max_age,
            None => true,
        }
    }

    /// Atomically publish a freshly fetched value
    pub fn set_ready(&self, value: T) {
        self.store(SnapshotState::Ready {
            value: Arc::new(value),
            fetched_at: Utc::now(),
        });
    }

    /// Record a failed fetch; readers get `StaleSnapshot` until the next success
    pub fn set_failed(&self, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(snapshot = self.name, %reason, "snapshot fetch failed");
        self.store(SnapshotState::Failed { reason, at: Utc::now() });
    }

    /// Drop the loaded value and return to `Pending`
    pub fn invalidate(&self) {
        self.store(SnapshotState::Pending);
    }

    fn store(&self, state: SnapshotState<T>) {
        self.state.store(Arc::new(state));
        self.version.fetch_add(1, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_then_ready() {
        let cell: SnapshotCell<Vec<u32>> = SnapshotCell::new("numbers");
        assert!(matches!(cell.get(), Err(TrackerError::StaleSnapshot(_))));
        assert!(cell.is_older_than(Duration::hours(1)));

        cell.set_ready(vec![1, 2, 3]);
        assert_eq!(cell.get().unwrap().len(), 3);
        assert!(!cell.is_older_than(Duration::hours(1)));
        assert_eq!(cell.version(), 1);
    }

    #[test]
    fn test_failed_and_invalidate() {
        let cell = SnapshotCell::ready("numbers", vec![1u32]);
        let held = cell.get().unwrap();

        cell.set_failed("connection refused");
        let err = cell.get().unwrap_err();
        assert!(err.to_string().contains("connection refused"));
        // readers holding the old value are unaffected
        assert_eq!(held.as_slice(), &[1]);

        cell.set_ready(vec![7]);
        cell.invalidate();
        assert!(!cell.is_ready());
        assert!(cell.fetched_at().is_none());
        assert_eq!(cell.version(), 4);
    }

    #[test]
    fn test_zero_max_age_is_always_stale() {
        let cell = SnapshotCell::ready("numbers", ());
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(cell.is_older_than(Duration::zero()));
    }
}
