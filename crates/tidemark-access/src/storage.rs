//! Durable backing for access tables.

use std::sync::RwLock;

use crate::error::{AccessError, AccessResult};
use crate::snapshot::Snapshot;

/// Where an [`AccessTable`](crate::AccessTable) persists its state.
///
/// Implementations must be thread-safe (`Send + Sync`). `save` should either
/// fully replace the previous snapshot or leave it untouched; callers may
/// abandon a crawl at any point and rely on the last good snapshot.
pub trait SnapshotStorage: Send + Sync {
    /// Read the stored snapshot. Returns `Ok(None)` if nothing was stored yet.
    fn load(&self) -> AccessResult<Option<Snapshot>>;

    /// Replace the stored snapshot.
    fn save(&self, snapshot: &Snapshot) -> AccessResult<()>;

    /// Delete the stored snapshot. Deleting nothing is not an error.
    fn clear(&self) -> AccessResult<()>;

    /// Human-readable location, used in log events.
    fn location(&self) -> String;
}

/// Keeps the last saved snapshot in memory.
///
/// Intended for tests and for crawls that only need incremental state within
/// one process.
#[derive(Debug, Default)]
pub struct MemorySnapshotStorage {
    snapshot: RwLock<Option<Snapshot>>,
}

impl MemorySnapshotStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing snapshot.
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            snapshot: RwLock::new(Some(snapshot)),
        }
    }
}

impl SnapshotStorage for MemorySnapshotStorage {
    fn load(&self) -> AccessResult<Option<Snapshot>> {
        let guard = self.snapshot.read().map_err(|_| AccessError::LockPoisoned)?;
        Ok(guard.clone())
    }

    fn save(&self, snapshot: &Snapshot) -> AccessResult<()> {
        let mut guard = self.snapshot.write().map_err(|_| AccessError::LockPoisoned)?;
        *guard = Some(snapshot.clone());
        Ok(())
    }

    fn clear(&self) -> AccessResult<()> {
        let mut guard = self.snapshot.write().map_err(|_| AccessError::LockPoisoned)?;
        *guard = None;
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}

impl<T: SnapshotStorage + ?Sized> SnapshotStorage for std::sync::Arc<T> {
    fn load(&self) -> AccessResult<Option<Snapshot>> {
        (**self).load()
    }

    fn save(&self, snapshot: &Snapshot) -> AccessResult<()> {
        (**self).save(snapshot)
    }

    fn clear(&self) -> AccessResult<()> {
        (**self).clear()
    }

    fn location(&self) -> String {
        (**self).location()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::SnapshotRecord;

    #[test]
    fn empty_storage_loads_none() {
        let storage = MemorySnapshotStorage::new();
        assert!(storage.load().unwrap().is_none());
    }

    #[test]
    fn save_then_load() {
        let storage = MemorySnapshotStorage::new();
        let snapshot = Snapshot::new(vec![SnapshotRecord::new("a")]);
        storage.save(&snapshot).unwrap();
        assert_eq!(storage.load().unwrap(), Some(snapshot));
    }

    #[test]
    fn clear_forgets_snapshot() {
        let storage = MemorySnapshotStorage::with_snapshot(Snapshot::new(vec![]));
        storage.clear().unwrap();
        assert!(storage.load().unwrap().is_none());
        storage.clear().unwrap();
    }
}
