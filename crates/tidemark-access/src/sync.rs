//! Thread-safe wrapper around [`AccessTable`].
//!
//! [`SyncAccessData`] holds the table behind a `RwLock`: mutations are
//! mutually exclusive, lookups run concurrently with each other.
//!
//! Iterators returned by this wrapper do not hold the lock between items.
//! Each step takes a short read lock and resumes from where the previous one
//! stopped, so callers may remove identifiers while iterating and may
//! abandon an iteration at any time. Changes made concurrently may or may
//! not be observed by an iteration in progress.

use std::collections::BTreeSet;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tidemark_types::{CrawlToken, PropertyMap};

use crate::error::{AccessError, AccessResult};
use crate::storage::SnapshotStorage;
use crate::table::AccessTable;
use crate::traits::{AccessData, IdIter};

/// An [`AccessTable`] shared behind a `RwLock`.
#[derive(Debug, Default)]
pub struct SyncAccessData {
    table: RwLock<AccessTable>,
}

impl SyncAccessData {
    /// Empty, uninitialized, in-memory only.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_table(table: AccessTable) -> Self {
        Self {
            table: RwLock::new(table),
        }
    }

    /// Empty, uninitialized, persisting to `storage`.
    pub fn with_storage(storage: impl SnapshotStorage + 'static) -> Self {
        Self::from_table(AccessTable::with_storage(storage))
    }

    /// Load from `storage` and initialize a crawl cycle.
    pub fn open(storage: impl SnapshotStorage + 'static) -> AccessResult<Self> {
        AccessTable::open(storage).map(Self::from_table)
    }

    /// Replace the in-memory state with the stored snapshot.
    pub fn load(&self) -> AccessResult<bool> {
        self.write()?.load()
    }

    pub fn into_inner(self) -> AccessResult<AccessTable> {
        self.table.into_inner().map_err(|_| AccessError::LockPoisoned)
    }

    fn read(&self) -> AccessResult<RwLockReadGuard<'_, AccessTable>> {
        self.table.read().map_err(|_| AccessError::LockPoisoned)
    }

    fn write(&self) -> AccessResult<RwLockWriteGuard<'_, AccessTable>> {
        self.table.write().map_err(|_| AccessError::LockPoisoned)
    }

    fn require_initialized(&self) -> AccessResult<()> {
        if self.read()?.is_initialized() {
            Ok(())
        } else {
            Err(AccessError::NotInitialized)
        }
    }
}

impl AccessData for SyncAccessData {
    fn initialize(&self) -> AccessResult<CrawlToken> {
        Ok(self.write()?.initialize())
    }

    fn store(&self) -> AccessResult<()> {
        // Writers are excluded for the duration of the save.
        self.read()?.store()
    }

    fn clear(&self) -> AccessResult<()> {
        self.write()?.clear()
    }

    fn crawl_token(&self) -> AccessResult<Option<CrawlToken>> {
        Ok(self.read()?.crawl_token())
    }

    fn get(&self, id: &str, key: &str) -> AccessResult<Option<String>> {
        Ok(self.read()?.get(id, key).map(str::to_owned))
    }

    fn properties(&self, id: &str) -> AccessResult<Option<PropertyMap>> {
        Ok(self.read()?.properties(id).cloned())
    }

    fn put(&self, id: &str, key: &str, value: &str) -> AccessResult<()> {
        self.write()?.put(id, key, value)
    }

    fn remove_property(&self, id: &str, key: &str) -> AccessResult<()> {
        self.write()?.remove_property(id, key)
    }

    fn remove(&self, id: &str) -> AccessResult<usize> {
        self.write()?.remove(id)
    }

    fn is_known_id(&self, id: &str) -> AccessResult<bool> {
        Ok(self.read()?.is_known_id(id))
    }

    fn size(&self) -> AccessResult<usize> {
        Ok(self.read()?.len())
    }

    fn stored_ids(&self) -> AccessResult<BTreeSet<String>> {
        Ok(self.read()?.stored_ids())
    }

    fn put_referred_id(&self, id: &str, referred: &str) -> AccessResult<()> {
        self.write()?.put_referred_id(id, referred)
    }

    fn referred_ids(&self, id: &str) -> AccessResult<BTreeSet<String>> {
        Ok(self.read()?.referred_ids(id))
    }

    fn remove_referred_id(&self, id: &str, referred: &str) -> AccessResult<()> {
        self.write()?.remove_referred_id(id, referred).map(drop)
    }

    fn remove_referred_ids(&self, id: &str) -> AccessResult<()> {
        self.write()?.remove_referred_ids(id)
    }

    fn put_aggregated_id(&self, parent: &str, child: &str) -> AccessResult<()> {
        self.write()?.put_aggregated_id(parent, child)
    }

    fn aggregated_ids(&self, id: &str) -> AccessResult<BTreeSet<String>> {
        Ok(self.read()?.aggregated_ids(id))
    }

    fn aggregating_id(&self, id: &str) -> AccessResult<Option<String>> {
        Ok(self.read()?.aggregating_id(id).map(str::to_owned))
    }

    fn aggregated_ids_closure(&self, id: &str) -> AccessResult<IdIter<'_>> {
        self.require_initialized()?;
        Ok(Box::new(ClosureCursor {
            data: self,
            root: Some(id.to_string()),
            stack: Vec::new(),
        }))
    }

    fn remove_aggregated_id(&self, parent: &str, child: &str) -> AccessResult<()> {
        self.write()?.remove_aggregated_id(parent, child).map(drop)
    }

    fn touch(&self, id: &str) -> AccessResult<()> {
        self.write()?.touch(id)
    }

    fn touch_recursively(&self, id: &str) -> AccessResult<usize> {
        self.write()?.touch_recursively(id)
    }

    fn is_touched(&self, id: &str) -> AccessResult<bool> {
        Ok(self.read()?.is_touched(id))
    }

    fn untouched_ids(&self) -> AccessResult<IdIter<'_>> {
        self.require_initialized()?;
        Ok(Box::new(UntouchedCursor {
            data: self,
            after: None,
            done: false,
        }))
    }

    fn remove_untouched_ids(&self) -> AccessResult<usize> {
        self.write()?.remove_untouched_ids()
    }
}

/// Depth-first closure walk that re-reads the children of each node as it
/// is reached. Pending siblings are kept on an explicit stack.
struct ClosureCursor<'a> {
    data: &'a SyncAccessData,
    root: Option<String>,
    stack: Vec<std::vec::IntoIter<String>>,
}

impl Iterator for ClosureCursor<'_> {
    type Item = AccessResult<String>;

    fn next(&mut self) -> Option<Self::Item> {
        let next = match self.root.take() {
            Some(root) => root,
            None => loop {
                let top = self.stack.last_mut()?;
                match top.next() {
                    Some(child) => break child,
                    None => {
                        self.stack.pop();
                    }
                }
            },
        };
        let children: Vec<String> = match self.data.read() {
            Ok(table) => table.aggregated_ids(&next).into_iter().collect(),
            Err(e) => {
                self.stack.clear();
                return Some(Err(e));
            }
        };
        if !children.is_empty() {
            self.stack.push(children.into_iter());
        }
        Some(Ok(next))
    }
}

/// Walks untouched identifiers in key order, resuming after the last one
/// returned.
struct UntouchedCursor<'a> {
    data: &'a SyncAccessData,
    after: Option<String>,
    done: bool,
}

impl Iterator for UntouchedCursor<'_> {
    type Item = AccessResult<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let table = match self.data.read() {
            Ok(table) => table,
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };
        if !table.is_initialized() {
            self.done = true;
            return Some(Err(AccessError::NotInitialized));
        }
        match table.next_untouched_after(self.after.as_deref()).map(str::to_owned) {
            Some(id) => {
                drop(table);
                self.after = Some(id.clone());
                Some(Ok(id))
            }
            None => {
                self.done = true;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn active() -> SyncAccessData {
        let data = SyncAccessData::new();
        data.initialize().unwrap();
        data
    }

    #[test]
    fn untouched_cursor_allows_removal_while_iterating() {
        let data = active();
        for id in ["a", "b", "c", "d"] {
            data.put(id, "k", "v").unwrap();
        }
        data.touch("b").unwrap();

        let mut seen = Vec::new();
        for id in data.untouched_ids().unwrap() {
            let id = id.unwrap();
            data.remove(&id).unwrap();
            seen.push(id);
        }
        assert_eq!(seen, vec!["a", "c", "d"]);
        assert_eq!(data.stored_ids().unwrap(), BTreeSet::from(["b".to_string()]));
    }

    #[test]
    fn untouched_cursor_walks_property_ids_only() {
        let data = active();
        data.put_referred_id("page:/linker", "page:/x").unwrap();
        data.put("page:/stale", "k", "v").unwrap();
        data.put_aggregated_id("page:/index", "page:/a").unwrap();
        data.touch_recursively("page:/index").unwrap();

        let ids: Vec<String> = data.untouched_ids().unwrap().collect::<AccessResult<_>>().unwrap();
        assert_eq!(ids, vec!["page:/stale"]);
        assert_eq!(data.remove_untouched_ids().unwrap(), 2);
        assert!(!data.is_known_id("page:/linker").unwrap());
    }

    #[test]
    fn untouched_cursor_stops_after_clear() {
        let data = active();
        data.put("a", "k", "v").unwrap();
        data.put("b", "k", "v").unwrap();

        let mut iter = data.untouched_ids().unwrap();
        assert_eq!(iter.next().unwrap().unwrap(), "a");
        data.clear().unwrap();
        assert!(matches!(iter.next(), Some(Err(AccessError::NotInitialized))));
        assert!(iter.next().is_none());
    }

    #[test]
    fn closure_cursor_matches_table_closure() {
        let data = active();
        data.put_aggregated_id("r", "a").unwrap();
        data.put_aggregated_id("r", "b").unwrap();
        data.put_aggregated_id("a", "a1").unwrap();

        let ids: Vec<String> = data
            .aggregated_ids_closure("r")
            .unwrap()
            .collect::<AccessResult<_>>()
            .unwrap();
        assert_eq!(ids, vec!["r", "a", "a1", "b"]);
    }

    #[test]
    fn iterators_require_initialize() {
        let data = SyncAccessData::new();
        assert!(matches!(data.untouched_ids(), Err(AccessError::NotInitialized)));
        assert!(matches!(
            data.aggregated_ids_closure("x"),
            Err(AccessError::NotInitialized)
        ));
    }

    #[test]
    fn concurrent_writers_and_readers() {
        let data = Arc::new(active());

        let writers: Vec<_> = (0..4)
            .map(|t| {
                let data = Arc::clone(&data);
                thread::spawn(move || {
                    for i in 0..250 {
                        let id = format!("file:/{t}/{i}");
                        data.put(&id, "byteSize", &i.to_string()).unwrap();
                        data.put_aggregated_id(&format!("folder:/{t}"), &id).unwrap();
                        data.touch(&id).unwrap();
                    }
                })
            })
            .collect();
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let data = Arc::clone(&data);
                thread::spawn(move || {
                    for _ in 0..100 {
                        let _ = data.size().unwrap();
                        let _ = data.is_known_id("file:/0/0").unwrap();
                    }
                })
            })
            .collect();

        for h in writers.into_iter().chain(readers) {
            h.join().expect("thread should not panic");
        }
        // 1000 files + 4 folders
        assert_eq!(data.size().unwrap(), 1004);
        assert_eq!(data.aggregated_ids("folder:/2").unwrap().len(), 250);
    }

    #[test]
    fn independent_stores_have_independent_tokens() {
        let a = active();
        let b = active();
        a.touch("x").unwrap();
        b.put("x", "k", "v").unwrap();
        assert_ne!(a.crawl_token().unwrap(), b.crawl_token().unwrap());
        assert!(a.is_touched("x").unwrap());
        assert!(!b.is_touched("x").unwrap());
    }

    #[test]
    fn into_inner_returns_table() {
        let data = active();
        data.put("a", "k", "v").unwrap();
        let table = data.into_inner().unwrap();
        assert_eq!(table.get("a", "k"), Some("v"));
    }
}
