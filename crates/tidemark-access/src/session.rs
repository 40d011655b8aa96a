//! Per-crawl change classification.
//!
//! A [`CrawlSession`] wraps one crawl cycle over an [`AccessData`] store:
//! it rotates the crawl token, classifies each observed object against what
//! the previous crawl recorded, and reaps whatever was not observed when the
//! crawl finishes.
//!
//! ```text
//! begin ──observe*──> finish   (reap + store)
//!                 └─> abandon  (store only)
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use tidemark_types::{keys, CrawlToken};
use tracing::{debug, info};

use crate::error::AccessResult;
use crate::traits::AccessData;

/// How an observed object compares with the previous crawl.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectState {
    /// No properties were stored for the identifier.
    New,
    /// At least one fingerprint property differs from the stored value.
    Changed,
    /// Every fingerprint property matches the stored value.
    Unchanged,
}

/// Counts collected over one crawl cycle.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlReport {
    pub new: usize,
    pub changed: usize,
    pub unchanged: usize,
    /// Identifiers reaped at the end of the crawl.
    pub removed: usize,
}

impl CrawlReport {
    /// Number of observations recorded during the crawl.
    pub fn observed(&self) -> usize {
        self.new + self.changed + self.unchanged
    }

    /// Returns `true` if nothing was added, changed or removed.
    pub fn is_clean(&self) -> bool {
        self.new == 0 && self.changed == 0 && self.removed == 0
    }

    fn record(&mut self, state: ObjectState) {
        match state {
            ObjectState::New => self.new += 1,
            ObjectState::Changed => self.changed += 1,
            ObjectState::Unchanged => self.unchanged += 1,
        }
    }
}

impl fmt::Display for CrawlReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} new, {} changed, {} unchanged, {} removed",
            self.new, self.changed, self.unchanged, self.removed
        )
    }
}

/// One crawl cycle over a store.
pub struct CrawlSession<'a, S: AccessData + ?Sized> {
    store: &'a S,
    token: CrawlToken,
    report: CrawlReport,
}

impl<'a, S: AccessData + ?Sized> CrawlSession<'a, S> {
    /// Start a new crawl cycle. Existing state is kept; only the crawl token
    /// is rotated.
    pub fn begin(store: &'a S) -> AccessResult<Self> {
        let token = store.initialize()?;
        debug!(%token, "crawl session started");
        Ok(Self {
            store,
            token,
            report: CrawlReport::default(),
        })
    }

    pub fn token(&self) -> CrawlToken {
        self.token
    }

    pub fn store(&self) -> &'a S {
        self.store
    }

    /// Counts so far. `removed` stays zero until [`finish`](Self::finish).
    pub fn report(&self) -> &CrawlReport {
        &self.report
    }

    /// Record that `id` exists at the source with the given fingerprint
    /// properties (e.g. [`keys::DATE`], [`keys::BYTE_SIZE`],
    /// [`keys::CONTENT_HASH`]).
    ///
    /// Stored properties not named in `fingerprint` are left alone.
    pub fn observe(&mut self, id: &str, fingerprint: &[(&str, &str)]) -> AccessResult<ObjectState> {
        let state = match self.store.properties(id)? {
            None => ObjectState::New,
            Some(stored) => {
                let differs = fingerprint
                    .iter()
                    .any(|(key, value)| stored.get(key) != Some(*value));
                if differs {
                    ObjectState::Changed
                } else {
                    ObjectState::Unchanged
                }
            }
        };
        if state != ObjectState::Unchanged {
            for (key, value) in fingerprint {
                self.store.put(id, key, value)?;
            }
        }
        self.store.touch(id)?;
        self.report.record(state);
        debug!(id, ?state, "observed");
        Ok(state)
    }

    /// Keep `id` and everything it aggregates without revisiting them, e.g.
    /// a folder whose modification date shows its contents are unchanged.
    /// Returns the number of identifiers kept.
    ///
    /// Only identifiers not already observed in this crawl are added to the
    /// report's `unchanged` count.
    pub fn observe_unchanged_subtree(&mut self, id: &str) -> AccessResult<usize> {
        let mut fresh = 0;
        for member in self.store.aggregated_ids_closure(id)? {
            if !self.store.is_touched(&member?)? {
                fresh += 1;
            }
        }
        let kept = self.store.touch_recursively(id)?;
        self.report.unchanged += fresh;
        debug!(id, kept, fresh, "kept unchanged subtree");
        Ok(kept)
    }

    /// Record that `parent` contains `child` at the source.
    pub fn aggregate(&self, parent: &str, child: &str) -> AccessResult<()> {
        self.store.put_aggregated_id(parent, child)
    }

    /// Whether `id` was observed, or kept, in this crawl.
    pub fn is_observed(&self, id: &str) -> AccessResult<bool> {
        self.store.is_touched(id)
    }

    /// Complete the crawl: remove everything that was not observed and
    /// persist the result.
    pub fn finish(mut self) -> AccessResult<CrawlReport> {
        self.report.removed = self.store.remove_untouched_ids()?;
        self.store.store()?;
        info!(
            token = %self.token,
            new = self.report.new,
            changed = self.report.changed,
            unchanged = self.report.unchanged,
            removed = self.report.removed,
            "crawl finished"
        );
        Ok(self.report)
    }

    /// Stop an incomplete crawl. Nothing is reaped, since objects not yet
    /// visited may still exist; what was observed so far is persisted.
    pub fn abandon(self) -> AccessResult<CrawlReport> {
        self.store.store()?;
        info!(token = %self.token, observed = self.report.observed(), "crawl abandoned");
        Ok(self.report)
    }
}

/// Whether `key` is a property a crawler would use as a fingerprint.
pub fn is_fingerprint_key(key: &str) -> bool {
    matches!(key, keys::DATE | keys::BYTE_SIZE | keys::CONTENT_HASH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemorySnapshotStorage, SnapshotStorage};
    use crate::sync::SyncAccessData;
    use std::sync::Arc;

    fn file(date: &str, size: &str) -> [(&'static str, String); 2] {
        [(keys::DATE, date.to_string()), (keys::BYTE_SIZE, size.to_string())]
    }

    fn observe(session: &mut CrawlSession<'_, SyncAccessData>, id: &str, props: &[(&str, String)]) -> ObjectState {
        let pairs: Vec<(&str, &str)> = props.iter().map(|(k, v)| (*k, v.as_str())).collect();
        session.observe(id, &pairs).unwrap()
    }

    // --- classification -------------------------------------------------

    #[test]
    fn first_crawl_sees_everything_new() {
        let data = SyncAccessData::new();
        let mut session = CrawlSession::begin(&data).unwrap();
        assert_eq!(observe(&mut session, "file:/a", &file("1", "10")), ObjectState::New);
        assert_eq!(observe(&mut session, "file:/b", &file("1", "20")), ObjectState::New);

        let report = session.finish().unwrap();
        assert_eq!(report.new, 2);
        assert_eq!(report.removed, 0);
        assert_eq!(data.get("file:/a", keys::BYTE_SIZE).unwrap().as_deref(), Some("10"));
    }

    #[test]
    fn second_crawl_classifies_and_reaps() {
        let data = SyncAccessData::new();
        let mut first = CrawlSession::begin(&data).unwrap();
        observe(&mut first, "file:/same", &file("1", "10"));
        observe(&mut first, "file:/edited", &file("1", "10"));
        observe(&mut first, "file:/deleted", &file("1", "10"));
        first.finish().unwrap();

        let mut second = CrawlSession::begin(&data).unwrap();
        assert_eq!(observe(&mut second, "file:/same", &file("1", "10")), ObjectState::Unchanged);
        assert_eq!(observe(&mut second, "file:/edited", &file("2", "11")), ObjectState::Changed);
        assert_eq!(observe(&mut second, "file:/added", &file("2", "5")), ObjectState::New);
        let report = second.finish().unwrap();

        assert_eq!(
            report,
            CrawlReport { new: 1, changed: 1, unchanged: 1, removed: 1 }
        );
        assert!(!data.is_known_id("file:/deleted").unwrap());
        assert_eq!(data.get("file:/edited", keys::DATE).unwrap().as_deref(), Some("2"));
        assert_eq!(report.to_string(), "1 new, 1 changed, 1 unchanged, 1 removed");
    }

    #[test]
    fn relation_only_id_counts_as_new() {
        let data = SyncAccessData::new();
        let mut session = CrawlSession::begin(&data).unwrap();
        session.aggregate("folder:/x", "file:/x/a").unwrap();
        assert_eq!(observe(&mut session, "file:/x/a", &file("1", "1")), ObjectState::New);
    }

    #[test]
    fn unrelated_properties_survive_observe() {
        let data = SyncAccessData::new();
        data.initialize().unwrap();
        data.put("file:/a", "title", "Report").unwrap();

        let mut session = CrawlSession::begin(&data).unwrap();
        assert_eq!(observe(&mut session, "file:/a", &file("1", "1")), ObjectState::Changed);
        assert_eq!(data.get("file:/a", "title").unwrap().as_deref(), Some("Report"));
    }

    // --- subtrees -------------------------------------------------------

    #[test]
    fn unchanged_subtree_survives_reap() {
        let data = SyncAccessData::new();
        let mut first = CrawlSession::begin(&data).unwrap();
        observe(&mut first, "folder:/x", &file("1", "0"));
        for name in ["a", "b"] {
            let id = format!("file:/x/{name}");
            first.aggregate("folder:/x", &id).unwrap();
            observe(&mut first, &id, &file("1", "1"));
        }
        first.finish().unwrap();

        let mut second = CrawlSession::begin(&data).unwrap();
        assert_eq!(second.observe_unchanged_subtree("folder:/x").unwrap(), 3);
        assert!(second.is_observed("file:/x/b").unwrap());
        let report = second.finish().unwrap();
        assert_eq!(report.unchanged, 3);
        assert_eq!(report.removed, 0);
        assert_eq!(data.size().unwrap(), 3);
    }

    #[test]
    fn observed_folder_is_not_counted_twice() {
        let data = SyncAccessData::new();
        let mut first = CrawlSession::begin(&data).unwrap();
        observe(&mut first, "folder:/x", &file("1", "0"));
        first.aggregate("folder:/x", "file:/x/a").unwrap();
        observe(&mut first, "file:/x/a", &file("1", "1"));
        first.finish().unwrap();

        let mut second = CrawlSession::begin(&data).unwrap();
        assert_eq!(observe(&mut second, "folder:/x", &file("1", "0")), ObjectState::Unchanged);
        assert_eq!(second.observe_unchanged_subtree("folder:/x").unwrap(), 2);
        let report = second.finish().unwrap();
        assert_eq!(report.unchanged, 2);
        assert_eq!(report.observed(), 2);
    }

    #[test]
    fn reaped_folder_takes_children_along() {
        let data = SyncAccessData::new();
        let mut first = CrawlSession::begin(&data).unwrap();
        observe(&mut first, "folder:/gone", &file("1", "0"));
        first.aggregate("folder:/gone", "file:/gone/a").unwrap();
        first.finish().unwrap();

        let second = CrawlSession::begin(&data).unwrap();
        let report = second.finish().unwrap();
        assert_eq!(report.removed, 2);
        assert_eq!(data.size().unwrap(), 0);
    }

    // --- persistence ----------------------------------------------------

    #[test]
    fn finish_persists_and_abandon_does_not_reap() {
        let storage = Arc::new(MemorySnapshotStorage::new());
        let data = SyncAccessData::with_storage(Arc::clone(&storage));
        let mut first = CrawlSession::begin(&data).unwrap();
        observe(&mut first, "file:/a", &file("1", "1"));
        observe(&mut first, "file:/b", &file("1", "1"));
        first.finish().unwrap();
        assert_eq!(storage.load().unwrap().map(|s| s.len()), Some(2));

        let mut partial = CrawlSession::begin(&data).unwrap();
        observe(&mut partial, "file:/a", &file("1", "1"));
        let report = partial.abandon().unwrap();
        assert_eq!(report.observed(), 1);
        assert!(data.is_known_id("file:/b").unwrap());
    }

    #[test]
    fn fingerprint_keys() {
        assert!(is_fingerprint_key(keys::CONTENT_HASH));
        assert!(!is_fingerprint_key(keys::TOUCHED));
        assert!(!is_fingerprint_key("title"));
    }
}
