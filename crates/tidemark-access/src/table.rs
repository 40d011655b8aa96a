//! The single-threaded access table.
//!
//! [`AccessTable`] combines the three parts of incremental crawl state:
//!
//! - the **identifier store**: identifier -> [`PropertyMap`]
//! - the **relation tracker**: a [`LinkRelation`] and an
//!   [`AggregationForest`]
//! - the **crawl-cycle coordinator**: the current [`CrawlToken`], touch
//!   stamps, and reaping of untouched identifiers
//!
//! An identifier is *known* if it appears in any of the three maps.
//!
//! The table takes `&mut self` for every mutation and does no locking of its
//! own; wrap it in [`SyncAccessData`](crate::SyncAccessData) to share it
//! between threads.
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized --initialize()--> Active --clear()--> Uninitialized
//! ```
//!
//! Mutations, touches, closure iteration and `store()` require `Active`.
//! Calling `initialize()` again while `Active` rotates the crawl token.

use std::collections::{BTreeMap, BTreeSet};

use tidemark_types::{keys, validate_id, validate_key, CrawlToken, PropertyMap};
use tracing::{debug, info, warn};

use crate::aggregation::{next_key_after, AggregationForest, Closure};
use crate::error::{AccessError, AccessResult};
use crate::links::LinkRelation;
use crate::snapshot::{Property, Snapshot, SnapshotRecord};
use crate::storage::SnapshotStorage;

/// Incremental crawl state for one data source.
#[derive(Default)]
pub struct AccessTable {
    properties: BTreeMap<String, PropertyMap>,
    links: LinkRelation,
    aggregation: AggregationForest,
    /// `None` while uninitialized.
    token: Option<CrawlToken>,
    storage: Option<Box<dyn SnapshotStorage>>,
}

impl std::fmt::Debug for AccessTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessTable")
            .field("properties", &self.properties.len())
            .field("links", &self.links.len())
            .field("aggregation", &self.aggregation.len())
            .field("token", &self.token)
            .field(
                "storage",
                &self.storage.as_ref().map(|s| s.location()),
            )
            .finish()
    }
}

impl AccessTable {
    /// Create an empty, uninitialized table with no durable backing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty, uninitialized table persisting to `storage`.
    pub fn with_storage(storage: impl SnapshotStorage + 'static) -> Self {
        Self {
            storage: Some(Box::new(storage)),
            ..Self::default()
        }
    }

    /// Load the stored snapshot (if any) and initialize a crawl cycle.
    pub fn open(storage: impl SnapshotStorage + 'static) -> AccessResult<Self> {
        let mut table = Self::with_storage(storage);
        table.load()?;
        table.initialize();
        Ok(table)
    }

    // ---------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------

    /// Start a crawl cycle with a fresh token. Existing state is kept.
    pub fn initialize(&mut self) -> CrawlToken {
        let token = CrawlToken::new();
        match self.token.replace(token) {
            Some(previous) => debug!(%token, %previous, "rotated crawl token"),
            None => debug!(%token, "initialized access table"),
        }
        token
    }

    pub fn is_initialized(&self) -> bool {
        self.token.is_some()
    }

    /// Token of the current crawl cycle, `None` while uninitialized.
    pub fn crawl_token(&self) -> Option<CrawlToken> {
        self.token
    }

    /// Replace the in-memory state with the stored snapshot.
    ///
    /// Returns `false` (and leaves the table untouched) when there is no
    /// storage or nothing was stored yet. The crawl token is not changed.
    pub fn load(&mut self) -> AccessResult<bool> {
        let Some(storage) = &self.storage else {
            return Ok(false);
        };
        let Some(snapshot) = storage.load()? else {
            debug!(location = %storage.location(), "no stored snapshot");
            return Ok(false);
        };
        let location = storage.location();
        self.restore(snapshot)?;
        info!(%location, ids = self.len(), "loaded access data");
        Ok(true)
    }

    /// Persist the current state. A no-op without storage.
    pub fn store(&self) -> AccessResult<()> {
        self.require_token()?;
        let Some(storage) = &self.storage else {
            debug!("no storage configured; store skipped");
            return Ok(());
        };
        let snapshot = self.to_snapshot();
        storage.save(&snapshot)?;
        info!(location = %storage.location(), records = snapshot.len(), "stored access data");
        Ok(())
    }

    /// Discard all state, in memory and in storage. Leaves the table
    /// uninitialized.
    pub fn clear(&mut self) -> AccessResult<()> {
        self.properties.clear();
        self.links.clear();
        self.aggregation.clear();
        self.token = None;
        if let Some(storage) = &self.storage {
            storage.clear()?;
        }
        debug!("cleared access table");
        Ok(())
    }

    /// Dump the current state as a snapshot document.
    pub fn to_snapshot(&self) -> Snapshot {
        let records = self
            .known_ids()
            .map(|id| SnapshotRecord {
                id: id.to_string(),
                properties: self
                    .properties
                    .get(id)
                    .map(|map| map.iter().map(|(k, v)| Property::new(k, v)).collect())
                    .unwrap_or_default(),
                referred_ids: self
                    .links
                    .referred(id)
                    .map(|set| set.iter().cloned().collect())
                    .unwrap_or_default(),
                aggregated_by: self.aggregation.parent(id).map(str::to_owned),
            })
            .collect();
        Snapshot::new(records)
    }

    /// Replace the in-memory state with `snapshot`.
    ///
    /// The snapshot is fully validated before anything is replaced; on error
    /// the table is left as it was.
    pub fn restore(&mut self, snapshot: Snapshot) -> AccessResult<()> {
        let version = snapshot.check_version()?;

        let mut properties = BTreeMap::new();
        let mut links = LinkRelation::new();
        let mut aggregation = AggregationForest::new();
        let mut edges = Vec::new();
        let mut seen = BTreeSet::new();

        for record in snapshot.records {
            validate_id(&record.id).map_err(malformed)?;
            if !seen.insert(record.id.clone()) {
                return Err(AccessError::MalformedSnapshot(format!(
                    "duplicate record for {}",
                    record.id
                )));
            }
            for referred in &record.referred_ids {
                validate_id(referred).map_err(malformed)?;
                links.insert(&record.id, referred);
            }
            if let Some(parent) = record.aggregated_by {
                if version < 2 {
                    warn!(id = %record.id, "ignoring aggregation in version 1 snapshot");
                } else {
                    validate_id(&parent).map_err(malformed)?;
                    edges.push((parent, record.id.clone()));
                }
            }
            if !record.properties.is_empty() {
                let mut map = PropertyMap::new();
                for Property { key, value } in record.properties {
                    validate_key(&record.id, &key).map_err(malformed)?;
                    map.insert(key, value);
                }
                properties.insert(record.id, map);
            }
        }

        for (parent, child) in edges {
            aggregation
                .insert(&parent, &child)
                .map_err(|e| AccessError::MalformedSnapshot(e.to_string()))?;
        }

        self.properties = properties;
        self.links = links;
        self.aggregation = aggregation;
        debug!(version, ids = self.len(), "restored snapshot");
        Ok(())
    }

    fn require_token(&self) -> AccessResult<CrawlToken> {
        self.token.ok_or(AccessError::NotInitialized)
    }

    // ---------------------------------------------------------------
    // Identifier store
    // ---------------------------------------------------------------

    /// The value stored under `key` for `id`.
    pub fn get(&self, id: &str, key: &str) -> Option<&str> {
        self.properties.get(id)?.get(key)
    }

    /// All properties of `id`.
    pub fn properties(&self, id: &str) -> Option<&PropertyMap> {
        self.properties.get(id)
    }

    /// Insert or replace one property.
    pub fn put(&mut self, id: &str, key: &str, value: &str) -> AccessResult<()> {
        self.require_token()?;
        validate_id(id)?;
        validate_key(id, key)?;
        if keys::is_reserved(key) {
            return Err(AccessError::ReservedKey(key.to_string()));
        }
        self.properties
            .entry(id.to_string())
            .or_default()
            .insert(key, value);
        Ok(())
    }

    /// Remove one property. Removing a missing key is a no-op.
    pub fn remove_property(&mut self, id: &str, key: &str) -> AccessResult<()> {
        self.require_token()?;
        if keys::is_reserved(key) {
            return Err(AccessError::ReservedKey(key.to_string()));
        }
        if let Some(map) = self.properties.get_mut(id) {
            map.remove(key);
            if map.is_empty() {
                self.properties.remove(id);
            }
        }
        Ok(())
    }

    /// Remove `id` entirely, cascading through its aggregation subtree.
    ///
    /// Drops the properties and outgoing links of `id` and of every
    /// aggregated descendant, and detaches `id` from its parent. Returns the
    /// number of identifiers removed (zero for unknown identifiers).
    pub fn remove(&mut self, id: &str) -> AccessResult<usize> {
        self.require_token()?;
        if !self.is_known_id(id) {
            return Ok(0);
        }
        let removed = self.aggregation.remove_subtree(id);
        for gone in &removed {
            self.properties.remove(gone);
            self.links.remove_all(gone);
        }
        debug!(id, cascaded = removed.len() - 1, "removed id");
        Ok(removed.len())
    }

    /// Known through properties, links, or aggregation.
    pub fn is_known_id(&self, id: &str) -> bool {
        self.properties.contains_key(id) || self.links.contains(id) || self.aggregation.contains(id)
    }

    /// Number of distinct known identifiers.
    pub fn len(&self) -> usize {
        self.known_ids().count()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty() && self.links.is_empty() && self.aggregation.is_empty()
    }

    /// Copy of every known identifier.
    pub fn stored_ids(&self) -> BTreeSet<String> {
        self.known_ids().map(str::to_owned).collect()
    }

    /// Lazily walk every known identifier in key order.
    pub fn known_ids(&self) -> KnownIds<'_> {
        KnownIds {
            table: self,
            after: None,
        }
    }

    /// First known identifier strictly after `after` in key order.
    pub(crate) fn next_id_after(&self, after: Option<&str>) -> Option<&str> {
        [
            next_key_after(&self.properties, after),
            self.links.next_id_after(after),
            self.aggregation.next_id_after(after),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    // ---------------------------------------------------------------
    // Link relation
    // ---------------------------------------------------------------

    /// Record that `id` refers to `referred`. Idempotent.
    pub fn put_referred_id(&mut self, id: &str, referred: &str) -> AccessResult<()> {
        self.require_token()?;
        validate_id(id)?;
        validate_id(referred)?;
        self.links.insert(id, referred);
        Ok(())
    }

    /// Copy of the identifiers `id` refers to.
    pub fn referred_ids(&self, id: &str) -> BTreeSet<String> {
        self.links.referred(id).cloned().unwrap_or_default()
    }

    /// Remove one link. Returns `false` if it did not exist.
    pub fn remove_referred_id(&mut self, id: &str, referred: &str) -> AccessResult<bool> {
        self.require_token()?;
        Ok(self.links.remove(id, referred))
    }

    /// Remove every link from `id`.
    pub fn remove_referred_ids(&mut self, id: &str) -> AccessResult<()> {
        self.require_token()?;
        self.links.remove_all(id);
        Ok(())
    }

    // ---------------------------------------------------------------
    // Aggregation relation
    // ---------------------------------------------------------------

    /// Aggregate `child` under `parent`, moving it away from any previous
    /// parent.
    pub fn put_aggregated_id(&mut self, parent: &str, child: &str) -> AccessResult<()> {
        self.require_token()?;
        validate_id(parent)?;
        validate_id(child)?;
        self.aggregation.insert(parent, child)
    }

    /// Copy of the identifiers directly aggregated by `id`.
    pub fn aggregated_ids(&self, id: &str) -> BTreeSet<String> {
        self.aggregation.children(id).cloned().unwrap_or_default()
    }

    /// The identifier aggregating `id`, if any.
    pub fn aggregating_id(&self, id: &str) -> Option<&str> {
        self.aggregation.parent(id)
    }

    /// Depth-first walk of `id` and all its transitive children, `id` first.
    pub fn aggregated_ids_closure<'a>(&'a self, id: &'a str) -> AccessResult<Closure<'a>> {
        self.require_token()?;
        Ok(self.aggregation.closure(id))
    }

    /// Detach `child` from `parent`. The child keeps its own subtree.
    pub fn remove_aggregated_id(&mut self, parent: &str, child: &str) -> AccessResult<bool> {
        self.require_token()?;
        Ok(self.aggregation.remove_edge(parent, child))
    }

    // ---------------------------------------------------------------
    // Crawl cycle
    // ---------------------------------------------------------------

    /// Mark `id` as seen in the current crawl cycle.
    pub fn touch(&mut self, id: &str) -> AccessResult<()> {
        let token = self.require_token()?;
        validate_id(id)?;
        self.stamp(id, &token);
        Ok(())
    }

    /// Touch `id` and every identifier in its aggregation closure.
    pub fn touch_recursively(&mut self, id: &str) -> AccessResult<usize> {
        let token = self.require_token()?;
        validate_id(id)?;
        let subtree: Vec<String> = self.aggregation.closure(id).map(str::to_owned).collect();
        for member in &subtree {
            self.stamp(member, &token);
        }
        Ok(subtree.len())
    }

    /// Whether `id` was touched in the current crawl cycle.
    pub fn is_touched(&self, id: &str) -> bool {
        match (self.token, self.get(id, keys::TOUCHED)) {
            (Some(token), Some(stamp)) => token.matches(stamp),
            _ => false,
        }
    }

    /// Lazily walk identifiers with a property map that were not touched in
    /// the current cycle. Ids known only through a relation are not visited.
    pub fn untouched_ids(&self) -> AccessResult<UntouchedIds<'_>> {
        self.require_token()?;
        Ok(UntouchedIds {
            table: self,
            after: None,
        })
    }

    /// Remove every known identifier not touched in the current cycle,
    /// cascading through aggregation. Unlike [`untouched_ids`](Self::untouched_ids)
    /// this also reaps ids known only through a relation, since they can
    /// never carry a touch stamp. Returns the number of identifiers removed.
    pub fn remove_untouched_ids(&mut self) -> AccessResult<usize> {
        self.require_token()?;
        let mut removed = 0;
        let mut after: Option<String> = None;
        while let Some(id) = self.next_known_untouched_after(after.as_deref()).map(str::to_owned) {
            removed += self.remove(&id)?;
            after = Some(id);
        }
        info!(removed, remaining = self.len(), "removed untouched ids");
        Ok(removed)
    }

    pub(crate) fn next_untouched_after(&self, after: Option<&str>) -> Option<&str> {
        let mut cursor = after;
        loop {
            let id = next_key_after(&self.properties, cursor)?;
            if !self.is_touched(id) {
                return Some(id);
            }
            cursor = Some(id);
        }
    }

    fn next_known_untouched_after(&self, after: Option<&str>) -> Option<&str> {
        let mut cursor = after;
        loop {
            let id = self.next_id_after(cursor)?;
            if !self.is_touched(id) {
                return Some(id);
            }
            cursor = Some(id);
        }
    }

    fn stamp(&mut self, id: &str, token: &CrawlToken) {
        self.properties
            .entry(id.to_string())
            .or_default()
            .insert(keys::TOUCHED, token.to_stamp());
    }
}

fn malformed(err: tidemark_types::TypeError) -> AccessError {
    AccessError::MalformedSnapshot(err.to_string())
}

/// Lazy walk over all known identifiers. See [`AccessTable::known_ids`].
pub struct KnownIds<'a> {
    table: &'a AccessTable,
    after: Option<&'a str>,
}

impl<'a> Iterator for KnownIds<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.table.next_id_after(self.after)?;
        self.after = Some(id);
        Some(id)
    }
}

/// Lazy walk over untouched identifiers. See [`AccessTable::untouched_ids`].
pub struct UntouchedIds<'a> {
    table: &'a AccessTable,
    after: Option<&'a str>,
}

impl<'a> Iterator for UntouchedIds<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.table.next_untouched_after(self.after)?;
        self.after = Some(id);
        Some(id)
    }
}
