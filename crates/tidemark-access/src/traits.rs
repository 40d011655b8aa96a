use std::collections::BTreeSet;

use tidemark_types::{CrawlToken, PropertyMap};

use crate::error::AccessResult;

/// Lazily produced identifiers. Each item re-reads shared state, so an
/// item may carry an error (e.g. a poisoned lock).
pub type IdIter<'a> = Box<dyn Iterator<Item = AccessResult<String>> + Send + 'a>;

/// Shared, thread-safe access to the incremental crawl state of one source.
///
/// This is the contract crawlers are written against. All implementations
/// must satisfy these rules:
/// - Lookups of unknown identifiers or keys return absent/empty/false,
///   never an error.
/// - Removing something that does not exist is a silent no-op.
/// - Every mutation, touch, closure walk and `store()` fails with
///   [`AccessError::NotInitialized`](crate::AccessError::NotInitialized)
///   before `initialize()` (and after `clear()`).
/// - Returned collections are copies; mutating them never affects the store.
pub trait AccessData: Send + Sync {
    // -- lifecycle -----------------------------------------------------

    /// Start a crawl cycle with a fresh [`CrawlToken`].
    fn initialize(&self) -> AccessResult<CrawlToken>;

    /// Persist the current state to the configured storage, if any.
    fn store(&self) -> AccessResult<()>;

    /// Drop all state, in memory and in storage, and become uninitialized.
    fn clear(&self) -> AccessResult<()>;

    /// Token of the current crawl cycle.
    fn crawl_token(&self) -> AccessResult<Option<CrawlToken>>;

    // -- identifier store ----------------------------------------------

    fn get(&self, id: &str, key: &str) -> AccessResult<Option<String>>;

    /// Copy of all properties stored for `id`.
    fn properties(&self, id: &str) -> AccessResult<Option<PropertyMap>>;

    fn put(&self, id: &str, key: &str, value: &str) -> AccessResult<()>;

    fn remove_property(&self, id: &str, key: &str) -> AccessResult<()>;

    /// Remove `id` and its aggregation subtree. Returns how many
    /// identifiers were removed.
    fn remove(&self, id: &str) -> AccessResult<usize>;

    fn is_known_id(&self, id: &str) -> AccessResult<bool>;

    /// Number of distinct known identifiers.
    fn size(&self) -> AccessResult<usize>;

    fn stored_ids(&self) -> AccessResult<BTreeSet<String>>;

    // -- link relation -------------------------------------------------

    fn put_referred_id(&self, id: &str, referred: &str) -> AccessResult<()>;

    fn referred_ids(&self, id: &str) -> AccessResult<BTreeSet<String>>;

    fn remove_referred_id(&self, id: &str, referred: &str) -> AccessResult<()>;

    fn remove_referred_ids(&self, id: &str) -> AccessResult<()>;

    // -- aggregation relation ------------------------------------------

    fn put_aggregated_id(&self, parent: &str, child: &str) -> AccessResult<()>;

    fn aggregated_ids(&self, id: &str) -> AccessResult<BTreeSet<String>>;

    fn aggregating_id(&self, id: &str) -> AccessResult<Option<String>>;

    /// Depth-first walk of `id` and its transitive children, `id` first.
    fn aggregated_ids_closure(&self, id: &str) -> AccessResult<IdIter<'_>>;

    fn remove_aggregated_id(&self, parent: &str, child: &str) -> AccessResult<()>;

    // -- crawl cycle ---------------------------------------------------

    fn touch(&self, id: &str) -> AccessResult<()>;

    /// Touch `id` and its whole aggregation closure. Returns how many
    /// identifiers were touched.
    fn touch_recursively(&self, id: &str) -> AccessResult<usize>;

    fn is_touched(&self, id: &str) -> AccessResult<bool>;

    /// Identifiers with stored properties not touched in the current cycle.
    fn untouched_ids(&self) -> AccessResult<IdIter<'_>>;

    /// Remove every known identifier not touched in the current cycle,
    /// including ids known only through a relation. Returns how many were
    /// removed.
    fn remove_untouched_ids(&self) -> AccessResult<usize>;
}
