//! Incremental crawl state for Tidemark.
//!
//! A crawler that visits the same data source again and again needs to know
//! which objects it saw last time, whether they changed, and which ones have
//! disappeared since. This crate keeps that state:
//!
//! - **Identifier store** -- per identifier, a string-valued [`PropertyMap`]
//!   (dates, sizes, content hashes, the crawl touch stamp)
//! - **Relation tracker** -- a many-to-many [`LinkRelation`] ("refers to")
//!   and a strict [`AggregationForest`] ("contains", one parent per child)
//! - **Crawl-cycle coordinator** -- a [`CrawlToken`] per crawl, touch
//!   stamps, and reaping of everything not touched
//!
//! # Entry Points
//!
//! - [`AccessTable`] -- single-threaded implementation, `&mut self` mutations
//! - [`SyncAccessData`] -- `RwLock`-guarded table implementing [`AccessData`]
//! - [`CrawlSession`] -- classifies observed objects as new, changed or
//!   unchanged and reaps at the end of a crawl
//!
//! # Persistence
//!
//! State is saved as a versioned [`Snapshot`] through a [`SnapshotStorage`]
//! backend. [`MemorySnapshotStorage`] lives here; the file backend is in
//! `tidemark-snapshot`.
//!
//! # Design Rules
//!
//! 1. Lookups never fail for unknown identifiers; they return absent/empty.
//! 2. Removing something that does not exist is a no-op.
//! 3. Mutations before `initialize()` fail with [`AccessError::NotInitialized`].
//! 4. `remove(id)` cascades through the aggregation subtree.
//! 5. The aggregation relation never contains a cycle.
//! 6. Query results are copies, never views into internal state.
//!
//! [`PropertyMap`]: tidemark_types::PropertyMap
//! [`CrawlToken`]: tidemark_types::CrawlToken

pub mod aggregation;
pub mod error;
pub mod links;
pub mod session;
pub mod snapshot;
pub mod storage;
pub mod sync;
pub mod table;
pub mod traits;

pub use aggregation::{AggregationForest, AggregationNode, Closure};
pub use error::{AccessError, AccessResult};
pub use links::LinkRelation;
pub use session::{is_fingerprint_key, CrawlReport, CrawlSession, ObjectState};
pub use snapshot::{Property, Snapshot, SnapshotRecord, SNAPSHOT_VERSION, SUPPORTED_VERSIONS};
pub use storage::{MemorySnapshotStorage, SnapshotStorage};
pub use sync::SyncAccessData;
pub use table::{AccessTable, KnownIds, UntouchedIds};
pub use traits::{AccessData, IdIter};
