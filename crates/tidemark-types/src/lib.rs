//! Foundation types for Tidemark.
//!
//! Tidemark remembers, across repeated crawls of the same data source, which
//! objects existed before, whether they changed, and how they relate to each
//! other. This crate holds the small value types every other Tidemark crate
//! shares.
//!
//! # Key Types
//!
//! - [`CrawlToken`] -- Random marker identifying one crawl cycle
//! - [`PropertyMap`] -- Ordered, string-valued property bag of one identifier
//! - [`ContentHash`] -- BLAKE3 fingerprint used for change detection
//! - [`keys`] -- Well-known property keys shared by crawlers
//!
//! Identifiers themselves are plain strings (typically URIs). They are
//! opaque: Tidemark only relies on equality and hashing, and rejects the
//! empty string via [`validate_id`].

pub mod error;
pub mod hash;
pub mod id;
pub mod keys;
pub mod properties;
pub mod token;

pub use error::TypeError;
pub use hash::ContentHash;
pub use id::{validate_id, validate_key};
pub use properties::PropertyMap;
pub use token::CrawlToken;
