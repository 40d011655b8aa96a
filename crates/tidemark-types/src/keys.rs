//! Well-known property keys.
//!
//! Crawlers are free to store any string key, but the keys below carry a
//! shared meaning across data sources. All values are stored as strings;
//! interpretation (timestamps, sizes, hashes) is left to the caller.

/// Last-modified timestamp of the object as reported by the source.
pub const DATE: &str = "date";

/// Size of the object in bytes.
pub const BYTE_SIZE: &str = "byteSize";

/// Target identifier when the object is a redirect (e.g. HTTP 301).
pub const REDIRECTS_TO: &str = "redirectsTo";

/// Content fingerprint, usually a [`ContentHash`](crate::ContentHash) in hex.
pub const CONTENT_HASH: &str = "contentHash";

/// Reserved: holds the [`CrawlToken`](crate::CrawlToken) of the last crawl
/// cycle that touched the identifier. Only the store writes this key.
pub const TOUCHED: &str = "tidemark:touched";

/// Returns `true` for keys that collaborators must not write directly.
pub fn is_reserved(key: &str) -> bool {
    key == TOUCHED
}
