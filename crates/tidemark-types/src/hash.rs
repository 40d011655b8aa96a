use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// BLAKE3 fingerprint of an object's content.
///
/// Crawlers store `ContentHash::to_hex()` under
/// [`keys::CONTENT_HASH`](crate::keys::CONTENT_HASH) and compare it on the
/// next crawl to decide whether the object changed.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Hash raw bytes.
    pub fn of(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Hash a stream of chunks without buffering the whole content.
    pub fn of_chunks<'a, I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let mut hasher = blake3::Hasher::new();
        for chunk in chunks {
            hasher.update(chunk);
        }
        Self(*hasher.finalize().as_bytes())
    }

    /// The raw 32-byte hash.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        blake3::Hash::from(self.0).to_hex().to_string()
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        self.to_hex()[..8].to_string()
    }
}

impl FromStr for ContentHash {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        blake3::Hash::from_hex(s)
            .map(|h| Self(*h.as_bytes()))
            .map_err(|e| TypeError::InvalidHash(e.to_string()))
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.short_hex())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_content_same_hash() {
        assert_eq!(ContentHash::of(b"hello"), ContentHash::of(b"hello"));
        assert_ne!(ContentHash::of(b"hello"), ContentHash::of(b"world"));
    }

    #[test]
    fn chunked_matches_whole() {
        let whole = ContentHash::of(b"hello world");
        let chunked = ContentHash::of_chunks([&b"hello "[..], &b"world"[..]]);
        assert_eq!(whole, chunked);
    }

    #[test]
    fn hex_roundtrip() {
        let hash = ContentHash::of(b"data");
        let hex = hash.to_hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(hex.parse::<ContentHash>().unwrap(), hash);
    }

    #[test]
    fn invalid_hex_rejected() {
        assert!(matches!(
            "zz".parse::<ContentHash>(),
            Err(TypeError::InvalidHash(_))
        ));
    }
}
