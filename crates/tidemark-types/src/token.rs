use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Unique marker for one crawl cycle (random UUID v4).
///
/// A fresh token is generated every time a store is initialized. Touching an
/// identifier stamps the current token into its property map; an identifier
/// is "touched" exactly when its stamp equals the store's current token.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CrawlToken(uuid::Uuid);

impl CrawlToken {
    /// Generate a new random token.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Create from an existing UUID.
    pub fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }

    /// Short representation (first 8 characters of the UUID).
    pub fn short_id(&self) -> String {
        self.0.to_string()[..8].to_string()
    }

    /// The string value stamped under the touch key.
    pub fn to_stamp(&self) -> String {
        self.0.to_string()
    }

    /// Returns `true` if `stamp` was produced by this token.
    pub fn matches(&self, stamp: &str) -> bool {
        stamp.parse::<uuid::Uuid>().is_ok_and(|u| u == self.0)
    }
}

impl Default for CrawlToken {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for CrawlToken {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<uuid::Uuid>()
            .map(Self)
            .map_err(|e| TypeError::InvalidToken(e.to_string()))
    }
}

impl fmt::Debug for CrawlToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CrawlToken({})", self.short_id())
    }
}

impl fmt::Display for CrawlToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_unique() {
        let a = CrawlToken::new();
        let b = CrawlToken::new();
        assert_ne!(a, b);
    }

    #[test]
    fn stamp_matches_own_token_only() {
        let a = CrawlToken::new();
        let b = CrawlToken::new();
        assert!(a.matches(&a.to_stamp()));
        assert!(!b.matches(&a.to_stamp()));
        assert!(!a.matches("not-a-token"));
        assert!(!a.matches(""));
    }

    #[test]
    fn parse_display_roundtrip() {
        let token = CrawlToken::new();
        let parsed: CrawlToken = token.to_string().parse().unwrap();
        assert_eq!(parsed, token);
    }

    #[test]
    fn parse_rejects_garbage() {
        let err = "xyz".parse::<CrawlToken>().unwrap_err();
        assert!(matches!(err, TypeError::InvalidToken(_)));
    }

    #[test]
    fn short_id_is_prefix() {
        let token = CrawlToken::new();
        assert_eq!(token.short_id().len(), 8);
        assert!(token.to_string().starts_with(&token.short_id()));
        assert!(format!("{token:?}").starts_with("CrawlToken("));
    }
}
