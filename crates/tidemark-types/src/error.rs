use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("identifier must not be empty")]
    EmptyId,

    #[error("property key must not be empty (identifier {0})")]
    EmptyKey(String),

    #[error("invalid crawl token: {0}")]
    InvalidToken(String),

    #[error("invalid content hash: {0}")]
    InvalidHash(String),
}
