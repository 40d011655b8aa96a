//! Error types for the access crate.

use std::path::PathBuf;

use tidemark_types::TypeError;

/// Errors that can occur while tracking crawl state.
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    /// The store has not been initialized (or was cleared since).
    #[error("access data is not initialized; call initialize() first")]
    NotInitialized,

    /// An identifier or key failed validation.
    #[error("invalid input: {0}")]
    Type(#[from] TypeError),

    /// The key is managed by the store and cannot be written directly.
    #[error("property key {0:?} is reserved")]
    ReservedKey(String),

    /// The edge would make an identifier its own ancestor.
    #[error("aggregating {child} under {parent} would create a cycle")]
    AggregationCycle {
        /// The requested parent.
        parent: String,
        /// The requested child (already an ancestor of `parent`).
        child: String,
    },

    /// The persisted snapshot has no version marker or one we cannot read.
    #[error("unsupported snapshot version: {}", version_label(.found))]
    UnsupportedVersion {
        /// The version found in the document, if any.
        found: Option<u32>,
    },

    /// The persisted snapshot is structurally invalid.
    #[error("malformed snapshot: {0}")]
    MalformedSnapshot(String),

    /// Durable read or write failed.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        /// The file being read or written.
        path: PathBuf,
        /// The underlying cause.
        #[source]
        source: std::io::Error,
    },

    /// A thread panicked while holding the store lock.
    #[error("access data lock poisoned")]
    LockPoisoned,
}

impl AccessError {
    /// Attach a path to an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

fn version_label(found: &Option<u32>) -> String {
    found.map_or_else(|| "missing".to_string(), |v| v.to_string())
}

/// Convenience alias for access results.
pub type AccessResult<T> = Result<T, AccessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_version_display() {
        let missing = AccessError::UnsupportedVersion { found: None };
        assert_eq!(missing.to_string(), "unsupported snapshot version: missing");
        let future = AccessError::UnsupportedVersion { found: Some(9) };
        assert_eq!(future.to_string(), "unsupported snapshot version: 9");
    }

    #[test]
    fn io_error_carries_path() {
        let err = AccessError::io(
            "/tmp/state.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/tmp/state.json"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn type_error_converts() {
        let err: AccessError = TypeError::EmptyId.into();
        assert!(matches!(err, AccessError::Type(TypeError::EmptyId)));
    }
}
