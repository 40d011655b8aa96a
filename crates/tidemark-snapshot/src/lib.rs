//! Durable snapshot storage for Tidemark.
//!
//! [`FileSnapshotStorage`] implements
//! [`SnapshotStorage`](tidemark_access::SnapshotStorage) on top of the local
//! filesystem. Snapshots are JSON documents, optionally wrapped in a zstd
//! frame, and are replaced atomically (temp file + fsync + rename).
//!
//! [`StorageConfig`] describes one snapshot location and can be read from
//! TOML:
//!
//! ```
//! use tidemark_snapshot::{Compression, StorageConfig};
//!
//! let config = StorageConfig::from_toml_str(r#"
//!     path = "state/mail.json.zst"
//!     compression = "zstd"
//! "#).unwrap();
//! assert_eq!(config.compression, Compression::Zstd);
//! ```

pub mod config;
pub mod error;
pub mod file;

pub use config::{Compression, StorageConfig, ZSTD_MAGIC};
pub use error::{ConfigError, ConfigResult};
pub use file::FileSnapshotStorage;
