use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading storage configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("zstd level {0} out of range (1..=22)")]
    InvalidLevel(i32),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
