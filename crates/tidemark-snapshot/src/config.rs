use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// First four bytes of every zstd frame.
pub const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// How snapshot files are encoded on disk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// Pretty-printed JSON.
    #[default]
    None,
    /// Compact JSON inside a zstd frame.
    Zstd,
}

impl Compression {
    /// Guess the encoding of a stored file from its leading bytes.
    pub fn detect(bytes: &[u8]) -> Self {
        if bytes.starts_with(&ZSTD_MAGIC) {
            Self::Zstd
        } else {
            Self::None
        }
    }
}

/// Where and how the crawl state of one source is persisted.
///
/// ```toml
/// path = "state/documents.json.zst"
/// compression = "zstd"
/// level = 9
/// keep_backup = true
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub path: PathBuf,
    pub compression: Compression,
    /// zstd level, ignored without compression.
    pub level: i32,
    /// Keep the previous snapshot next to the new one as `<path>.bak`.
    pub keep_backup: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("tidemark-state.json"),
            compression: Compression::None,
            level: 3,
            keep_backup: false,
        }
    }
}

impl StorageConfig {
    /// Defaults with a different snapshot path.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(s: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a TOML config file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.compression == Compression::Zstd && !(1..=22).contains(&self.level) {
            return Err(ConfigError::InvalidLevel(self.level));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = StorageConfig::default();
        assert_eq!(c.path, PathBuf::from("tidemark-state.json"));
        assert_eq!(c.compression, Compression::None);
        assert_eq!(c.level, 3);
        assert!(!c.keep_backup);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let c = StorageConfig::from_toml_str(
            r#"
            path = "state/docs.json.zst"
            compression = "zstd"
            "#,
        )
        .unwrap();
        assert_eq!(c.path, PathBuf::from("state/docs.json.zst"));
        assert_eq!(c.compression, Compression::Zstd);
        assert_eq!(c.level, 3);
    }

    #[test]
    fn toml_round_trip() {
        let c = StorageConfig {
            path: "x.json".into(),
            compression: Compression::Zstd,
            level: 19,
            keep_backup: true,
        };
        let text = c.to_toml_string().unwrap();
        assert_eq!(StorageConfig::from_toml_str(&text).unwrap(), c);
    }

    #[test]
    fn rejects_bad_level_and_unknown_compression() {
        let err = StorageConfig::from_toml_str("compression = \"zstd\"\nlevel = 40").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidLevel(40)));
        assert!(matches!(
            StorageConfig::from_toml_str("compression = \"gzip\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn load_missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        match StorageConfig::load(&path) {
            Err(ConfigError::Io { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected Io error, got {other:?}"),
        }
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tidemark.toml");
        std::fs::write(&path, "keep_backup = true\n").unwrap();
        assert!(StorageConfig::load(&path).unwrap().keep_backup);
    }

    #[test]
    fn detect_compression() {
        assert_eq!(Compression::detect(b"{\"version\":2}"), Compression::None);
        let packed = zstd::encode_all(&b"{}"[..], 3).unwrap();
        assert_eq!(Compression::detect(&packed), Compression::Zstd);
        assert_eq!(Compression::detect(b""), Compression::None);
    }
}
