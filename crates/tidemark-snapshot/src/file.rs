//! Snapshot files on the local filesystem.
//!
//! A snapshot is written to a temporary file in the destination directory,
//! flushed to disk, and then renamed over the previous snapshot. A crawl
//! aborted mid-save therefore leaves the last complete snapshot in place.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tidemark_access::{AccessError, AccessResult, Snapshot, SnapshotStorage};
use tracing::{debug, warn};

use crate::config::{Compression, StorageConfig};

/// Stores snapshots as JSON files, optionally zstd-compressed.
///
/// Reading detects the encoding from the file itself, so switching the
/// configured compression does not strand existing snapshots.
#[derive(Clone, Debug)]
pub struct FileSnapshotStorage {
    path: PathBuf,
    compression: Compression,
    level: i32,
    keep_backup: bool,
}

impl FileSnapshotStorage {
    /// Uncompressed JSON at `path`, no backup.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::from_config(&StorageConfig::at(path))
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self {
            path: config.path.clone(),
            compression: config.compression,
            level: config.level,
            keep_backup: config.keep_backup,
        }
    }

    pub fn with_compression(mut self, compression: Compression, level: i32) -> Self {
        self.compression = compression;
        self.level = level;
        self
    }

    pub fn keep_backup(mut self, keep: bool) -> Self {
        self.keep_backup = keep;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where the previous snapshot is kept when backups are enabled.
    pub fn backup_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".bak");
        PathBuf::from(name)
    }

    fn encode(&self, snapshot: &Snapshot) -> AccessResult<Vec<u8>> {
        let malformed = |e: serde_json::Error| AccessError::MalformedSnapshot(e.to_string());
        match self.compression {
            Compression::None => serde_json::to_vec_pretty(snapshot).map_err(malformed),
            Compression::Zstd => {
                let json = serde_json::to_vec(snapshot).map_err(malformed)?;
                zstd::encode_all(json.as_slice(), self.level)
                    .map_err(|e| AccessError::io(&self.path, e))
            }
        }
    }

    fn decode(&self, bytes: Vec<u8>) -> AccessResult<Snapshot> {
        let json = match Compression::detect(&bytes) {
            Compression::None => bytes,
            Compression::Zstd => zstd::decode_all(bytes.as_slice()).map_err(|e| {
                AccessError::MalformedSnapshot(format!("{}: {e}", self.path.display()))
            })?,
        };
        serde_json::from_slice(&json).map_err(|e| AccessError::MalformedSnapshot(e.to_string()))
    }

    fn directory(&self) -> &Path {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        }
    }
}

impl SnapshotStorage for FileSnapshotStorage {
    fn load(&self) -> AccessResult<Option<Snapshot>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(AccessError::io(&self.path, e)),
        };
        let snapshot = self.decode(bytes)?;
        snapshot.check_version()?;
        debug!(path = %self.path.display(), records = snapshot.len(), "read snapshot file");
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &Snapshot) -> AccessResult<()> {
        let bytes = self.encode(snapshot)?;
        let dir = self.directory();
        fs::create_dir_all(dir).map_err(|e| AccessError::io(dir, e))?;

        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| AccessError::io(dir, e))?;
        tmp.write_all(&bytes)
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| AccessError::io(tmp.path(), e))?;

        if self.keep_backup && self.path.exists() {
            let backup = self.backup_path();
            if let Err(e) = fs::copy(&self.path, &backup) {
                warn!(path = %backup.display(), error = %e, "could not keep snapshot backup");
            }
        }

        tmp.persist(&self.path)
            .map_err(|e| AccessError::io(&self.path, e.error))?;
        debug!(
            path = %self.path.display(),
            bytes = bytes.len(),
            compression = ?self.compression,
            "wrote snapshot file"
        );
        Ok(())
    }

    fn clear(&self) -> AccessResult<()> {
        for path in [self.path.clone(), self.backup_path()] {
            match fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "removed snapshot file"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(AccessError::io(path, e)),
            }
        }
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}
