//! The persisted snapshot document.
//!
//! One record per known identifier carrying its properties (as ordered
//! key/value pairs), its referred identifiers, and, from version 2 on, its
//! aggregating parent. Version 1 documents carry no aggregation and still
//! load. A missing or unknown version is fatal.
//!
//! This module defines the document only; byte encoding and durable
//! storage live with the [`SnapshotStorage`](crate::SnapshotStorage)
//! implementations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AccessError, AccessResult};

/// Version written by this crate.
pub const SNAPSHOT_VERSION: u32 = 2;

/// Versions this crate can read.
pub const SUPPORTED_VERSIONS: [u32; 2] = [1, SNAPSHOT_VERSION];

/// A full dump of an access table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Format version. Optional only so a missing marker can be reported
    /// as such instead of as a parse failure.
    #[serde(default)]
    pub version: Option<u32>,
    /// When the snapshot was taken (diagnostic only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub records: Vec<SnapshotRecord>,
}

impl Snapshot {
    /// A current-version snapshot stamped with the current time.
    pub fn new(records: Vec<SnapshotRecord>) -> Self {
        Self {
            version: Some(SNAPSHOT_VERSION),
            saved_at: Some(Utc::now()),
            records,
        }
    }

    /// Validate the version marker and return it.
    pub fn check_version(&self) -> AccessResult<u32> {
        match self.version {
            Some(v) if SUPPORTED_VERSIONS.contains(&v) => Ok(v),
            found => Err(AccessError::UnsupportedVersion { found }),
        }
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Everything persisted about one identifier.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<Property>,
    #[serde(default, rename = "referredIDs", skip_serializing_if = "Vec::is_empty")]
    pub referred_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregated_by: Option<String>,
}

impl SnapshotRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}

/// One key/value pair of a record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub key: String,
    pub value: String,
}

impl Property {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_snapshot_has_current_version() {
        let snapshot = Snapshot::new(vec![]);
        assert_eq!(snapshot.check_version().unwrap(), SNAPSHOT_VERSION);
        assert!(snapshot.saved_at.is_some());
        assert!(snapshot.is_empty());
    }

    #[test]
    fn version_one_is_accepted() {
        let snapshot: Snapshot =
            serde_json::from_str(r#"{"version":1,"records":[{"id":"a"}]}"#).unwrap();
        assert_eq!(snapshot.check_version().unwrap(), 1);
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn missing_version_is_rejected() {
        let snapshot: Snapshot = serde_json::from_str(r#"{"records":[]}"#).unwrap();
        assert!(matches!(
            snapshot.check_version(),
            Err(AccessError::UnsupportedVersion { found: None })
        ));
    }

    #[test]
    fn future_version_is_rejected() {
        let snapshot: Snapshot = serde_json::from_str(r#"{"version":7}"#).unwrap();
        assert!(matches!(
            snapshot.check_version(),
            Err(AccessError::UnsupportedVersion { found: Some(7) })
        ));
    }

    #[test]
    fn record_field_names() {
        let record = SnapshotRecord {
            id: "file:/a".into(),
            properties: vec![Property::new("byteSize", "100")],
            referred_ids: vec!["file:/b".into()],
            aggregated_by: Some("folder:/".into()),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], "file:/a");
        assert_eq!(json["properties"][0]["key"], "byteSize");
        assert_eq!(json["referredIDs"][0], "file:/b");
        assert_eq!(json["aggregatedBy"], "folder:/");
    }

    #[test]
    fn empty_fields_are_omitted() {
        let json = serde_json::to_string(&SnapshotRecord::new("x")).unwrap();
        assert_eq!(json, r#"{"id":"x"}"#);
    }
}
