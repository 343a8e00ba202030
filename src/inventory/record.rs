//! Secret and version metadata as observed in a remote vault.
//!
//! The serialized shape of these types is also the on-disk cache format,
//! so field names are kept stable.  Absent optional fields serialize as
//! `null` rather than being skipped: equality between a freshly fetched
//! record and a cached one must survive the JSON round-trip.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Metadata of one version of one secret (never the value).
///
/// Equality is structural: any single differing field makes two
/// records unequal, which is how a changed version is detected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretVersionRecord {
    /// Opaque version identifier.
    pub version: String,

    pub enabled: bool,

    #[serde(default)]
    pub content_type: Option<String>,

    /// ISO-8601 timestamps, as text.
    #[serde(default)]
    pub created_on: Option<String>,
    #[serde(default)]
    pub updated_on: Option<String>,
    #[serde(default)]
    pub not_before: Option<String>,
    #[serde(default)]
    pub expires_on: Option<String>,

    #[serde(default)]
    pub tags: Option<BTreeMap<String, String>>,

    #[serde(default)]
    pub managed: bool,
}

impl SecretVersionRecord {
    /// A minimal enabled record with no optional metadata.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            enabled: true,
            content_type: None,
            created_on: None,
            updated_on: None,
            not_before: None,
            expires_on: None,
            tags: None,
            managed: false,
        }
    }
}

/// A named secret together with every known version of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRecord {
    pub name: String,
    pub versions: Vec<SecretVersionRecord>,
}

impl SecretRecord {
    /// Find a version by id.
    pub fn version(&self, version: &str) -> Option<&SecretVersionRecord> {
        self.versions.iter().find(|v| v.version == version)
    }
}

/// All secrets of one vault, in the order they were listed.
pub type Inventory = Vec<SecretRecord>;

/// Find a secret by name within an inventory.
pub fn find_secret<'a>(inventory: &'a [SecretRecord], name: &str) -> Option<&'a SecretRecord> {
    inventory.iter().find(|s| s.name == name)
}

/// The version ids of one secret that differ between two inventories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretChange {
    pub name: String,
    pub versions: Vec<String>,
}

/// Secret versions newly present/changed (add-set) or gone (remove-set).
pub type ChangeSet = Vec<SecretChange>;

/// Total number of version ids across a change-set.
pub fn version_count(changes: &[SecretChange]) -> usize {
    changes.iter().map(|c| c.versions.len()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_optionals_serialize_as_null() {
        let record = SecretVersionRecord::new("v1");
        let json = serde_json::to_value(&record).unwrap();
        assert!(json["tags"].is_null());
        assert!(json["expires_on"].is_null());
        assert_eq!(json["enabled"], true);
    }

    #[test]
    fn deserializes_record_with_missing_optional_fields() {
        let json = r#"{"version":"abc","enabled":false}"#;
        let record: SecretVersionRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.version, "abc");
        assert!(!record.enabled);
        assert!(record.tags.is_none());
        assert!(!record.managed);
    }

    #[test]
    fn tag_difference_breaks_equality() {
        let a = SecretVersionRecord::new("v1");
        let mut b = a.clone();
        b.tags = Some(BTreeMap::from([("owner".to_string(), "ops".to_string())]));
        assert_ne!(a, b);
    }

    #[test]
    fn find_secret_and_version() {
        let inventory = vec![SecretRecord {
            name: "db-pass".into(),
            versions: vec![SecretVersionRecord::new("v1"), SecretVersionRecord::new("v2")],
        }];

        let secret = find_secret(&inventory, "db-pass").unwrap();
        assert!(secret.version("v2").is_some());
        assert!(secret.version("v3").is_none());
        assert!(find_secret(&inventory, "other").is_none());
    }

    #[test]
    fn version_count_sums_all_changes() {
        let changes = vec![
            SecretChange {
                name: "a".into(),
                versions: vec!["1".into(), "2".into()],
            },
            SecretChange {
                name: "b".into(),
                versions: vec!["3".into()],
            },
        ];
        assert_eq!(version_count(&changes), 3);
    }
}
