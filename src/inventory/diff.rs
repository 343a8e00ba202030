//! Inventory differ.
//!
//! `diff(from, to)` answers: which versions in `from` are absent from, or
//! different in, `to`?  The orchestrator calls it twice with swapped
//! arguments:
//!
//! ```text
//! to_add    = diff(actual, cached)
//! to_remove = diff(cached, actual)
//! ```

use super::record::{find_secret, ChangeSet, SecretChange, SecretRecord};

/// Compare two inventories from `from`'s perspective.
///
/// For every secret in `from` (in `from`'s order), collects the version
/// ids that are missing from the matching secret in `to` or whose
/// metadata is not structurally equal to it.  A secret missing from `to`
/// contributes all of its versions.  Secrets with nothing to report are
/// left out entirely.
pub fn diff(from: &[SecretRecord], to: &[SecretRecord]) -> ChangeSet {
    from.iter()
        .filter_map(|secret| {
            let versions: Vec<String> = match find_secret(to, &secret.name) {
                None => secret.versions.iter().map(|v| v.version.clone()).collect(),
                Some(other) => secret
                    .versions
                    .iter()
                    .filter(|v| other.version(&v.version) != Some(*v))
                    .map(|v| v.version.clone())
                    .collect(),
            };

            if versions.is_empty() {
                None
            } else {
                Some(SecretChange {
                    name: secret.name.clone(),
                    versions,
                })
            }
        })
        .collect()
}
