//! Inventory model: what a vault holds at one point in time.
//!
//! This module provides:
//! - `SecretVersionRecord`, `SecretRecord` and the `Inventory` alias (`record`)
//! - The inventory differ producing add/remove change-sets (`diff`)

pub mod diff;
pub mod record;

pub use diff::diff;
pub use record::{ChangeSet, Inventory, SecretChange, SecretRecord, SecretVersionRecord};
