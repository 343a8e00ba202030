//! Configuration: runtime settings and the vault list file.

pub mod settings;

pub use settings::{load_vault_names, validate_vault_name, Settings, SettingsArgs};
