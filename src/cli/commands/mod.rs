//! Command implementations, one module per subcommand.

pub mod backup;
pub mod open;
