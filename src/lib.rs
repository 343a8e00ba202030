pub mod archive;
pub mod cache;
pub mod cli;
pub mod config;
pub mod errors;
pub mod inventory;
pub mod remote;
pub mod sync;
pub mod upload;
