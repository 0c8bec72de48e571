//! Configuration management for the atomic server
//!
//! Loaded once at startup from TOML; every section falls back to defaults.

mod defaults;
mod loader;
mod schema;

pub use loader::ConfigLoader;
pub use schema::*;
