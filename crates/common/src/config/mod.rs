//! # Configuration
//!
//! Layered configuration loading and the shared configuration types.

pub mod loader;
pub mod types;

pub use loader::{load_config, load_config_with_options, load_from_file, LoadOptions};
pub use types::DatabaseConfig;
