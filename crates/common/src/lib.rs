//! # Common Strata
//!
//! Core shared types and error definitions for the Strata workspace.
//! This crate provides the building blocks the other Strata crates
//! depend on.
//!
//! ## Key Features
//! - Error taxonomy with the `StrataError` trait
//! - Layered configuration loading (defaults, TOML file, environment)
//!
//! ## Design Principles
//! - Minimal dependencies to avoid bloat in dependent crates
//! - thiserror for library errors, anyhow reserved for application glue
//! - Serde support for serialization across boundaries

pub mod config;
pub mod error;

// Re-export commonly used types at the crate root for convenience
pub use config::*;
pub use error::*;

/// Version of the common crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
