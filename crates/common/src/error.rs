//! Error handling for Strata
//!
//! This module defines the error infrastructure shared by the workspace:
//! - `StrataError` trait for consistent error handling
//! - `RepositoryError`, the taxonomy every repository operation surfaces
//! - `ConfigurationError` for configuration loading and validation
//!
//! # Design Principles
//! - All errors implement Send + Sync for async compatibility
//! - Use thiserror for library errors, anyhow for application glue
//! - Provide clear, actionable error messages

use thiserror::Error;

/// Base trait for all Strata-specific errors
///
/// This trait ensures all Strata errors are:
/// - Thread-safe (Send + Sync)
/// - Static lifetime (no borrowed data)
/// - Implement standard Error trait
pub trait StrataError: std::error::Error + Send + Sync + 'static {}

/// The error taxonomy surfaced by repository operations.
///
/// Backend-native failures never cross the repository's public surface;
/// they are normalized into one of these kinds at the translation
/// boundary. The repository performs no internal retries: every variant
/// is re-raised to the caller, who maps it to their own retry policy.
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// The requested record does not exist. Not retried.
    #[error("record not found: {details}")]
    NotFound { details: String },

    /// A uniqueness or other constraint was violated. Callers may retry
    /// with different input.
    #[error("constraint conflict: {details}")]
    Conflict { details: String },

    /// Any other backend failure, carrying the original message.
    /// Potentially transient from the caller's perspective.
    #[error("storage backend failure: {message}")]
    Storage { message: String },
}

impl StrataError for RepositoryError {}

impl RepositoryError {
    /// Create a not-found error
    pub fn not_found(details: impl Into<String>) -> Self {
        Self::NotFound {
            details: details.into(),
        }
    }

    /// Create a conflict error
    pub fn conflict(details: impl Into<String>) -> Self {
        Self::Conflict {
            details: details.into(),
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}

/// Result alias for repository operations
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Configuration-related errors
///
/// These errors occur during configuration loading, parsing, or validation.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    /// Configuration file not found
    #[error("configuration file not found: {path}")]
    FileNotFound { path: String },

    /// Configuration parsing failed
    #[error("failed to parse configuration: {details}")]
    ParseError { details: String },

    /// Invalid configuration value
    #[error("invalid configuration value for {key}: {value} ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    /// Environment variable error
    #[error("environment variable error for {var}: {details}")]
    EnvironmentError { var: String, details: String },
}

impl StrataError for ConfigurationError {}
