//! # Configuration Loader
//!
//! Figment-based configuration loading with layered support:
//! 1. Compiled defaults
//! 2. Configuration file (TOML)
//! 3. Environment variable overrides
//!
//! Nested fields map to environment variables with a double underscore,
//! e.g. `STRATA_DATABASE__URL`.

use crate::error::ConfigurationError;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Default configuration file name
const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Environment variable prefix for Strata
const DEFAULT_ENV_PREFIX: &str = "STRATA";

/// Load configuration with the default options
pub fn load_config<T>() -> Result<T, ConfigurationError>
where
    T: Default + DeserializeOwned + serde::Serialize,
{
    load_config_with_options::<T>(LoadOptions::default())
}

/// Load configuration from a specific file, with environment overrides
pub fn load_from_file<T>(path: &Path) -> Result<T, ConfigurationError>
where
    T: Default + DeserializeOwned + serde::Serialize,
{
    let options = LoadOptions {
        config_path: Some(path.to_path_buf()),
        env_prefix: DEFAULT_ENV_PREFIX.to_string(),
        require_file: true,
    };
    load_config_with_options::<T>(options)
}

/// Configuration loading options
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Optional path to configuration file
    pub config_path: Option<PathBuf>,
    /// Environment variable prefix
    pub env_prefix: String,
    /// Whether the configuration file is required
    pub require_file: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            config_path: None,
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
            require_file: false,
        }
    }
}

/// Load configuration with custom options
pub fn load_config_with_options<T>(options: LoadOptions) -> Result<T, ConfigurationError>
where
    T: Default + DeserializeOwned + serde::Serialize,
{
    let mut figment = Figment::new().merge(Serialized::defaults(T::default()));

    let config_path = determine_config_path(options.config_path)?;

    if let Some(path) = &config_path {
        if path.exists() {
            debug!("Loading configuration from file: {}", path.display());
            figment = figment.merge(Toml::file(path));
        } else if options.require_file {
            return Err(ConfigurationError::FileNotFound {
                path: path.display().to_string(),
            });
        } else {
            warn!(
                "Configuration file not found: {} (using defaults)",
                path.display()
            );
        }
    }

    figment = figment.merge(
        Env::prefixed(&format!("{}_", options.env_prefix))
            .split("__")
            .ignore(&["PATH", "HOME", "USER"]),
    );

    let config: T = figment
        .extract()
        .map_err(|err| ConfigurationError::ParseError {
            details: format!("failed to parse configuration: {err}"),
        })?;

    debug!(
        "Configuration loaded from {} sources",
        figment.metadata().count()
    );

    Ok(config)
}

/// Determine configuration file path with fallback logic
fn determine_config_path(
    override_path: Option<PathBuf>,
) -> Result<Option<PathBuf>, ConfigurationError> {
    if let Some(path) = override_path {
        return Ok(Some(path));
    }

    if let Ok(env_path) = std::env::var("STRATA_CONFIG_PATH") {
        let path = PathBuf::from(env_path);
        debug!("Using config path from environment: {}", path.display());
        return Ok(Some(path));
    }

    let current_dir_config = std::env::current_dir()
        .map_err(|e| ConfigurationError::EnvironmentError {
            var: "current_dir".to_string(),
            details: e.to_string(),
        })?
        .join(DEFAULT_CONFIG_FILE);

    if current_dir_config.exists() {
        return Ok(Some(current_dir_config));
    }

    debug!("No configuration file found, using defaults");
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::env;
    use tempfile::NamedTempFile;

    #[derive(Debug, Default, Deserialize, Serialize, PartialEq)]
    struct TestConfig {
        pub name: String,
        pub port: u16,
        pub nested: NestedConfig,
    }

    #[derive(Debug, Default, Deserialize, Serialize, PartialEq)]
    struct NestedConfig {
        pub enabled: bool,
        pub timeout: u64,
    }

    #[test]
    fn test_load_from_toml_file() {
        let toml_content = r#"
            name = "test"
            port = 8080

            [nested]
            enabled = true
            timeout = 30
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut temp_file, toml_content.as_bytes()).unwrap();

        let config: TestConfig = load_from_file(temp_file.path()).unwrap();
        assert_eq!(config.name, "test");
        assert_eq!(config.port, 8080);
        assert!(config.nested.enabled);
        assert_eq!(config.nested.timeout, 30);
    }

    #[test]
    fn test_env_var_overrides() {
        // Unique prefix so parallel tests cannot interfere
        let test_prefix = "STRATA_LOADER_TEST";
        env::set_var(format!("{test_prefix}_NAME"), "env_test");
        env::set_var(format!("{test_prefix}_PORT"), "9090");
        env::set_var(format!("{test_prefix}_NESTED__ENABLED"), "true");
        env::set_var(format!("{test_prefix}_NESTED__TIMEOUT"), "60");

        let options = LoadOptions {
            config_path: None,
            env_prefix: test_prefix.to_string(),
            require_file: false,
        };

        let config: TestConfig = load_config_with_options(options).unwrap();
        assert_eq!(config.name, "env_test");
        assert_eq!(config.port, 9090);
        assert!(config.nested.enabled);
        assert_eq!(config.nested.timeout, 60);

        env::remove_var(format!("{test_prefix}_NAME"));
        env::remove_var(format!("{test_prefix}_PORT"));
        env::remove_var(format!("{test_prefix}_NESTED__ENABLED"));
        env::remove_var(format!("{test_prefix}_NESTED__TIMEOUT"));
    }

    #[test]
    fn test_file_not_found_when_required() {
        let non_existent_path = PathBuf::from("/non/existent/config.toml");
        let result: Result<TestConfig, _> = load_from_file(&non_existent_path);

        match result.unwrap_err() {
            ConfigurationError::FileNotFound { path } => {
                assert_eq!(path, "/non/existent/config.toml");
            }
            _ => panic!("Expected FileNotFound error"),
        }
    }
}
