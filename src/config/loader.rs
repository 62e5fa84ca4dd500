//! Configuration loading functionality
//!
//! This module provides functionality for loading configuration from different sources
//! such as files and environment variables.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use ::config::{Config, Environment, File};
use log::debug;

use super::defaults::{CONFIG_FILE_ENV, DEFAULT_CONFIG_FILE, ENV_PREFIX};
use super::error::{ConfigError, Result};
use super::ClassifierConfig;

/// Trait for loading configuration from different sources
pub trait ConfigLoader {
    /// Load configuration from a JSON file
    fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> where Self: Sized;

    /// Load configuration from `DBWIRE_*` environment variables
    fn from_env() -> Result<Self> where Self: Sized;

    /// Load configuration with proper priority:
    /// 1. Default values (lowest priority)
    /// 2. Configuration file (`dbwire.json` or `$DBWIRE_CONFIG_FILE`)
    /// 3. Environment variables (highest priority)
    fn auto_load() -> Result<Self> where Self: Sized;
}

/// Environment source restricted to option variables
///
/// `DBWIRE_CONFIG_FILE` shares the prefix but names a path, not an option.
fn environment_source() -> Environment {
    let vars: ::config::Map<String, String> = env::vars()
        .filter(|(key, _)| key != CONFIG_FILE_ENV)
        .collect();

    Environment::with_prefix(ENV_PREFIX)
        .try_parsing(true)
        .source(Some(vars))
}

impl ConfigLoader for ClassifierConfig {
    fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::FileReadError(path.to_path_buf(), e.to_string()))?;

        serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))
    }

    fn from_env() -> Result<Self> {
        let config = Config::builder()
            .add_source(environment_source())
            .build()?;

        Ok(config.try_deserialize::<Self>()?)
    }

    fn auto_load() -> Result<Self> {
        let config_path = env::var(CONFIG_FILE_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));

        let config = Config::builder()
            .add_source(File::from(config_path.clone()).required(false))
            .add_source(environment_source())
            .build()?;

        let loaded = config.try_deserialize::<Self>()?;
        if config_path.exists() {
            debug!("Configuration loaded from {}", config_path.display());
        }

        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_from_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{ "log_level": "debug", "scratch_buffers": 8 }}"#).unwrap();

        let config = ClassifierConfig::from_file(file.path()).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.scratch_buffers, 8);
        assert_eq!(config.output_queue_capacity, 1024);
    }

    #[test]
    fn test_from_missing_file() {
        let result = ClassifierConfig::from_file("definitely/not/here.json");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_from_malformed_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, "{{ not json").unwrap();

        let result = ClassifierConfig::from_file(file.path());
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }
}
