//! Configuration errors
//!
//! This module defines error types for the configuration module.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration error type
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File not found
    #[error("Configuration file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Error reading file
    #[error("Error reading configuration file {}: {1}", .0.display())]
    FileReadError(PathBuf, String),

    /// Error parsing configuration
    #[error("Error parsing configuration: {0}")]
    ParseError(String),

    /// Invalid value for configuration option
    #[error("Invalid value for '{0}': {1}")]
    InvalidValue(String, String),

    /// Other error
    #[error("Configuration error: {0}")]
    Other(String),
}

/// Result type alias for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl From<::config::ConfigError> for ConfigError {
    fn from(err: ::config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
