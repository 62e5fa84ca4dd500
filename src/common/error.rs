//! Error handling module
//!
//! This module defines the error types and result type aliases used by the
//! configuration layer and the replay tool. Classification itself never
//! fails: detectors answer with a [`Decision`](crate::protocol::Decision).

use thiserror::Error;
use std::io;

use crate::config::ConfigError;

/// dbwire error type
#[derive(Error, Debug)]
pub enum DbwireError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed replay input
    #[error("Invalid input at line {line}: {message}")]
    Input {
        /// 1-based line number in the input file
        line: usize,
        /// What was wrong with the line
        message: String,
    },

    /// Other error
    #[error("Other error: {0}")]
    Other(String),
}

/// Result type alias
///
/// This is a `Result` type alias that uses our custom `DbwireError`.
pub type Result<T> = std::result::Result<T, DbwireError>;
