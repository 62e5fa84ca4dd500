//! Configuration module
//!
//! This module handles engine configuration, including loading from
//! different sources (files, environment variables, command line arguments)
//! and validating the configuration.
//!
//! Everything here is read once at startup. Protocol sanity ceilings such
//! as the MySQL payload limit are compile-time constants in the protocol
//! modules.

// Submodules
mod defaults;
mod error;
mod loader;
mod merger;
mod validator;

// Re-export types and traits
pub use self::error::{ConfigError, Result};
pub use self::loader::ConfigLoader;
pub use self::merger::ConfigMerger;
pub use self::validator::ConfigValidator;

use serde::{Deserialize, Serialize};

/// Engine configuration
///
/// Contains all options needed to size the caches, scratch pools and output
/// queue of a [`Dispatcher`](crate::protocol::Dispatcher).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "defaults::log_level")]
    pub log_level: String,

    /// Capacity of MySQL large-buffer records in bytes
    /// Must be a power of two no larger than 16384; 0 disables MySQL emission
    #[serde(default = "defaults::mysql_large_buffer_size")]
    pub mysql_large_buffer_size: usize,

    /// Capacity of Postgres large-buffer records in bytes
    /// Must be a power of two no larger than 16384; 0 disables Postgres emission
    #[serde(default = "defaults::postgres_large_buffer_size")]
    pub postgres_large_buffer_size: usize,

    /// Payload bytes the primary event record carries inline
    /// Fragments up to this size never produce a large-buffer record
    #[serde(default = "defaults::inline_buffer_size")]
    pub inline_buffer_size: usize,

    /// Bound on tracked connections; sizes the protocol cache and the
    /// partial header store
    #[serde(default = "defaults::max_concurrent_requests")]
    pub max_concurrent_requests: usize,

    /// Scratch buffers pre-allocated per protocol
    #[serde(default = "defaults::scratch_buffers")]
    pub scratch_buffers: usize,

    /// Capacity of the output record queue
    #[serde(default = "defaults::output_queue_capacity")]
    pub output_queue_capacity: usize,
}

impl Default for ClassifierConfig {
    /// Create a default configuration using centralized defaults
    #[inline]
    fn default() -> Self {
        Self {
            log_level: defaults::log_level(),
            mysql_large_buffer_size: defaults::mysql_large_buffer_size(),
            postgres_large_buffer_size: defaults::postgres_large_buffer_size(),
            inline_buffer_size: defaults::inline_buffer_size(),
            max_concurrent_requests: defaults::max_concurrent_requests(),
            scratch_buffers: defaults::scratch_buffers(),
            output_queue_capacity: defaults::output_queue_capacity(),
        }
    }
}

impl AsRef<ClassifierConfig> for ClassifierConfig {
    #[inline]
    fn as_ref(&self) -> &ClassifierConfig {
        self
    }
}

/// Log the configuration
pub fn log_config(config: &ClassifierConfig) {
    use log::info;

    if !log::log_enabled!(log::Level::Info) {
        return;
    }

    info!("=== Final Configuration ===");
    info!("  Log level: {}", config.log_level);
    info!("  MySQL large buffer: {} bytes", config.mysql_large_buffer_size);
    info!("  Postgres large buffer: {} bytes", config.postgres_large_buffer_size);
    info!("  Inline buffer: {} bytes", config.inline_buffer_size);
    info!("  Max concurrent requests: {}", config.max_concurrent_requests);
    info!("  Scratch buffers per protocol: {}", config.scratch_buffers);
    info!("  Output queue capacity: {}", config.output_queue_capacity);
    info!("=========================");
}

// Export constants needed externally
pub use defaults::{ENV_PREFIX, CONFIG_FILE_ENV, DEFAULT_CONFIG_FILE, LARGE_BUFFER_MAX};
