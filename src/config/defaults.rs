//! Default configuration values
//!
//! This module provides default values for configuration options.
//! It is the single source of truth for defaults so that serde, the
//! loader and the merger agree on what "unset" means.

/// Environment variable prefix for all configuration options
pub const ENV_PREFIX: &str = "DBWIRE";

/// Environment variable naming an explicit configuration file
pub const CONFIG_FILE_ENV: &str = "DBWIRE_CONFIG_FILE";

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "dbwire.json";

/// Default log level as string
pub const LOG_LEVEL_STR: &str = "info";

/// Largest capacity a large-buffer record may be configured with (16K)
pub const LARGE_BUFFER_MAX: usize = 1 << 14;

/// Default log level
pub fn log_level() -> String {
    LOG_LEVEL_STR.to_string()
}

/// Default MySQL large-buffer capacity
pub fn mysql_large_buffer_size() -> usize {
    LARGE_BUFFER_MAX
}

/// Default Postgres large-buffer capacity
pub fn postgres_large_buffer_size() -> usize {
    LARGE_BUFFER_MAX
}

/// Default inline capacity of the primary event record
pub fn inline_buffer_size() -> usize {
    256
}

/// Default bound on concurrently tracked connections
pub fn max_concurrent_requests() -> usize {
    10_000
}

/// Default number of scratch buffers per protocol
pub fn scratch_buffers() -> usize {
    64
}

/// Default capacity of the output queue
pub fn output_queue_capacity() -> usize {
    1024
}
