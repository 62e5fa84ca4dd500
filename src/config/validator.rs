//! Configuration validator
//!
//! This module provides functionality for validating configuration.

use log::warn;

use super::defaults::LARGE_BUFFER_MAX;
use super::error::{ConfigError, Result};
use super::ClassifierConfig;

/// Trait for validating configuration
pub trait ConfigValidator {
    /// Validate configuration
    ///
    /// Returns an error if the configuration cannot be used to build an engine.
    fn validate(&self) -> Result<()>;

    /// Check configuration for potential issues
    ///
    /// Unlike `validate()`, this method never fails; it returns warnings.
    fn check(&self) -> Vec<String>;
}

/// A large-buffer capacity is either disabled (0) or a power of two within bounds
fn validate_large_buffer_size(name: &str, size: usize) -> Result<()> {
    if size == 0 {
        return Ok(());
    }

    if !size.is_power_of_two() {
        return Err(ConfigError::InvalidValue(
            name.to_string(),
            format!("{} is not a power of two", size),
        ));
    }

    if size > LARGE_BUFFER_MAX {
        return Err(ConfigError::InvalidValue(
            name.to_string(),
            format!("{} exceeds the maximum of {}", size, LARGE_BUFFER_MAX),
        ));
    }

    Ok(())
}

fn validate_non_zero(name: &str, value: usize) -> Result<()> {
    if value == 0 {
        return Err(ConfigError::InvalidValue(
            name.to_string(),
            "must be greater than 0".to_string(),
        ));
    }
    Ok(())
}

impl ConfigValidator for ClassifierConfig {
    fn validate(&self) -> Result<()> {
        validate_large_buffer_size("mysql_large_buffer_size", self.mysql_large_buffer_size)?;
        validate_large_buffer_size("postgres_large_buffer_size", self.postgres_large_buffer_size)?;

        validate_non_zero("max_concurrent_requests", self.max_concurrent_requests)?;
        validate_non_zero("scratch_buffers", self.scratch_buffers)?;
        validate_non_zero("output_queue_capacity", self.output_queue_capacity)?;

        match self.log_level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            level => {
                return Err(ConfigError::InvalidValue(
                    "log_level".to_string(),
                    format!("Invalid log level: {}. Valid values are: error, warn, info, debug, trace", level),
                ));
            }
        }

        Ok(())
    }

    fn check(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.mysql_large_buffer_size == 0 && self.postgres_large_buffer_size == 0 {
            warnings.push("Large-buffer emission is disabled for every protocol".to_string());
        }

        let largest = self.mysql_large_buffer_size.max(self.postgres_large_buffer_size);
        if largest != 0 && self.inline_buffer_size >= largest {
            warnings.push(format!(
                "inline_buffer_size ({}) is not smaller than the large-buffer capacity ({}); no large buffers will be emitted",
                self.inline_buffer_size, largest
            ));
        }

        for warning in &warnings {
            warn!("{}", warning);
        }

        warnings
    }
}
