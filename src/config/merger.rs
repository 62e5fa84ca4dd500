//! Configuration merging functionality
//!
//! This module provides functionality for merging configurations from different sources.

use super::ClassifierConfig;

/// Trait for merging configurations
pub trait ConfigMerger {
    /// Merge another configuration into this one
    ///
    /// Values from `other` will override values in `self` if they are not the default values.
    /// This is used to implement the configuration priority system.
    fn merge(&self, other: impl AsRef<Self>) -> Self where Self: Sized;
}

impl ConfigMerger for ClassifierConfig {
    fn merge(&self, other: impl AsRef<Self>) -> Self {
        let other = other.as_ref();
        let default = Self::default();

        fn merge_field<T: Clone + PartialEq>(self_val: &T, other_val: &T, default_val: &T) -> T {
            if other_val != default_val {
                other_val.clone()
            } else {
                self_val.clone()
            }
        }

        Self {
            log_level: merge_field(&self.log_level, &other.log_level, &default.log_level),
            mysql_large_buffer_size: merge_field(
                &self.mysql_large_buffer_size,
                &other.mysql_large_buffer_size,
                &default.mysql_large_buffer_size,
            ),
            postgres_large_buffer_size: merge_field(
                &self.postgres_large_buffer_size,
                &other.postgres_large_buffer_size,
                &default.postgres_large_buffer_size,
            ),
            inline_buffer_size: merge_field(
                &self.inline_buffer_size,
                &other.inline_buffer_size,
                &default.inline_buffer_size,
            ),
            max_concurrent_requests: merge_field(
                &self.max_concurrent_requests,
                &other.max_concurrent_requests,
                &default.max_concurrent_requests,
            ),
            scratch_buffers: merge_field(
                &self.scratch_buffers,
                &other.scratch_buffers,
                &default.scratch_buffers,
            ),
            output_queue_capacity: merge_field(
                &self.output_queue_capacity,
                &other.output_queue_capacity,
                &default.output_queue_capacity,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_prefers_non_default() {
        let base = ClassifierConfig {
            scratch_buffers: 4,
            ..Default::default()
        };
        let overlay = ClassifierConfig {
            log_level: "trace".to_string(),
            ..Default::default()
        };

        let merged = base.merge(&overlay);
        assert_eq!(merged.log_level, "trace");
        // Default in overlay does not clobber base
        assert_eq!(merged.scratch_buffers, 4);
    }
}
