//! Common module
//!
//! This module contains shared types, errors, and utility functions used throughout the crate.

pub mod error;
pub mod log;
pub mod buffer_pool;
pub mod types;

// Re-export commonly used types and functions
pub use error::{DbwireError, Result};
pub use self::log::init_logger;
pub use buffer_pool::{ScratchPool, ScratchBuffer};
pub use types::{ConnectionId, Direction, PacketType, TraceParent};
