//! dbwire: SQL wire-protocol classification and stream reassembly
//!
//! This library looks at raw TCP fragments observed on a connection and
//! decides whether the connection speaks the MySQL or the PostgreSQL wire
//! protocol. Accepted request and response payloads that do not fit inline
//! are forwarded as bounded large-buffer records through a lossy output
//! channel, where a collector can stitch them back together per span.
//!
//! # Main Features
//!
//! - Sticky per-connection protocol verdicts with LRU-bounded state
//! - MySQL headers split across two fragments are reassembled
//! - PostgreSQL frontend message walks with bounded iteration
//! - Large-buffer records built from pre-allocated scratch buffers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use dbwire::{Dispatcher, ClassifierConfig, ConnectionId, Direction, record_channel};
//!
//! let config = ClassifierConfig::default();
//! let (sink, mut records) = record_channel(config.output_queue_capacity);
//! let dispatcher = Dispatcher::new(&config, Arc::new(sink));
//!
//! let conn = ConnectionId::new(1, "10.0.0.1:40000".parse().unwrap(), "10.0.0.2:3306".parse().unwrap());
//! let outcome = dispatcher.deliver_fragment(&conn, Direction::Request, b"\x09\x00\x00\x00\x03SELECT 1");
//! println!("{:?}", outcome);
//!
//! while let Some(record) = records.try_recv() {
//!     println!("{} bytes", record.len());
//! }
//! ```

// Public modules
pub mod cache;
pub mod common;
pub mod config;
pub mod emit;
pub mod protocol;

// Re-export commonly used structures and functions for convenience
pub use cache::{PartialHeaderStore, ProtocolCache};
pub use common::{ConnectionId, DbwireError, Direction, PacketType, Result, TraceParent};
pub use config::ClassifierConfig;
pub use emit::{
    record_channel, EmitOutcome, LargeBufferCollector, LargeBufferRecord, OutputChannel, QueueSink, RecordReceiver,
};
pub use protocol::{Decision, DispatchOutcome, Dispatcher, ProtocolDetector, ProtocolVerdict};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
