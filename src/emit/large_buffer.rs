//! Large-buffer record builder shared by the protocol detectors

use log::{debug, trace, warn};
use metrics::counter;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use super::{LargeBufferAction, LargeBufferRecord, OutputChannel};
use crate::common::{PacketType, ScratchPool, TraceParent};
use crate::config::LARGE_BUFFER_MAX;

/// Bytes moved per iteration of the block copy loop
pub const COPY_BLOCK_SIZE: usize = 16;

/// Upper bound on block copy iterations; covers the largest buffer
const COPY_BLOCKS_MAX: usize = LARGE_BUFFER_MAX / COPY_BLOCK_SIZE;

/// Tags stamped on every record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    /// Request or response payload
    pub packet_type: PacketType,
    /// Init or append
    pub action: LargeBufferAction,
    /// Trace context snapshot
    pub trace_parent: TraceParent,
}

/// What happened to a large-buffer emission request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum EmitOutcome {
    /// A record was handed to the output channel
    Sent {
        /// Payload bytes in the record
        len: usize,
        /// Whether the payload was cut at capacity
        truncated: bool,
    },
    /// The fragment was a bare MySQL header, parked until the next fragment
    Deferred,
    /// Nothing worth emitting (fragment too short to hold a header)
    Skipped,
    /// The fragment fits the primary event record; no side-channel record
    Inline,
    /// No scratch buffer was free or the output channel refused the record
    Dropped,
    /// Emission is turned off for this protocol
    Disabled,
}

/// Copy `min(dst.len(), src.len())` bytes in fixed-size blocks
///
/// The block loop runs at most [`LARGE_BUFFER_MAX`] / [`COPY_BLOCK_SIZE`]
/// times; whatever does not fill a whole block is copied by the remainder
/// branch. Returns the number of bytes copied.
pub fn copy_in_blocks(dst: &mut [u8], src: &[u8]) -> usize {
    let len = dst.len().min(src.len()).min(LARGE_BUFFER_MAX);
    let mut offset = 0;

    for _ in 0..COPY_BLOCKS_MAX {
        if offset + COPY_BLOCK_SIZE > len {
            break;
        }
        dst[offset..offset + COPY_BLOCK_SIZE].copy_from_slice(&src[offset..offset + COPY_BLOCK_SIZE]);
        offset += COPY_BLOCK_SIZE;
    }

    if offset < len {
        dst[offset..len].copy_from_slice(&src[offset..len]);
    }

    len
}

/// Builds bounded large-buffer records and hands them to the output channel
///
/// Each emitter owns a pool of scratch buffers sized to its capacity, so
/// building a record never allocates. Emission never fails the caller:
/// exhaustion and a full channel both end in [`EmitOutcome::Dropped`].
pub struct LargeBufferEmitter {
    protocol: &'static str,
    capacity: usize,
    pool: ScratchPool,
    sink: Arc<dyn OutputChannel>,
}

impl LargeBufferEmitter {
    /// Create an emitter
    ///
    /// # Parameters
    ///
    /// * `protocol` - Name used in logs and metric labels
    /// * `capacity` - Record capacity in bytes; 0 disables emission, other
    ///   values are rounded down to a power of two
    /// * `buffers` - Scratch buffers to pre-allocate
    /// * `sink` - Output channel receiving the records
    pub fn new(protocol: &'static str, capacity: usize, buffers: usize, sink: Arc<dyn OutputChannel>) -> Self {
        let requested = capacity.min(LARGE_BUFFER_MAX);
        let capacity = match requested.checked_ilog2() {
            Some(bits) => 1 << bits,
            None => 0,
        };
        if capacity != requested {
            warn!("{}: large buffer capacity {} rounded down to {}", protocol, requested, capacity);
        }
        let buffers = if capacity == 0 { 0 } else { buffers };

        Self {
            protocol,
            capacity,
            pool: ScratchPool::new(buffers, capacity),
            sink,
        }
    }

    /// Whether records are emitted at all
    pub fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    /// Record capacity in bytes
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Scratch pool backing this emitter
    pub fn pool(&self) -> &ScratchPool {
        &self.pool
    }

    /// Emit `prefix` followed by `data`, cut at capacity
    pub fn emit(&self, header: RecordHeader, prefix: &[u8], data: &[u8]) -> EmitOutcome {
        if !self.is_enabled() {
            return EmitOutcome::Disabled;
        }

        let mut buffer = match self.pool.try_get_buffer() {
            Some(buffer) => buffer,
            None => {
                debug!("{}: no scratch buffer available, dropping large buffer", self.protocol);
                counter!("dbwire.large_buffer.dropped", "protocol" => self.protocol, "reason" => "scratch").increment(1);
                return EmitOutcome::Dropped;
            }
        };

        let cap = buffer.capacity();
        let total = prefix.len().saturating_add(data.len());
        let len = total.min(cap);
        let truncated = total > cap;
        if truncated {
            warn!("{}: large buffer is full, truncating {} bytes to {}", self.protocol, total, cap);
            counter!("dbwire.large_buffer.truncated", "protocol" => self.protocol).increment(1);
        }

        let prefix_len = copy_in_blocks(&mut buffer[..len], prefix);
        copy_in_blocks(&mut buffer[prefix_len..len], data);

        let record = LargeBufferRecord::new(header, buffer, len, truncated);
        match self.sink.emit(record) {
            Ok(()) => {
                trace!("{}: emitted large buffer len={} truncated={}", self.protocol, len, truncated);
                counter!("dbwire.large_buffer.sent", "protocol" => self.protocol).increment(1);
                EmitOutcome::Sent { len, truncated }
            }
            Err(e) => {
                debug!("{}: output channel dropped large buffer: {}", self.protocol, e);
                counter!("dbwire.large_buffer.dropped", "protocol" => self.protocol, "reason" => "channel").increment(1);
                EmitOutcome::Dropped
            }
        }
    }
}

impl fmt::Debug for LargeBufferEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LargeBufferEmitter")
            .field("protocol", &self.protocol)
            .field("capacity", &self.capacity)
            .field("pool", &self.pool)
            .finish()
    }
}
