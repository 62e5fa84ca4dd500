//! Large-buffer side channel
//!
//! Payloads that do not fit the primary event record are forwarded as
//! [`LargeBufferRecord`]s through an [`OutputChannel`]. The channel is
//! bounded and lossy: a full queue drops the record and the engine moves on.

mod collector;
mod large_buffer;

pub use collector::LargeBufferCollector;
pub use large_buffer::{copy_in_blocks, EmitOutcome, LargeBufferEmitter, RecordHeader, COPY_BLOCK_SIZE};

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::common::{PacketType, ScratchBuffer, TraceParent};

/// Event kind tag identifying a large-buffer record on the wire
pub const EVENT_TCP_LARGE_BUFFER: u8 = 12;

/// How a record relates to earlier records of the same request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum LargeBufferAction {
    /// Start a new payload, discarding anything collected before
    Init = 0,
    /// Extend the payload collected so far
    Append = 1,
}

/// A bounded payload snapshot handed to the output channel
///
/// The payload lives in a scratch buffer borrowed from the emitter's pool;
/// dropping the record returns the buffer.
pub struct LargeBufferRecord {
    /// Always [`EVENT_TCP_LARGE_BUFFER`]
    pub kind: u8,
    /// Request or response payload
    pub packet_type: PacketType,
    /// Init or append
    pub action: LargeBufferAction,
    /// Trace context active when the fragment was observed
    pub trace_parent: TraceParent,
    /// Set when the payload was cut at the buffer capacity
    pub truncated: bool,
    len: usize,
    payload: ScratchBuffer,
}

impl LargeBufferRecord {
    pub(crate) fn new(header: RecordHeader, payload: ScratchBuffer, len: usize, truncated: bool) -> Self {
        let len = len.min(payload.capacity());
        Self {
            kind: EVENT_TCP_LARGE_BUFFER,
            packet_type: header.packet_type,
            action: header.action,
            trace_parent: header.trace_parent,
            truncated,
            len,
            payload,
        }
    }

    /// The captured bytes
    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.len]
    }

    /// Number of captured bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether no bytes were captured
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Debug for LargeBufferRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LargeBufferRecord")
            .field("kind", &self.kind)
            .field("packet_type", &self.packet_type)
            .field("action", &self.action)
            .field("trace_parent", &self.trace_parent)
            .field("truncated", &self.truncated)
            .field("len", &self.len)
            .finish()
    }
}

/// Why the output channel refused a record
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dropped {
    /// The queue has no free slot
    #[error("output queue is full")]
    QueueFull,
    /// The consumer went away
    #[error("output queue is closed")]
    Closed,
}

/// Destination for large-buffer records
///
/// Implementations must not block. A refused record is gone; the engine
/// never retries.
#[cfg_attr(test, mockall::automock)]
pub trait OutputChannel: Send + Sync {
    /// Hand over a record
    fn emit(&self, record: LargeBufferRecord) -> Result<(), Dropped>;
}

/// Producer half of the bounded record queue
#[derive(Debug, Clone)]
pub struct QueueSink {
    sender: mpsc::Sender<LargeBufferRecord>,
}

impl OutputChannel for QueueSink {
    fn emit(&self, record: LargeBufferRecord) -> Result<(), Dropped> {
        self.sender.try_send(record).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => Dropped::QueueFull,
            mpsc::error::TrySendError::Closed(_) => Dropped::Closed,
        })
    }
}

/// Consumer half of the bounded record queue
#[derive(Debug)]
pub struct RecordReceiver {
    receiver: mpsc::Receiver<LargeBufferRecord>,
}

impl RecordReceiver {
    /// Take the next queued record without waiting
    pub fn try_recv(&mut self) -> Option<LargeBufferRecord> {
        self.receiver.try_recv().ok()
    }

    /// Wait for the next record; `None` once every sink is gone
    pub async fn recv(&mut self) -> Option<LargeBufferRecord> {
        self.receiver.recv().await
    }
}

/// Create a bounded record queue holding at most `capacity` records
pub fn record_channel(capacity: usize) -> (QueueSink, RecordReceiver) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (QueueSink { sender }, RecordReceiver { receiver })
}
