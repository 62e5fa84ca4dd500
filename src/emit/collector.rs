//! Consumer-side reassembly of large-buffer records
//!
//! Records for the same request arrive as one `Init` followed by any number
//! of `Append`s. The collector stitches them together per trace context and
//! packet type until the span that needs the payload extracts it. A payload
//! can be extracted once.

use log::debug;
use lru::LruCache;
use std::num::NonZeroUsize;

use super::{LargeBufferAction, LargeBufferRecord};
use crate::common::PacketType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CollectorKey {
    trace_id: [u8; 16],
    span_id: [u8; 8],
    packet_type: PacketType,
}

/// Reassembles payloads from large-buffer records
#[derive(Debug)]
pub struct LargeBufferCollector {
    buffers: LruCache<CollectorKey, Vec<u8>>,
    max_payload: usize,
}

impl LargeBufferCollector {
    /// Create a collector
    ///
    /// # Parameters
    ///
    /// * `max_requests` - Payloads kept at once; the least recently touched is dropped
    /// * `max_payload` - Bytes kept per payload; further appends are cut
    pub fn new(max_requests: usize, max_payload: usize) -> Self {
        let capacity = NonZeroUsize::new(max_requests).unwrap_or(NonZeroUsize::MIN);
        Self {
            buffers: LruCache::new(capacity),
            max_payload,
        }
    }

    /// Fold a record into the payload it belongs to
    ///
    /// Consumes the record, which releases its scratch buffer.
    pub fn collect(&mut self, record: LargeBufferRecord) {
        let key = CollectorKey {
            trace_id: record.trace_parent.trace_id,
            span_id: record.trace_parent.span_id,
            packet_type: record.packet_type,
        };

        let bytes = record.payload();
        match record.action {
            LargeBufferAction::Init => {
                let keep = bytes.len().min(self.max_payload);
                self.buffers.put(key, bytes[..keep].to_vec());
            }
            LargeBufferAction::Append => {
                let max_payload = self.max_payload;
                let buffer = self.buffers.get_or_insert_mut(key, Vec::new);
                let room = max_payload.saturating_sub(buffer.len());
                if room < bytes.len() {
                    debug!("large buffer collector: payload limit reached, dropping {} bytes", bytes.len() - room);
                }
                buffer.extend_from_slice(&bytes[..bytes.len().min(room)]);
            }
        }
    }

    /// Remove and return the payload for a span, if any was collected
    pub fn extract(&mut self, trace_id: [u8; 16], span_id: [u8; 8], packet_type: PacketType) -> Option<Vec<u8>> {
        self.buffers.pop(&CollectorKey {
            trace_id,
            span_id,
            packet_type,
        })
    }

    /// Number of payloads held
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Whether no payload is held
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}
