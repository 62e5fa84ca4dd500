//! MySQL protocol detector
//!
//! A MySQL client packet starts with a 4-byte header (24-bit little-endian
//! payload length, 8-bit sequence id) followed by a command id. Some
//! clients send the header and the body with two writes; the bare header
//! is then parked in the [`PartialHeaderStore`] and stitched onto the next
//! fragment of the connection.

use log::{debug, trace};
use metrics::counter;
use std::sync::Arc;

use super::sql::SqlSniffer;
use super::{Decision, ProtocolDetector, ProtocolVerdict};
use crate::cache::{PartialHeaderStore, PendingMySqlHeader, ProtocolCache, PENDING_HEADER_SIZE};
use crate::common::ConnectionId;
use crate::emit::{EmitOutcome, LargeBufferEmitter, RecordHeader};

/// Header plus command id
pub const MYSQL_HEADER_SIZE: usize = PENDING_HEADER_SIZE + 1;

/// Largest payload length accepted while classifying
pub const MYSQL_PAYLOAD_LENGTH_MAX: u32 = 1 << 13;

/// Text protocol query
pub const COM_QUERY: u8 = 0x03;
/// Prepared statement creation
pub const COM_STMT_PREPARE: u8 = 0x16;
/// Prepared statement execution
pub const COM_STMT_EXECUTE: u8 = 0x17;

/// A reconstructed MySQL packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MySqlHeader {
    /// Declared payload length (command id included)
    pub payload_length: u32,
    /// Packet sequence id
    pub sequence_id: u8,
    /// Command id, the first payload byte
    pub command_id: u8,
    /// Whether the first four bytes came from an earlier fragment
    pub split: bool,
}

impl MySqlHeader {
    /// Parse a complete header from the start of a fragment
    fn parse(data: &[u8]) -> Option<Self> {
        let bytes = data.get(..MYSQL_HEADER_SIZE)?;
        let pending = PendingMySqlHeader::from_fragment(&bytes[..PENDING_HEADER_SIZE])?;
        Some(Self::from_pending(pending, bytes[PENDING_HEADER_SIZE], false))
    }

    fn from_pending(pending: PendingMySqlHeader, command_id: u8, split: bool) -> Self {
        Self {
            payload_length: pending.payload_length(),
            sequence_id: pending.sequence_id(),
            command_id,
            split,
        }
    }

    /// Offset of the first byte after the command id within the fragment
    pub fn body_offset(&self) -> usize {
        if self.split {
            1
        } else {
            MYSQL_HEADER_SIZE
        }
    }
}

/// Outcome of [`MySqlDetector::inspect`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inspection {
    /// Classification decision
    pub decision: Decision,
    /// Header the decision was based on, if one could be built
    pub header: Option<MySqlHeader>,
}

impl Inspection {
    fn new(decision: Decision, header: Option<MySqlHeader>) -> Self {
        Self { decision, header }
    }
}

/// Stateful MySQL classifier and large-buffer path
pub struct MySqlDetector {
    cache: Arc<ProtocolCache>,
    pending: Arc<PartialHeaderStore>,
    sniffer: Arc<dyn SqlSniffer>,
    emitter: LargeBufferEmitter,
}

impl MySqlDetector {
    /// Create a detector over shared caches
    pub fn new(
        cache: Arc<ProtocolCache>,
        pending: Arc<PartialHeaderStore>,
        sniffer: Arc<dyn SqlSniffer>,
        emitter: LargeBufferEmitter,
    ) -> Self {
        Self {
            cache,
            pending,
            sniffer,
            emitter,
        }
    }

    /// The large-buffer emitter of this detector
    pub fn emitter(&self) -> &LargeBufferEmitter {
        &self.emitter
    }

    /// Park a bare header; returns whether `data` was one
    fn park_bare_header(&self, conn: &ConnectionId, data: &[u8]) -> bool {
        match PendingMySqlHeader::from_fragment(data) {
            Some(header) => {
                self.pending.store(*conn, header);
                true
            }
            None => false,
        }
    }

    /// Build the header for `data`, borrowing a parked prefix if needed
    fn header_for(&self, conn: &ConnectionId, data: &[u8]) -> Option<MySqlHeader> {
        if let Some(header) = MySqlHeader::parse(data) {
            if header.payload_length as usize == data.len() - PENDING_HEADER_SIZE {
                return Some(header);
            }
        }

        let command_id = *data.first()?;
        let pending = self.pending.peek(conn)?;
        Some(MySqlHeader::from_pending(pending, command_id, true))
    }

    /// Classify one fragment and report the header behind the decision
    pub fn inspect(&self, conn: &ConnectionId, verdict: &mut ProtocolVerdict, data: &[u8]) -> Inspection {
        if !verdict.admits(ProtocolVerdict::MySql) {
            return Inspection::new(Decision::Reject, None);
        }

        // 只有包頭，等下一個片段
        if self.park_bare_header(conn, data) {
            trace!("mysql: {} parked bare header", conn);
            counter!("dbwire.classify.pending", "protocol" => "mysql").increment(1);
            return Inspection::new(Decision::NeedMoreData, None);
        }

        let header = match self.header_for(conn, data) {
            Some(header) => header,
            None => return Inspection::new(Decision::Reject, None),
        };

        if header.payload_length > MYSQL_PAYLOAD_LENGTH_MAX {
            trace!("mysql: {} payload length {} too large", conn, header.payload_length);
            return Inspection::new(Decision::Reject, Some(header));
        }

        let known = *verdict == ProtocolVerdict::MySql;
        let accepted = match header.command_id {
            COM_QUERY | COM_STMT_PREPARE => {
                let body = data.get(header.body_offset()..).unwrap_or(&[]);
                self.sniffer.contains_sql_statement(body)
            }
            COM_STMT_EXECUTE => known,
            _ => known && ((header.sequence_id == 1 && !header.split) || header.sequence_id > 1),
        };

        if !accepted {
            return Inspection::new(Decision::Reject, Some(header));
        }

        *verdict = ProtocolVerdict::MySql;
        self.cache.set(*conn, ProtocolVerdict::MySql);
        debug!(
            "mysql: {} accepted command 0x{:02x} seq={} split={}",
            conn, header.command_id, header.sequence_id, header.split
        );
        counter!("dbwire.classify.accepted", "protocol" => "mysql").increment(1);
        Inspection::new(Decision::Accept, Some(header))
    }
}

impl ProtocolDetector for MySqlDetector {
    fn protocol(&self) -> ProtocolVerdict {
        ProtocolVerdict::MySql
    }

    fn classify(&self, conn: &ConnectionId, verdict: &mut ProtocolVerdict, data: &[u8]) -> Decision {
        self.inspect(conn, verdict, data).decision
    }

    fn send_large_buffer(&self, conn: &ConnectionId, header: RecordHeader, data: &[u8]) -> EmitOutcome {
        if self.park_bare_header(conn, data) {
            return EmitOutcome::Deferred;
        }

        let pending = self.pending.take(conn);
        let prefix: &[u8] = match &pending {
            Some(pending) => pending.as_bytes(),
            None if data.len() < MYSQL_HEADER_SIZE => return EmitOutcome::Skipped,
            None => &[],
        };

        self.emitter.emit(header, prefix, data)
    }

    fn discard_pending(&self, conn: &ConnectionId) {
        self.pending.take(conn);
    }
}
