//! PostgreSQL protocol detector
//!
//! Frontend messages are `type (1 byte) + length (4 bytes, big-endian,
//! counting itself)`. A fragment is accepted when it is an exact run of
//! such messages and at least one of them is a query-carrying command.

use log::{debug, trace};
use metrics::counter;
use std::sync::Arc;

use super::{Decision, ProtocolDetector, ProtocolVerdict};
use crate::cache::ProtocolCache;
use crate::common::ConnectionId;
use crate::emit::{EmitOutcome, LargeBufferEmitter, RecordHeader};

/// Type byte plus length field
pub const PG_HEADER_SIZE: usize = 5;

/// Sub-messages examined per fragment
pub const PG_MESSAGES_IN_PACKET_MAX: usize = 10;

/// Bind
pub const PG_BIND: u8 = b'B';
/// Execute
pub const PG_EXECUTE: u8 = b'E';
/// Parse
pub const PG_PARSE: u8 = b'P';
/// Simple query
pub const PG_QUERY: u8 = b'Q';

/// One frontend message header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostgresSubMessage {
    /// Message type byte
    pub message_type: u8,
    /// Declared length, including the length field itself
    pub message_len: u32,
}

impl PostgresSubMessage {
    /// Parse the header at the start of `data`
    pub fn parse(data: &[u8]) -> Option<Self> {
        let bytes: &[u8; PG_HEADER_SIZE] = data.get(..PG_HEADER_SIZE)?.try_into().ok()?;
        Some(Self {
            message_type: bytes[0],
            message_len: u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]),
        })
    }

    /// Whether this message carries a statement
    pub fn is_command(&self) -> bool {
        matches!(self.message_type, PG_BIND | PG_EXECUTE | PG_PARSE | PG_QUERY)
    }

    /// Bytes this message occupies on the wire
    fn wire_size(&self) -> usize {
        (self.message_len as usize).saturating_add(1)
    }
}

/// Walk the sub-messages of a fragment
///
/// Returns the number of bytes the walk covered and whether a command
/// message was seen.
fn walk_messages(data: &[u8]) -> (usize, bool) {
    let mut cursor: usize = 0;
    let mut seen_command = false;

    for _ in 0..PG_MESSAGES_IN_PACKET_MAX {
        let message = match data.get(cursor..).and_then(PostgresSubMessage::parse) {
            Some(message) => message,
            None => break,
        };

        cursor = cursor.saturating_add(message.wire_size());
        if message.message_len == 0 {
            break;
        }
        seen_command |= message.is_command();
    }

    (cursor, seen_command)
}

/// PostgreSQL frontend classifier and large-buffer path
///
/// Holds no per-connection state of its own; only the verdict is cached.
pub struct PostgresDetector {
    cache: Arc<ProtocolCache>,
    emitter: LargeBufferEmitter,
}

impl PostgresDetector {
    /// Create a detector
    pub fn new(cache: Arc<ProtocolCache>, emitter: LargeBufferEmitter) -> Self {
        Self { cache, emitter }
    }

    /// The large-buffer emitter of this detector
    pub fn emitter(&self) -> &LargeBufferEmitter {
        &self.emitter
    }
}

impl ProtocolDetector for PostgresDetector {
    fn protocol(&self) -> ProtocolVerdict {
        ProtocolVerdict::Postgres
    }

    fn classify(&self, conn: &ConnectionId, verdict: &mut ProtocolVerdict, data: &[u8]) -> Decision {
        if !verdict.admits(ProtocolVerdict::Postgres) || data.len() < PG_HEADER_SIZE {
            return Decision::Reject;
        }

        let (covered, seen_command) = walk_messages(data);
        if covered != data.len() {
            trace!("postgres: {} messages cover {} of {} bytes", conn, covered, data.len());
            return Decision::Reject;
        }
        if !seen_command {
            return Decision::Reject;
        }

        *verdict = ProtocolVerdict::Postgres;
        self.cache.set(*conn, ProtocolVerdict::Postgres);
        debug!("postgres: {} accepted", conn);
        counter!("dbwire.classify.accepted", "protocol" => "postgres").increment(1);
        Decision::Accept
    }

    fn send_large_buffer(&self, _conn: &ConnectionId, header: RecordHeader, data: &[u8]) -> EmitOutcome {
        self.emitter.emit(header, &[], data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{PacketType, TraceParent};
    use crate::emit::{record_channel, LargeBufferAction};

    fn conn() -> ConnectionId {
        ConnectionId::new(9, "10.0.0.1:52000".parse().unwrap(), "10.0.0.3:5432".parse().unwrap())
    }

    fn message(message_type: u8, body: &[u8]) -> Vec<u8> {
        let len = (body.len() + 4) as u32;
        let mut data = vec![message_type];
        data.extend_from_slice(&len.to_be_bytes());
        data.extend_from_slice(body);
        data
    }

    fn detector(capacity: usize) -> (PostgresDetector, crate::emit::RecordReceiver) {
        let (sink, rx) = record_channel(8);
        let detector = PostgresDetector::new(
            Arc::new(ProtocolCache::new(16)),
            LargeBufferEmitter::new("postgres", capacity, 2, Arc::new(sink)),
        );
        (detector, rx)
    }

    #[test]
    fn test_simple_query_accepted() {
        let (detector, _rx) = detector(64);
        let data = message(PG_QUERY, b"SELECT");
        // Length field 10: itself plus six bytes of text
        assert_eq!(&data[1..5], &[0, 0, 0, 10]);
        assert_eq!(data.len(), 11);

        let mut verdict = ProtocolVerdict::Unknown;
        assert_eq!(detector.classify(&conn(), &mut verdict, &data), Decision::Accept);
        assert_eq!(verdict, ProtocolVerdict::Postgres);
        assert_eq!(detector.cache.lookup(&conn()), ProtocolVerdict::Postgres);
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let (detector, _rx) = detector(64);
        let mut verdict = ProtocolVerdict::Unknown;

        let mut data = message(PG_QUERY, b"SELECT");
        data.push(b' ');
        assert_eq!(detector.classify(&conn(), &mut verdict, &data), Decision::Reject);

        let data = message(PG_QUERY, b"SELECT");
        assert_eq!(detector.classify(&conn(), &mut verdict, &data[..9]), Decision::Reject);
        assert_eq!(verdict, ProtocolVerdict::Unknown);
    }

    #[test]
    fn test_extended_query_batch_accepted() {
        let (detector, _rx) = detector(64);
        let mut data = message(PG_PARSE, b"\0SELECT $1\0\0\0");
        data.extend(message(PG_BIND, b"\0\0\0\0\0\0"));
        data.extend(message(b'D', b"P\0"));
        data.extend(message(PG_EXECUTE, b"\0\0\0\0\0"));
        data.extend(message(b'S', b""));

        let mut verdict = ProtocolVerdict::Unknown;
        assert_eq!(detector.classify(&conn(), &mut verdict, &data), Decision::Accept);
    }

    #[test]
    fn test_no_command_rejected() {
        let (detector, _rx) = detector(64);
        let mut data = message(b'S', b"");
        data.extend(message(b'H', b""));

        let mut verdict = ProtocolVerdict::Unknown;
        assert_eq!(detector.classify(&conn(), &mut verdict, &data), Decision::Reject);
    }

    #[test]
    fn test_short_and_foreign_rejected() {
        let (detector, _rx) = detector(64);
        let mut verdict = ProtocolVerdict::Unknown;
        assert_eq!(detector.classify(&conn(), &mut verdict, &[b'Q', 0, 0, 0]), Decision::Reject);
        assert_eq!(detector.classify(&conn(), &mut verdict, &[]), Decision::Reject);

        let mut mysql = ProtocolVerdict::MySql;
        assert_eq!(detector.classify(&conn(), &mut mysql, &message(PG_QUERY, b"SELECT 1")), Decision::Reject);
        assert_eq!(mysql, ProtocolVerdict::MySql);
    }

    #[test]
    fn test_zero_length_stops_walk() {
        // A zero length advances one byte and ends the walk
        let (covered, seen) = walk_messages(&[b'Q', 0, 0, 0, 0, 0xAA]);
        assert_eq!(covered, 1);
        assert!(!seen);
    }

    #[test]
    fn test_walk_is_bounded() {
        let mut data = Vec::new();
        for _ in 0..PG_MESSAGES_IN_PACKET_MAX + 1 {
            data.extend(message(PG_QUERY, b"x"));
        }
        let (covered, seen) = walk_messages(&data);
        assert_eq!(covered, PG_MESSAGES_IN_PACKET_MAX * 6);
        assert!(seen);

        let (detector, _rx) = detector(64);
        let mut verdict = ProtocolVerdict::Unknown;
        assert_eq!(detector.classify(&conn(), &mut verdict, &data), Decision::Reject);
    }

    #[test]
    fn test_huge_length_does_not_overflow() {
        let data = [b'Q', 0xFF, 0xFF, 0xFF, 0xFF, b'Q', 0, 0, 0, 4];
        let (covered, _) = walk_messages(&data);
        assert!(covered > data.len());
    }

    #[test]
    fn test_large_buffer_copies_fragment() {
        let (detector, mut rx) = detector(16);
        let header = RecordHeader {
            packet_type: PacketType::Response,
            action: LargeBufferAction::Append,
            trace_parent: TraceParent::default(),
        };

        assert_eq!(detector.send_large_buffer(&conn(), header, &[7u8; 16]), EmitOutcome::Sent { len: 16, truncated: false });
        assert_eq!(detector.send_large_buffer(&conn(), header, &[7u8; 17]), EmitOutcome::Sent { len: 16, truncated: true });

        let first = rx.try_recv().unwrap();
        assert_eq!(first.action, LargeBufferAction::Append);
        assert_eq!(first.packet_type, PacketType::Response);
        assert!(!first.truncated);
        assert!(rx.try_recv().unwrap().truncated);
    }
}
