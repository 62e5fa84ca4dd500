//! Classification tests
//!
//! These tests drive the public dispatcher API with hand-built MySQL and
//! PostgreSQL fragments.

use std::sync::Arc;

use dbwire::emit::{record_channel, LargeBufferAction, LargeBufferEmitter, RecordHeader};
use dbwire::protocol::mysql::{MySqlDetector, COM_QUERY};
use dbwire::protocol::{KeywordSniffer, PostgresDetector};
use dbwire::{
    ClassifierConfig, ConnectionId, Decision, Direction, DispatchOutcome, Dispatcher, EmitOutcome, PacketType,
    PartialHeaderStore, ProtocolCache, ProtocolDetector, ProtocolVerdict, TraceParent,
};

fn conn(port: u16) -> ConnectionId {
    ConnectionId::new(
        4242,
        format!("172.16.0.5:{}", port).parse().unwrap(),
        "172.16.0.9:3306".parse().unwrap(),
    )
}

fn mysql_packet(sequence_id: u8, command_id: u8, body: &[u8]) -> Vec<u8> {
    let len = (body.len() + 1) as u32;
    let mut data = vec![len as u8, (len >> 8) as u8, (len >> 16) as u8, sequence_id, command_id];
    data.extend_from_slice(body);
    data
}

fn pg_message(message_type: u8, body: &[u8]) -> Vec<u8> {
    let mut data = vec![message_type];
    data.extend_from_slice(&((body.len() + 4) as u32).to_be_bytes());
    data.extend_from_slice(body);
    data
}

fn dispatcher(max_connections: usize) -> Dispatcher {
    let config = ClassifierConfig {
        max_concurrent_requests: max_connections,
        scratch_buffers: 2,
        ..ClassifierConfig::default()
    };
    let (sink, _rx) = record_channel(4);
    Dispatcher::new(&config, Arc::new(sink))
}

#[test]
fn test_mysql_header_split_across_fragments() {
    let cache = Arc::new(ProtocolCache::new(16));
    let pending = Arc::new(PartialHeaderStore::new(16));
    let (sink, _rx) = record_channel(4);
    let detector = MySqlDetector::new(
        Arc::clone(&cache),
        Arc::clone(&pending),
        Arc::new(KeywordSniffer::new()),
        LargeBufferEmitter::new("mysql", 1024, 1, Arc::new(sink)),
    );

    let mut verdict = ProtocolVerdict::Unknown;
    assert_eq!(detector.classify(&conn(1), &mut verdict, &[0x05, 0x00, 0x00, 0x01]), Decision::NeedMoreData);

    let inspection = detector.inspect(&conn(1), &mut verdict, b"\x03SELECT 1");
    assert_eq!(inspection.decision, Decision::Accept);
    let header = inspection.header.unwrap();
    assert_eq!(header.sequence_id, 1);
    assert_eq!(header.command_id, COM_QUERY);
    assert!(header.split);
    assert_eq!(cache.lookup(&conn(1)), ProtocolVerdict::MySql);

    detector.discard_pending(&conn(1));
    assert!(pending.peek(&conn(1)).is_none());
}

#[test]
fn test_dispatcher_split_request_leaves_no_pending_header() {
    let dispatcher = dispatcher(64);

    assert_eq!(dispatcher.deliver_fragment(&conn(1), Direction::Request, &[0x05, 0x00, 0x00, 0x01]), DispatchOutcome::Pending);
    let outcome = dispatcher.deliver_fragment(&conn(1), Direction::Request, b"\x03SELECT 1");

    assert_eq!(outcome.protocol(), Some(ProtocolVerdict::MySql));
    assert!(dispatcher.partial_headers().peek(&conn(1)).is_none());
}

#[test]
fn test_mysql_single_fragment() {
    let dispatcher = dispatcher(64);

    // Declared length matches the fragment exactly
    let query = mysql_packet(0, COM_QUERY, b"SELECT");
    assert_eq!(dispatcher.deliver_fragment(&conn(1), Direction::Request, &query).protocol(), Some(ProtocolVerdict::MySql));

    // COM_QUIT proves nothing on an unknown connection
    let quit = [0x01, 0x00, 0x00, 0x00, 0x01];
    assert_eq!(dispatcher.deliver_fragment(&conn(2), Direction::Request, &quit), DispatchOutcome::Unclassified);
    assert_eq!(dispatcher.verdict(&conn(2)), ProtocolVerdict::Unknown);
}

#[test]
fn test_postgres_messages() {
    let dispatcher = dispatcher(64);

    let query = pg_message(b'Q', b"SELECT");
    assert_eq!(query.len(), 11);
    assert_eq!(
        dispatcher.deliver_fragment(&conn(1), Direction::Request, &query).protocol(),
        Some(ProtocolVerdict::Postgres)
    );

    // One byte short of the declared length
    let query = pg_message(b'Q', b"SELECT 1");
    assert_eq!(dispatcher.deliver_fragment(&conn(2), Direction::Request, &query[..12]), DispatchOutcome::Unclassified);
}

#[test]
fn test_postgres_detector_standalone() {
    let cache = Arc::new(ProtocolCache::new(4));
    let (sink, _rx) = record_channel(1);
    let detector = PostgresDetector::new(Arc::clone(&cache), LargeBufferEmitter::new("postgres", 0, 0, Arc::new(sink)));

    let mut verdict = ProtocolVerdict::Unknown;
    let mut batch = pg_message(b'P', b"\0SELECT 1\0\0\0");
    batch.extend(pg_message(b'S', b""));
    assert_eq!(detector.classify(&conn(1), &mut verdict, &batch), Decision::Accept);
    assert_eq!(verdict, ProtocolVerdict::Postgres);

    // Emission switched off for this protocol
    let header = RecordHeader {
        packet_type: PacketType::Request,
        action: LargeBufferAction::Init,
        trace_parent: TraceParent::default(),
    };
    assert_eq!(detector.send_large_buffer(&conn(1), header, &batch), EmitOutcome::Disabled);
}

#[test]
fn test_verdict_is_monotonic() {
    let dispatcher = dispatcher(64);

    let query = mysql_packet(0, COM_QUERY, b"SELECT 1");
    dispatcher.deliver_fragment(&conn(1), Direction::Request, &query);
    assert_eq!(dispatcher.verdict(&conn(1)), ProtocolVerdict::MySql);

    // Valid PostgreSQL traffic cannot flip a MySQL connection
    let pg = pg_message(b'Q', b"SELECT 1");
    assert_eq!(dispatcher.deliver_fragment(&conn(1), Direction::Request, &pg), DispatchOutcome::Unclassified);
    assert_eq!(dispatcher.verdict(&conn(1)), ProtocolVerdict::MySql);

    // Re-delivering the same fragment is harmless
    assert_eq!(dispatcher.deliver_fragment(&conn(1), Direction::Request, &query).protocol(), Some(ProtocolVerdict::MySql));
    assert_eq!(dispatcher.verdict(&conn(1)), ProtocolVerdict::MySql);
}

#[test]
fn test_eviction_forces_reclassification() {
    let dispatcher = dispatcher(1);

    let query = mysql_packet(0, COM_QUERY, b"SELECT 1");
    dispatcher.deliver_fragment(&conn(1), Direction::Request, &query);
    dispatcher.deliver_fragment(&conn(2), Direction::Request, &pg_message(b'Q', b"SELECT 1"));

    assert_eq!(dispatcher.verdict(&conn(1)), ProtocolVerdict::Unknown);
    assert_eq!(dispatcher.protocol_cache().evictions(), 1);

    // A command that needs a known connection is rejected until re-learned
    let ping = mysql_packet(1, 0x0e, b"");
    assert_eq!(dispatcher.deliver_fragment(&conn(1), Direction::Request, &ping), DispatchOutcome::Unclassified);
    dispatcher.deliver_fragment(&conn(1), Direction::Request, &query);
    assert_eq!(dispatcher.deliver_fragment(&conn(1), Direction::Request, &ping).protocol(), Some(ProtocolVerdict::MySql));
}

#[test]
fn test_arbitrary_lengths_never_panic() {
    let dispatcher = dispatcher(128);
    let patterns: [fn(usize) -> u8; 4] = [
        |_| 0x00,
        |_| 0xFF,
        |i| i as u8,
        |i| if i % 5 == 0 { b'Q' } else { 0x00 },
    ];

    for (p, pattern) in patterns.iter().enumerate() {
        for len in 0..300 {
            let data: Vec<u8> = (0..len).map(pattern).collect();
            let conn = conn(p as u16);
            dispatcher.deliver_fragment(&conn, Direction::Request, &data);
            dispatcher.deliver_fragment(&conn, Direction::Response, &data);
        }
    }
}

#[test]
fn test_lengths_around_ceilings_never_panic() {
    let config = ClassifierConfig {
        mysql_large_buffer_size: 8192,
        postgres_large_buffer_size: 8192,
        inline_buffer_size: 16,
        max_concurrent_requests: 128,
        scratch_buffers: 2,
        ..ClassifierConfig::default()
    };
    let (sink, _rx) = record_channel(4);
    let dispatcher = Dispatcher::new(&config, Arc::new(sink));
    let patterns: [fn(usize) -> u8; 3] = [|_| 0xFF, |i| (i * 31) as u8, |i| if i % 7 == 0 { b'Q' } else { 0x00 }];

    for (p, pattern) in patterns.iter().enumerate() {
        for len in [8191, 8192, 8193, 8197, 16383, 16384, 16385, 20000] {
            let data: Vec<u8> = (0..len).map(pattern).collect();
            let conn = conn(100 + p as u16);
            dispatcher.deliver_fragment(&conn, Direction::Request, &data);
            dispatcher.deliver_fragment(&conn, Direction::Response, &data);
        }
    }

    // Accepted payloads past capacity take the truncation branch
    let (sink, mut records) = record_channel(4);
    let dispatcher = Dispatcher::new(&config, Arc::new(sink));
    for len in [8193usize, 16385, 20000] {
        let body: Vec<u8> = (0..len - 5).map(|i| (i * 17) as u8).collect();
        let query = pg_message(b'Q', &body);
        assert_eq!(query.len(), len);

        let outcome = dispatcher.deliver_fragment(&conn(200), Direction::Request, &query);
        assert_eq!(
            outcome,
            DispatchOutcome::Classified {
                protocol: ProtocolVerdict::Postgres,
                emit: EmitOutcome::Sent { len: 8192, truncated: true }
            }
        );
        let record = records.try_recv().unwrap();
        assert_eq!(record.payload(), &query[..8192]);
    }
}
