//! Fragment dispatcher
//!
//! The entry point of the engine. Each fragment handed over by the
//! interception layer is offered to the detectors in turn; the first one to
//! accept classifies the connection and forwards the fragment through its
//! large-buffer path when it does not fit inline.

use log::{debug, trace};
use metrics::counter;
use serde::Serialize;
use std::sync::Arc;

use super::mysql::MySqlDetector;
use super::postgres::PostgresDetector;
use super::sql::{KeywordSniffer, SqlSniffer};
use super::{Decision, ProtocolDetector, ProtocolVerdict};
use crate::cache::{BoundedStore, PartialHeaderStore, ProtocolCache};
use crate::common::{ConnectionId, Direction, PacketType, TraceParent};
use crate::config::ClassifierConfig;
use crate::emit::{EmitOutcome, LargeBufferAction, LargeBufferEmitter, OutputChannel, RecordHeader};

/// What the dispatcher did with a fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// A detector accepted the fragment
    Classified {
        /// Protocol of the connection
        protocol: ProtocolVerdict,
        /// Result of the large-buffer path
        emit: EmitOutcome,
    },
    /// A detector is waiting for the next fragment
    Pending,
    /// No detector accepted the fragment
    Unclassified,
}

impl DispatchOutcome {
    /// Protocol the fragment was classified as, if any
    pub fn protocol(&self) -> Option<ProtocolVerdict> {
        match self {
            Self::Classified { protocol, .. } => Some(*protocol),
            _ => None,
        }
    }
}

/// Routes fragments to the protocol detectors
pub struct Dispatcher {
    cache: Arc<ProtocolCache>,
    pending: Arc<PartialHeaderStore>,
    detectors: Vec<Box<dyn ProtocolDetector>>,
    /// Packet type of the last accepted fragment per connection, inline or emitted
    cursors: BoundedStore<ConnectionId, PacketType>,
    inline_buffer_size: usize,
}

impl Dispatcher {
    /// Create a dispatcher with the default SQL sniffer
    pub fn new(config: &ClassifierConfig, sink: Arc<dyn OutputChannel>) -> Self {
        Self::with_sniffer(config, sink, Arc::new(KeywordSniffer::new()))
    }

    /// Create a dispatcher with a custom SQL sniffer
    pub fn with_sniffer(config: &ClassifierConfig, sink: Arc<dyn OutputChannel>, sniffer: Arc<dyn SqlSniffer>) -> Self {
        let cache = Arc::new(ProtocolCache::new(config.max_concurrent_requests));
        let pending = Arc::new(PartialHeaderStore::new(config.max_concurrent_requests));

        let mysql = MySqlDetector::new(
            Arc::clone(&cache),
            Arc::clone(&pending),
            sniffer,
            LargeBufferEmitter::new("mysql", config.mysql_large_buffer_size, config.scratch_buffers, Arc::clone(&sink)),
        );
        let postgres = PostgresDetector::new(
            Arc::clone(&cache),
            LargeBufferEmitter::new("postgres", config.postgres_large_buffer_size, config.scratch_buffers, sink),
        );

        let detectors: Vec<Box<dyn ProtocolDetector>> = vec![Box::new(mysql), Box::new(postgres)];
        Self::from_parts(
            cache,
            pending,
            detectors,
            config.inline_buffer_size,
            config.max_concurrent_requests,
        )
    }

    /// Assemble a dispatcher from prebuilt detectors
    ///
    /// Detectors are consulted in the order given.
    pub fn from_parts(
        cache: Arc<ProtocolCache>,
        pending: Arc<PartialHeaderStore>,
        detectors: Vec<Box<dyn ProtocolDetector>>,
        inline_buffer_size: usize,
        max_connections: usize,
    ) -> Self {
        Self {
            cache,
            pending,
            detectors,
            cursors: BoundedStore::new(max_connections),
            inline_buffer_size,
        }
    }

    /// Deliver a fragment with an empty trace context
    pub fn deliver_fragment(&self, conn: &ConnectionId, direction: Direction, data: &[u8]) -> DispatchOutcome {
        self.deliver_traced(conn, direction, data, &TraceParent::default())
    }

    /// Deliver a fragment observed under `trace`
    pub fn deliver_traced(
        &self,
        conn: &ConnectionId,
        direction: Direction,
        data: &[u8],
        trace: &TraceParent,
    ) -> DispatchOutcome {
        let mut verdict = self.cache.lookup(conn);
        trace!("dispatch: {} {:?} {} bytes, verdict {}", conn, direction, data.len(), verdict);

        for detector in &self.detectors {
            match detector.classify(conn, &mut verdict, data) {
                Decision::Accept => {
                    let emit = self.forward(detector.as_ref(), conn, direction, data, trace);
                    return DispatchOutcome::Classified { protocol: verdict, emit };
                }
                Decision::NeedMoreData => return DispatchOutcome::Pending,
                Decision::Reject => continue,
            }
        }

        debug!("dispatch: {} fragment of {} bytes not classified", conn, data.len());
        counter!("dbwire.classify.rejected").increment(1);
        DispatchOutcome::Unclassified
    }

    fn forward(
        &self,
        detector: &dyn ProtocolDetector,
        conn: &ConnectionId,
        direction: Direction,
        data: &[u8],
        trace: &TraceParent,
    ) -> EmitOutcome {
        let packet_type = PacketType::from(direction);
        if data.len() <= self.inline_buffer_size {
            detector.discard_pending(conn);
            // 方向改變後，下一個大片段必須重新開始
            self.cursors.put(*conn, packet_type);
            return EmitOutcome::Inline;
        }

        let action = match self.cursors.peek(conn) {
            Some(last) if last == packet_type => LargeBufferAction::Append,
            _ => LargeBufferAction::Init,
        };
        let header = RecordHeader {
            packet_type,
            action,
            trace_parent: *trace,
        };

        let outcome = detector.send_large_buffer(conn, header, data);
        if let EmitOutcome::Sent { .. } = outcome {
            self.cursors.put(*conn, packet_type);
        }
        outcome
    }

    /// Current verdict for `conn`
    pub fn verdict(&self, conn: &ConnectionId) -> ProtocolVerdict {
        self.cache.lookup(conn)
    }

    /// Drop everything known about a closed connection
    pub fn close(&self, conn: &ConnectionId) {
        self.cache.forget(conn);
        self.pending.take(conn);
        self.cursors.evict(conn);
    }

    /// Shared protocol cache
    pub fn protocol_cache(&self) -> &Arc<ProtocolCache> {
        &self.cache
    }

    /// Shared pending-header store
    pub fn partial_headers(&self) -> &Arc<PartialHeaderStore> {
        &self.pending
    }
}
