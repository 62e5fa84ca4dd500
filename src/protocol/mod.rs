//! Protocol classification module
//!
//! This module decides which SQL wire protocol a connection speaks by
//! looking at one fragment at a time. Detectors never fail: every input,
//! however malformed, ends in a [`Decision`].
//!
//! The module uses Rust's trait system to keep detectors interchangeable;
//! the [`Dispatcher`] offers each fragment to every detector in turn.

mod dispatcher;
pub mod mysql;
pub mod postgres;
pub mod sql;

pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use mysql::{MySqlDetector, MySqlHeader, Inspection};
pub use postgres::{PostgresDetector, PostgresSubMessage};
pub use sql::{KeywordSniffer, SqlSniffer};

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::common::ConnectionId;
use crate::emit::{EmitOutcome, RecordHeader};

/// Classified application protocol of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolVerdict {
    /// Not classified yet
    #[default]
    Unknown,
    /// MySQL client/server protocol
    MySql,
    /// PostgreSQL frontend/backend protocol
    Postgres,
}

impl ProtocolVerdict {
    /// Whether a protocol has been decided
    pub fn is_concrete(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Static name, usable as a metric label
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::MySql => "mysql",
            Self::Postgres => "postgres",
        }
    }

    /// Whether a detector for `protocol` should still look at this connection
    pub fn admits(&self, protocol: ProtocolVerdict) -> bool {
        *self == protocol || *self == Self::Unknown
    }
}

impl fmt::Display for ProtocolVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "Unknown"),
            Self::MySql => write!(f, "MySQL"),
            Self::Postgres => write!(f, "PostgreSQL"),
        }
    }
}

/// Result of offering one fragment to one detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// The fragment belongs to this protocol
    Accept,
    /// The fragment does not (yet) match this protocol
    Reject,
    /// Classification is deferred until the next fragment arrives
    NeedMoreData,
}

/// Protocol detector trait
///
/// This trait defines the interface shared by the per-protocol detectors.
pub trait ProtocolDetector: Send + Sync {
    /// Protocol this detector recognizes
    fn protocol(&self) -> ProtocolVerdict;

    /// Classify one fragment of `conn`
    ///
    /// `verdict` holds the connection's current verdict. On `Accept` the
    /// detector updates it and the protocol cache.
    fn classify(&self, conn: &ConnectionId, verdict: &mut ProtocolVerdict, data: &[u8]) -> Decision;

    /// Forward an accepted fragment through the large-buffer side channel
    fn send_large_buffer(&self, conn: &ConnectionId, header: RecordHeader, data: &[u8]) -> EmitOutcome;

    /// Release per-request state when an accepted fragment is not forwarded
    fn discard_pending(&self, _conn: &ConnectionId) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_admits() {
        assert!(ProtocolVerdict::Unknown.admits(ProtocolVerdict::MySql));
        assert!(ProtocolVerdict::MySql.admits(ProtocolVerdict::MySql));
        assert!(!ProtocolVerdict::Postgres.admits(ProtocolVerdict::MySql));
        assert_eq!(ProtocolVerdict::default(), ProtocolVerdict::Unknown);
    }

    #[test]
    fn test_verdict_serde() {
        assert_eq!(serde_json::to_string(&ProtocolVerdict::MySql).unwrap(), "\"mysql\"");
        assert_eq!(serde_json::to_string(&Decision::NeedMoreData).unwrap(), "\"need_more_data\"");
    }
}
