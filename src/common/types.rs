//! Shared types module
//!
//! This module contains the identity and direction types handed to the
//! engine by the interception layer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;

/// Identity of one observed TCP connection
///
/// Supplied by the interception layer and immutable for the lifetime of the
/// connection. The engine only hashes and compares it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId {
    /// Process owning the socket
    pub pid: u32,
    /// Local end of the socket
    pub src: SocketAddr,
    /// Remote end of the socket
    pub dst: SocketAddr,
}

impl ConnectionId {
    /// Create a new connection identity
    pub fn new(pid: u32, src: SocketAddr, dst: SocketAddr) -> Self {
        Self { pid, src, dst }
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}->{}", self.pid, self.src, self.dst)
    }
}

/// Direction of a fragment relative to the database session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Client to server
    Request,
    /// Server to client
    Response,
}

/// Packet type tag carried by large-buffer records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PacketType {
    /// Request payload
    Request = 1,
    /// Response payload
    Response = 2,
}

impl From<Direction> for PacketType {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Request => PacketType::Request,
            Direction::Response => PacketType::Response,
        }
    }
}

/// Snapshot of the trace context active when a fragment was observed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraceParent {
    /// W3C trace id
    pub trace_id: [u8; 16],
    /// Span the fragment belongs to
    pub span_id: [u8; 8],
    /// Parent of `span_id`
    pub parent_span_id: [u8; 8],
    /// Trace flags (sampled bit etc.)
    pub flags: u8,
}

impl TraceParent {
    /// Create a trace parent with the given ids and the sampled flag set
    pub fn new(trace_id: [u8; 16], span_id: [u8; 8]) -> Self {
        Self {
            trace_id,
            span_id,
            parent_span_id: [0; 8],
            flags: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_to_packet_type() {
        assert_eq!(PacketType::from(Direction::Request), PacketType::Request);
        assert_eq!(PacketType::from(Direction::Response) as u8, 2);
    }

    #[test]
    fn test_connection_id_serde() {
        let conn = ConnectionId::new(
            42,
            "10.0.0.1:51000".parse().unwrap(),
            "10.0.0.2:3306".parse().unwrap(),
        );
        let json = serde_json::to_string(&conn).unwrap();
        let back: ConnectionId = serde_json::from_str(&json).unwrap();
        assert_eq!(conn, back);
        assert_eq!(conn.to_string(), "42:10.0.0.1:51000->10.0.0.2:3306");
    }
}
