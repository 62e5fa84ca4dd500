//! Pending MySQL headers split across two fragments
//!
//! Some clients write the 4-byte packet header and the command body with
//! two separate sends. The header half is parked here until the fragment
//! carrying the command id shows up.

use log::trace;

use super::BoundedStore;
use crate::common::ConnectionId;

/// Size of a MySQL packet header without its command id
pub const PENDING_HEADER_SIZE: usize = 4;

/// The first four bytes of a MySQL packet: 24-bit length and sequence id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PendingMySqlHeader {
    bytes: [u8; PENDING_HEADER_SIZE],
}

impl PendingMySqlHeader {
    /// Build from a fragment that is exactly one header long
    pub fn from_fragment(data: &[u8]) -> Option<Self> {
        let bytes: [u8; PENDING_HEADER_SIZE] = data.try_into().ok()?;
        Some(Self { bytes })
    }

    /// Declared payload length (little-endian u24)
    pub fn payload_length(&self) -> u32 {
        u32::from(self.bytes[0]) | (u32::from(self.bytes[1]) << 8) | (u32::from(self.bytes[2]) << 16)
    }

    /// Packet sequence id
    pub fn sequence_id(&self) -> u8 {
        self.bytes[3]
    }

    /// Raw header bytes as seen on the wire
    pub fn as_bytes(&self) -> &[u8; PENDING_HEADER_SIZE] {
        &self.bytes
    }
}

/// Per-connection store of pending MySQL headers
///
/// At most one header is pending per connection; a newer one replaces it.
#[derive(Debug)]
pub struct PartialHeaderStore {
    store: BoundedStore<ConnectionId, PendingMySqlHeader>,
}

impl PartialHeaderStore {
    /// Create a store for at most `capacity` connections
    pub fn new(capacity: usize) -> Self {
        Self {
            store: BoundedStore::new(capacity),
        }
    }

    /// Park a header for `conn`, replacing any older one
    pub fn store(&self, conn: ConnectionId, header: PendingMySqlHeader) {
        trace!("partial header store: {} pending len={} seq={}", conn, header.payload_length(), header.sequence_id());
        self.store.put(conn, header);
    }

    /// Read the pending header without consuming it
    pub fn peek(&self, conn: &ConnectionId) -> Option<PendingMySqlHeader> {
        self.store.peek(conn)
    }

    /// Read and remove the pending header
    pub fn take(&self, conn: &ConnectionId) -> Option<PendingMySqlHeader> {
        self.store.take(conn)
    }

    /// Number of connections with a pending header
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Whether no header is pending
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Maximum number of pending headers
    pub fn capacity(&self) -> usize {
        self.store.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> ConnectionId {
        ConnectionId::new(7, "127.0.0.1:40000".parse().unwrap(), "127.0.0.1:3306".parse().unwrap())
    }

    #[test]
    fn test_header_fields() {
        let header = PendingMySqlHeader::from_fragment(&[0x05, 0x01, 0x00, 0x02]).unwrap();
        assert_eq!(header.payload_length(), 0x0105);
        assert_eq!(header.sequence_id(), 2);
    }

    #[test]
    fn test_wrong_length_rejected() {
        assert!(PendingMySqlHeader::from_fragment(&[1, 2, 3]).is_none());
        assert!(PendingMySqlHeader::from_fragment(&[1, 2, 3, 4, 5]).is_none());
    }

    #[test]
    fn test_last_writer_wins_and_take_consumes() {
        let store = PartialHeaderStore::new(16);
        let first = PendingMySqlHeader::from_fragment(&[1, 0, 0, 0]).unwrap();
        let second = PendingMySqlHeader::from_fragment(&[2, 0, 0, 1]).unwrap();

        store.store(conn(), first);
        store.store(conn(), second);

        assert_eq!(store.peek(&conn()), Some(second));
        assert_eq!(store.take(&conn()), Some(second));
        assert_eq!(store.take(&conn()), None);
    }
}
