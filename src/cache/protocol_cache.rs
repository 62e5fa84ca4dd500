//! Sticky per-connection protocol verdicts

use log::trace;

use super::BoundedStore;
use crate::common::ConnectionId;
use crate::protocol::ProtocolVerdict;

/// Per-connection protocol verdict cache
///
/// A verdict only ever moves from `Unknown` to a concrete protocol. The one
/// way back is eviction, after which the connection reads as `Unknown` again.
#[derive(Debug)]
pub struct ProtocolCache {
    store: BoundedStore<ConnectionId, ProtocolVerdict>,
}

impl ProtocolCache {
    /// Create a cache tracking at most `capacity` connections
    pub fn new(capacity: usize) -> Self {
        Self {
            store: BoundedStore::new(capacity),
        }
    }

    /// Verdict for `conn`, `Unknown` on a miss
    pub fn lookup(&self, conn: &ConnectionId) -> ProtocolVerdict {
        self.store.get(conn).unwrap_or(ProtocolVerdict::Unknown)
    }

    /// Record a verdict for `conn`
    ///
    /// Returns true when the stored verdict equals `verdict` afterwards.
    /// Setting `Unknown` and replacing one concrete protocol with another
    /// are both refused.
    pub fn set(&self, conn: ConnectionId, verdict: ProtocolVerdict) -> bool {
        if !verdict.is_concrete() {
            return false;
        }

        let written = self.store.put_if(conn, verdict, |current| match current {
            None | Some(ProtocolVerdict::Unknown) => true,
            Some(existing) => *existing == verdict,
        });

        if !written {
            trace!("protocol cache: refusing to change verdict of {} to {}", conn, verdict);
        }
        written
    }

    /// Drop the verdict for a closed connection
    pub fn forget(&self, conn: &ConnectionId) -> bool {
        self.store.evict(conn)
    }

    /// Number of tracked connections
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Whether no connection is tracked
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Maximum number of tracked connections
    pub fn capacity(&self) -> usize {
        self.store.capacity()
    }

    /// Verdicts lost to capacity pressure
    pub fn evictions(&self) -> u64 {
        self.store.evictions()
    }
}
