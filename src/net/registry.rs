//! In-memory registry of peers observed on the local network.
//!
//! The registry maps the *socket-observed* source address of a discovery
//! response to the peer's last-known identity. Keying on the observed
//! address (rather than anything self-reported in the payload) means a
//! peer cannot register itself under an address it does not actually
//! send from.
//!
//! The registry is owned by a [`DiscoveryEngine`](super::DiscoveryEngine)
//! instance and shared with it via `Arc` — there is no process-wide
//! singleton, so independent engines (e.g. in tests) never share state.

use std::collections::HashMap;
use std::net::IpAddr;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// A peer's last-known identity as seen on the network.
///
/// `name` and `port` come from the peer's response payload; `ip` is the
/// address the response actually arrived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    /// Human-readable display name, supplied by the peer. Not unique.
    pub name: String,
    /// Socket-observed source address of the latest response.
    pub ip: IpAddr,
    /// The peer's advertised HTTP ingest port.
    pub port: u16,
}

/// Concurrency-safe store of discovered peers.
///
/// Writers (the discovery receive loop) and readers (discovery rounds,
/// HTTP query handlers) run concurrently; each operation holds the lock
/// only for the duration of one map access.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: RwLock<HashMap<IpAddr, PeerRecord>>,
}

impl PeerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the record for `ip` (last-write-wins).
    pub fn upsert(&self, ip: IpAddr, record: PeerRecord) {
        self.peers.write().insert(ip, record);
    }

    /// Removes every record. Called at the start of each discovery round.
    pub fn clear(&self) {
        self.peers.write().clear();
    }

    /// Returns a clone of all current records, in no particular order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<PeerRecord> {
        self.peers.read().values().cloned().collect()
    }

    /// Returns the number of known peers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    /// Returns true if no peers are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }
}
