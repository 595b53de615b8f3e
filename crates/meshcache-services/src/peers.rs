//! Peer set — every cache endpoint this node knows about, itself included.
//!
//! Written by the membership listener, read by every connection handler.
//! The set only grows: there is no liveness detection and no pruning, a
//! departed peer simply stays listed and its queries fail over. Insertion
//! is idempotent, so duplicate announcements are harmless.

use std::sync::Arc;

use dashmap::DashSet;

/// The peer set — shared between the membership listener and the proxy's
/// connection handlers. Entries are `ip:port` strings.
pub type PeerSet = Arc<DashSet<String>>;

/// Create a peer set seeded with this node's own endpoint.
pub fn new_peer_set(self_endpoint: &str) -> PeerSet {
    let peers = DashSet::new();
    peers.insert(self_endpoint.to_string());
    Arc::new(peers)
}

/// Snapshot the set into a plain Vec.
///
/// Handlers iterate the snapshot, never the live set — holding shard
/// guards across awaits would block the membership listener's inserts.
pub fn snapshot(peers: &PeerSet) -> Vec<String> {
    peers.iter().map(|e| e.key().clone()).collect()
}
