//! meshcache-services — state shared across the daemon's tasks:
//! the peer set and the cache store.

pub mod peers;
pub mod store;

pub use peers::{new_peer_set, snapshot, PeerSet};
pub use store::{storage_key_for, CacheEntry, CacheStore};
