//! meshcache integration test harness.
//!
//! Everything runs in-process over loopback: a test node is the real proxy
//! server task with its own temp-dir cache store and peer set, and origin
//! servers are scripted one-shot listeners. No multicast traffic is sent —
//! membership is exercised at the packet-handling seam, and peer sets are
//! seeded directly where a test needs a cluster.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

use meshcache_core::config::MeshConfig;
use meshcache_services::{new_peer_set, CacheStore, PeerSet};
use meshcached::proxy::{self, ProxyState};

mod discovery;
mod resolution;

static NODE_ID: AtomicU64 = AtomicU64::new(0);

/// One in-process cache node: the proxy server listening on loopback.
pub struct TestNode {
    pub endpoint: String,
    pub peers: PeerSet,
    pub store: CacheStore,
    // Dropping the sender stops the server task.
    _shutdown: broadcast::Sender<()>,
}

/// Start a node on an ephemeral loopback port.
pub async fn start_node() -> Result<TestNode> {
    let id = NODE_ID.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!("meshcache-it-{}-{}", std::process::id(), id));
    let _ = std::fs::remove_dir_all(&dir);
    let store = CacheStore::new(&dir)?;

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let endpoint = listener.local_addr()?.to_string();
    let peers = new_peer_set(&endpoint);

    let mut config = MeshConfig::default();
    config.network.connect_timeout_ms = 500;
    config.network.read_timeout_ms = 2_000;

    let state = ProxyState {
        local_endpoint: endpoint.clone(),
        peers: peers.clone(),
        store: store.clone(),
        config: Arc::new(config),
    };

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    tokio::spawn(proxy::serve(listener, state, shutdown_tx.subscribe()));

    Ok(TestNode {
        endpoint,
        peers,
        store,
        _shutdown: shutdown_tx,
    })
}

/// The network settings the test nodes run with, for driving the peer
/// client directly.
pub fn test_net() -> meshcache_core::config::NetworkConfig {
    let mut net = meshcache_core::config::NetworkConfig::default();
    net.connect_timeout_ms = 500;
    net.read_timeout_ms = 2_000;
    net
}

/// Send a raw request block to `endpoint` and read the reply to EOF.
pub async fn exchange(endpoint: &str, request: &str) -> Result<Vec<u8>> {
    let mut stream = TcpStream::connect(endpoint).await?;
    stream.write_all(request.as_bytes()).await?;
    // Half-close: the server sees EOF after this block and closes its end.
    stream.shutdown().await?;
    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).await?;
    Ok(reply)
}

/// A scripted origin server: accepts exactly one connection, reads the
/// request block, writes `response`, closes. Returns its `ip:port`.
pub async fn scripted_origin(response: &'static [u8]) -> Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?.to_string();

    tokio::spawn(async move {
        if let Ok((mut stream, _)) = listener.accept().await {
            let mut seen = Vec::new();
            let mut buf = [0u8; 1024];
            loop {
                match stream.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        seen.extend_from_slice(&buf[..n]);
                        if seen.windows(4).any(|w| w == b"\r\n\r\n") {
                            break;
                        }
                    }
                }
            }
            let _ = stream.write_all(response).await;
        }
        // The listener drops here — any second fetch attempt fails.
    });

    Ok(addr)
}
