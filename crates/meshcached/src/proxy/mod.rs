//! The proxy server — accept loop and per-connection handlers.
//!
//! Each accepted connection gets its own task and its own handler value,
//! so browser requests and peer queries are serviced in parallel. The
//! accept loop survives transient errors under the bounded retry policy
//! and gives up only on persistent failure.

pub mod handler;
pub mod origin;
pub mod peer_client;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use meshcache_core::config::MeshConfig;
use meshcache_core::retry::RetryPolicy;
use meshcache_services::{CacheStore, PeerSet};

use self::handler::ConnectionHandler;

/// Everything a connection handler needs, cheap to clone per connection.
#[derive(Clone)]
pub struct ProxyState {
    /// This node's own `ip:port`, skipped during peer iteration.
    pub local_endpoint: String,
    pub peers: PeerSet,
    pub store: CacheStore,
    pub config: Arc<MeshConfig>,
}

/// Accept connections forever, spawning a handler task per connection.
/// Returns when the shutdown channel fires or accept fails persistently.
pub async fn serve(
    listener: TcpListener,
    state: ProxyState,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let policy = RetryPolicy::default();
    let mut backoff = policy.backoff();
    let mut failures = 0u32;

    tracing::info!(addr = %listener.local_addr()?, "proxy server listening");

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("proxy server stopping");
                return Ok(());
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    failures = 0;
                    backoff = policy.backoff();

                    let state = state.clone();
                    tokio::spawn(async move {
                        if let Err(e) = ConnectionHandler::new(state).run(stream).await {
                            tracing::debug!(peer = %addr, error = %e, "connection handler failed");
                        }
                    });
                }
                Err(e) => {
                    failures += 1;
                    if failures >= policy.max_attempts {
                        return Err(e).context("accept failing persistently, proxy exiting");
                    }
                    tracing::warn!(failures, error = %e, "accept failed, backing off");
                    tokio::time::sleep(backoff.next_delay()).await;
                }
            }
        }
    }
}
