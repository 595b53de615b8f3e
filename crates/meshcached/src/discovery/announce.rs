//! Presence announcement broadcast.
//!
//! Sends presence datagrams to the well-known multicast group so other
//! caches can add this node to their peer sets. Two modes: a repeating
//! self-announcement whose interval grows from 1 second to a 1 hour cap,
//! and a one-shot greeting sent whenever the membership listener sees a
//! newcomer, so the newcomer learns about this node immediately instead
//! of waiting out our backoff.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;

use anyhow::{Context, Result};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::sync::broadcast;

use meshcache_core::config::MeshConfig;
use meshcache_core::retry::{Backoff, RetryPolicy};
use meshcache_core::wire;

/// Broadcast this node's presence on the backoff schedule. Runs until the
/// shutdown channel fires; a shutdown during the sleep exits cleanly.
pub async fn announce_loop(
    endpoint: String,
    config: Arc<MeshConfig>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let dest = group_addr(&config)?;
    let socket = acquire_send_socket(&RetryPolicy::default()).await?;

    let mut backoff = Backoff::new(
        config.discovery.initial_interval(),
        config.discovery.backoff_factor,
        config.discovery.max_interval(),
    );

    tracing::info!(endpoint = %endpoint, group = %dest, "presence announcements starting");

    loop {
        match send_presence(&socket, &endpoint, dest) {
            Ok(()) => tracing::debug!(endpoint = %endpoint, "presence announced"),
            Err(e) => tracing::warn!(error = %e, "presence send failed"),
        }

        let wait = backoff.next_delay();
        tracing::debug!(wait_secs = wait.as_secs(), "next announcement scheduled");

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = shutdown.recv() => {
                tracing::info!("announce loop stopping");
                return Ok(());
            }
        }
    }
}

/// Send exactly one presence datagram — the greeting for a newly
/// discovered peer. Still multicast, so everyone else hears it too.
pub async fn announce_once(endpoint: &str, config: &MeshConfig) -> Result<()> {
    let dest = group_addr(config)?;
    let socket = acquire_send_socket(&RetryPolicy::default()).await?;
    send_presence(&socket, endpoint, dest)?;
    tracing::debug!(endpoint, group = %dest, "one-shot announce sent");
    Ok(())
}

fn group_addr(config: &MeshConfig) -> Result<SocketAddrV4> {
    let group: Ipv4Addr = config
        .network
        .multicast_group
        .parse()
        .with_context(|| format!("invalid multicast group: {}", config.network.multicast_group))?;
    Ok(SocketAddrV4::new(group, config.network.multicast_port))
}

fn send_presence(socket: &Socket, endpoint: &str, dest: SocketAddrV4) -> Result<()> {
    let packet = wire::encode_presence(endpoint)
        .with_context(|| format!("endpoint too long to announce: {endpoint}"))?;
    socket
        .send_to(&packet, &SocketAddr::V4(dest).into())
        .context("presence send_to")?;
    Ok(())
}

/// Create the multicast send socket, retrying transient failures under the
/// bounded policy. Persistent failure becomes an error instead of a spin.
async fn acquire_send_socket(policy: &RetryPolicy) -> Result<Socket> {
    let mut backoff = policy.backoff();
    let mut attempt = 0;
    loop {
        attempt += 1;
        match make_send_socket() {
            Ok(socket) => return Ok(socket),
            Err(e) if attempt < policy.max_attempts => {
                tracing::warn!(attempt, error = %e, "multicast send socket creation failed, retrying");
                tokio::time::sleep(backoff.next_delay()).await;
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("giving up on multicast send socket after {attempt} attempts")
                });
            }
        }
    }
}

/// Create a UDP socket suitable for sending IPv4 multicast.
fn make_send_socket() -> Result<Socket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).context("socket()")?;
    // TTL 1 — stay on the local network, do not route beyond it
    socket.set_multicast_ttl_v4(1).context("IP_MULTICAST_TTL")?;
    Ok(socket)
}
