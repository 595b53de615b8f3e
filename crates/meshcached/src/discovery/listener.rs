//! Membership listener.
//!
//! Joins the multicast group and listens for presence datagrams. A datagram
//! naming our service tag and a new `ip:port` grows the peer set and
//! triggers a one-shot greeting announce; everything else is discarded.
//! The peer set never shrinks — there is no liveness detection.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;

use anyhow::{Context, Result};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use meshcache_core::config::MeshConfig;
use meshcache_core::wire;
use meshcache_services::PeerSet;

use super::announce;

/// Receive buffer for presence datagrams. Generous — a presence packet is
/// a few dozen bytes.
const RECV_BUF: usize = 256;

/// Listen for presence datagrams and grow the peer set. Runs until a fatal
/// receive error; per-datagram problems are logged and skipped.
pub async fn listener_loop(
    peers: PeerSet,
    local_endpoint: String,
    config: Arc<MeshConfig>,
) -> Result<()> {
    let group: Ipv4Addr = config
        .network
        .multicast_group
        .parse()
        .with_context(|| format!("invalid multicast group: {}", config.network.multicast_group))?;

    let socket = make_listener_socket(group, config.network.multicast_port)
        .context("failed to create multicast listener socket")?;
    let socket = UdpSocket::from_std(socket).context("failed to convert to tokio UdpSocket")?;

    tracing::info!(group = %group, port = config.network.multicast_port, "membership listener starting");

    let mut buf = vec![0u8; RECV_BUF];
    loop {
        let (len, from) = match socket.recv_from(&mut buf).await {
            Ok(r) => r,
            Err(e) => {
                // Fatal: the socket is gone. Exit the loop and release it.
                tracing::error!(error = %e, "multicast receive failed, listener exiting");
                return Err(e).context("multicast receive");
            }
        };

        if let Some(newcomer) = register_presence(&peers, &buf[..len]) {
            tracing::info!(peer = %newcomer, from = %from, count = peers.len(), "peer discovered");

            // Greet the newcomer so it learns about us right away.
            let endpoint = local_endpoint.clone();
            let config = config.clone();
            tokio::spawn(async move {
                if let Err(e) = announce::announce_once(&endpoint, &config).await {
                    tracing::warn!(error = %e, "greeting announce failed");
                }
            });
        }
    }
}

/// Decode one datagram and upsert the sender into the peer set.
///
/// Returns the endpoint only when it was not previously known — the signal
/// for the caller to send exactly one greeting announce. Foreign traffic,
/// malformed packets, our own announcements, and already-known peers all
/// return None.
pub fn register_presence(peers: &PeerSet, datagram: &[u8]) -> Option<String> {
    let text = wire::decode_presence(datagram)?;

    // Other users of the group/port (real mDNS among them) are not for us.
    if !text.contains(wire::SERVICE_TAG) {
        return None;
    }

    let mut tokens = text.split_whitespace();
    let _tag = tokens.next();
    let Some(endpoint) = tokens.next() else {
        tracing::warn!(text, "malformed presence packet, discarding");
        return None;
    };

    if peers.insert(endpoint.to_string()) {
        Some(endpoint.to_string())
    } else {
        None
    }
}

/// Create a UDP socket bound to the group port and joined to the group.
fn make_listener_socket(group: Ipv4Addr, port: u16) -> Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).context("socket()")?;

    socket.set_reuse_address(true).context("SO_REUSEADDR")?;
    socket.set_nonblocking(true).context("set_nonblocking")?;

    let bind_addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));
    socket.bind(&bind_addr.into()).context("bind()")?;

    socket
        .join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)
        .context("IP_ADD_MEMBERSHIP")?;

    Ok(socket.into())
}
