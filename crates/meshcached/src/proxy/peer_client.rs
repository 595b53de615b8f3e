//! Point-to-point client side of the inter-cache protocol.
//!
//! `query` asks one peer whether it has a URL; `fetch` pulls the body on a
//! fresh connection. Every interaction is its own connection, bounded by
//! the configured connect/read timeouts — an unreachable or hung peer is
//! an absent result, never a stalled worker.

use anyhow::{Context, Result};
use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

use meshcache_core::config::NetworkConfig;
use meshcache_core::wire;

/// Ask `peer` whether it has `url` cached. Some(content_type) on a hit;
/// None on a miss, timeout, or unreachable peer — all logged, none fatal.
pub async fn query(peer: &str, url: &str, net: &NetworkConfig) -> Option<String> {
    match try_query(peer, url, net).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!(peer, url, error = %e, "peer query failed");
            None
        }
    }
}

async fn try_query(peer: &str, url: &str, net: &NetworkConfig) -> Result<Option<String>> {
    let stream = timeout(net.connect_timeout(), TcpStream::connect(peer))
        .await
        .context("connect timed out")?
        .context("connect")?;
    let (read_half, mut write_half) = stream.into_split();

    write_half
        .write_all(wire::query_request(url).as_bytes())
        .await
        .context("query write")?;

    let mut reader = BufReader::new(read_half);
    let mut line = String::new();
    let n = timeout(net.read_timeout(), reader.read_line(&mut line))
        .await
        .context("reply timed out")?
        .context("reply read")?;

    if n == 0 {
        // Closed without answering — treat like a miss.
        tracing::debug!(peer, url, "peer closed without replying");
        return Ok(None);
    }

    match line.trim().strip_prefix(wire::REPLY_HIT_PREFIX) {
        Some(content_type) => Ok(Some(content_type.to_string())),
        None => Ok(None), // NO, or anything we don't recognize
    }
}

/// Pull the cached body for `url` from `peer`: an ordinary GET crafted
/// against the peer, read until the peer closes.
pub async fn fetch(peer: &str, url: &str, net: &NetworkConfig) -> Result<Bytes> {
    let stream = timeout(net.connect_timeout(), TcpStream::connect(peer))
        .await
        .context("connect timed out")?
        .context("connect")?;
    let (mut read_half, mut write_half) = stream.into_split();

    write_half
        .write_all(wire::craft_get(peer, url).as_bytes())
        .await
        .context("fetch write")?;

    let mut body = Vec::new();
    timeout(net.read_timeout(), read_half.read_to_end(&mut body))
        .await
        .context("body read timed out")?
        .context("body read")?;
    Ok(Bytes::from(body))
}
