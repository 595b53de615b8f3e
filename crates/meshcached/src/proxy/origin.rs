//! Origin fetcher — the last resolution tier.
//!
//! Fetches a URL straight from the web server that hosts it, caches a
//! successful response, and re-frames it with a recomputed Content-Length
//! because some browsers reject what origin servers actually send. A
//! non-success response is passed through raw and never cached.

use std::time::Instant;

use anyhow::{Context, Result};
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use meshcache_core::config::NetworkConfig;
use meshcache_core::{url, wire};
use meshcache_services::CacheStore;

const DEFAULT_HTTP_PORT: u16 = 80;

/// Content type recorded when the origin didn't send one.
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Fetch `raw_url` from its origin server. None when the URL is invalid or
/// the origin is unreachable — the handler then has nothing to send.
pub async fn fetch(store: &CacheStore, raw_url: &str, net: &NetworkConfig) -> Option<Bytes> {
    // Browsers hand us scheme-less URLs; one retry with the prefix.
    let parsed = url::parse(raw_url).or_else(|| url::parse(&format!("http://{raw_url}")));
    let Some(parsed) = parsed else {
        tracing::warn!(url = raw_url, "invalid url, cannot fetch");
        return None;
    };

    let (host, port) = split_port(&parsed.domain);
    let request = wire::craft_get(&parsed.domain, &parsed.resource);

    let started = Instant::now();
    let raw = match exchange(host, port, &request, net).await {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(domain = %parsed.domain, error = %e, "origin fetch failed");
            return None;
        }
    };
    tracing::debug!(
        url = raw_url,
        bytes = raw.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "origin responded"
    );

    Some(normalize(store, raw_url, &raw))
}

/// Split an explicit `:port` suffix off the domain; default is port 80.
fn split_port(domain: &str) -> (&str, u16) {
    if let Some((host, port)) = domain.rsplit_once(':') {
        if let Ok(port) = port.parse() {
            return (host, port);
        }
    }
    (domain, DEFAULT_HTTP_PORT)
}

async fn exchange(host: &str, port: u16, request: &str, net: &NetworkConfig) -> Result<Vec<u8>> {
    let stream = timeout(net.connect_timeout(), TcpStream::connect((host, port)))
        .await
        .context("connect timed out")?
        .context("connect")?;
    let (mut read_half, mut write_half) = stream.into_split();

    write_half
        .write_all(request.as_bytes())
        .await
        .context("request write")?;

    let mut response = Vec::new();
    timeout(net.read_timeout(), read_half.read_to_end(&mut response))
        .await
        .context("response read timed out")?
        .context("response read")?;
    Ok(response)
}

/// Turn the raw origin response into what the client gets.
///
/// Success: cache the body and synthesize a normalized 200 envelope with
/// recomputed Content-Type and Content-Length. Anything else — bad status,
/// unparseable framing — passes through unmodified and uncached.
fn normalize(store: &CacheStore, url: &str, raw: &[u8]) -> Bytes {
    let Some(header_end) = find_header_end(raw) else {
        tracing::debug!(url, "origin response has no header terminator, passing through");
        return Bytes::copy_from_slice(raw);
    };
    let body = &raw[header_end + 4..];
    let head = String::from_utf8_lossy(&raw[..header_end]);

    let mut lines = head.lines();
    let status = lines.next().unwrap_or("");
    if !is_success(status) {
        tracing::debug!(url, status, "origin returned non-success, passing through");
        return Bytes::copy_from_slice(raw);
    }

    let mut content_type = FALLBACK_CONTENT_TYPE.to_string();
    for line in lines {
        if let Some(value) = line.strip_prefix("Content-Type:") {
            content_type = value.trim().to_string();
            break;
        }
    }

    if let Err(e) = store.insert(url, &content_type, body) {
        // Still serve the client; the entry just isn't cached.
        tracing::warn!(url, error = %e, "unable to cache origin response");
    }

    let envelope = format!(
        "HTTP/1.1 200 Document Follows\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\n\r\n",
        body.len()
    );
    let mut out = Vec::with_capacity(envelope.len() + body.len());
    out.extend_from_slice(envelope.as_bytes());
    out.extend_from_slice(body);
    Bytes::from(out)
}

/// Offset of the first `\r\n\r\n` in `raw`, if any.
fn find_header_end(raw: &[u8]) -> Option<usize> {
    raw.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Is the status line a 200-class success?
fn is_success(status_line: &str) -> bool {
    status_line
        .split_whitespace()
        .nth(1)
        .is_some_and(|code| code.starts_with('2'))
}
