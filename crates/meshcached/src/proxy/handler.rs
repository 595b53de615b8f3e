//! Per-connection request handling and the resolution hierarchy.
//!
//! A handler reads request blocks in sequence off one connection,
//! classifies each as either an inter-cache `QUERY` or a browser GET, and
//! answers. Browser GETs run the hierarchy: local cache, then every known
//! peer, then the origin server. Whatever tier produced the body, the
//! result lands in the local store on the way out, so content spreads
//! across the cluster lazily.

use std::time::Instant;

use anyhow::{Context, Result};
use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;

use meshcache_core::wire;
use meshcache_services::peers;

use super::{origin, peer_client, ProxyState};

/// State that lives for one connection-handling session. The favicon
/// fallback resolves against the last URL this session saw — never against
/// another client's browsing.
#[derive(Debug, Default)]
pub(crate) struct Session {
    last_referrer: Option<String>,
    last_absolute: Option<String>,
}

/// Handles a single accepted connection.
pub struct ConnectionHandler {
    state: ProxyState,
    session: Session,
}

impl ConnectionHandler {
    pub fn new(state: ProxyState) -> Self {
        Self {
            state,
            session: Session::default(),
        }
    }

    /// Serve the connection: read request blocks in sequence, answer each.
    /// Closes on EOF, on a failed resolution, or when the client sends
    /// `Connection: close` — the session (and its favicon base) lives for
    /// as many requests as the client keeps the connection open.
    pub async fn run(mut self, stream: TcpStream) -> Result<()> {
        let client = stream.peer_addr().ok();
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        loop {
            let request = read_request_block(&mut reader).await?;
            if request.is_empty() {
                break;
            }

            // Inter-cache query: answer from the local index only, never
            // fetch. One exchange per connection.
            if let Some(rest) = request.strip_prefix("QUERY ") {
                let url = rest.split_whitespace().next().unwrap_or("");
                let reply = match self.state.store.lookup(url) {
                    Some(entry) => {
                        tracing::debug!(url, "peer query: hit");
                        format!("{}{}\r\n", wire::REPLY_HIT_PREFIX, entry.content_type)
                    }
                    None => {
                        tracing::debug!(url, "peer query: miss");
                        format!("{}\r\n", wire::REPLY_MISS)
                    }
                };
                write_half
                    .write_all(reply.as_bytes())
                    .await
                    .context("query reply write")?;
                break;
            }

            // Browser GET.
            let close_requested = wants_close(&request);
            let Some(url) =
                resolve_request_url(&mut self.session, &self.state.local_endpoint, &request)
            else {
                break;
            };
            tracing::debug!(client = ?client, url, "incoming GET");

            match self.resolve(&url).await {
                Some(response) => write_half
                    .write_all(&response)
                    .await
                    .context("response write")?,
                // No tier produced a body: the client gets EOF.
                None => break,
            }
            if close_requested {
                break;
            }
        }
        write_half.shutdown().await.ok();
        Ok(())
    }

    /// The resolution hierarchy: local → peer → origin.
    async fn resolve(&self, url: &str) -> Option<Bytes> {
        if let Some(entry) = self.state.store.lookup(url) {
            let started = Instant::now();
            match self.state.store.read_body(&entry) {
                Ok(body) => {
                    tracing::debug!(
                        url,
                        bytes = body.len(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "local cache hit"
                    );
                    return Some(body);
                }
                // Indexed but unreadable on disk: fall back to the miss path.
                Err(e) => tracing::warn!(url, error = %e, "cached body unreadable, re-resolving"),
            }
        }
        tracing::debug!(url, "local cache miss");
        self.resolve_miss(url).await
    }

    /// Ask every known peer; first hit wins and is cached locally. If no
    /// peer has it, go to the origin.
    async fn resolve_miss(&self, url: &str) -> Option<Bytes> {
        let net = &self.state.config.network;

        for peer in peers::snapshot(&self.state.peers) {
            if peer == self.state.local_endpoint {
                continue;
            }
            let Some(content_type) = peer_client::query(&peer, url, net).await else {
                continue;
            };
            tracing::debug!(%peer, url, %content_type, "peer cache hit");

            let started = Instant::now();
            match peer_client::fetch(&peer, url, net).await {
                Ok(body) => {
                    tracing::debug!(
                        %peer,
                        url,
                        bytes = body.len(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "peer pull complete"
                    );
                    if let Err(e) = self.state.store.insert(url, &content_type, &body) {
                        tracing::warn!(url, error = %e, "unable to cache peer pull");
                    }
                    return Some(body);
                }
                Err(e) => {
                    tracing::warn!(%peer, url, error = %e, "peer pull failed, trying next tier")
                }
            }
        }

        origin::fetch(&self.state.store, url, net).await
    }
}

/// Read one request block: header lines up to the first blank line. An
/// empty result means EOF or a blank stream.
async fn read_request_block(reader: &mut BufReader<OwnedReadHalf>) -> Result<String> {
    let mut request = String::new();
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await.context("request read")?;
        if n == 0 || line.trim().is_empty() {
            break;
        }
        request.push_str(line.trim_end());
        request.push_str("\r\n");
    }
    Ok(request.trim().to_string())
}

/// Did this request ask us to close the connection after the response?
fn wants_close(request: &str) -> bool {
    request
        .lines()
        .any(|line| line.trim().eq_ignore_ascii_case("connection: close"))
}

/// Turn the raw request block into the absolute URL to resolve.
///
/// A Referer header that routes back through this proxy makes the request
/// relative to the referring page: the referrer's path becomes the prefix.
/// A bare `favicon.ico` resolves against this session's last absolute URL,
/// then its last referrer; with neither, the fetch fails (logged, None).
pub(crate) fn resolve_request_url(
    session: &mut Session,
    local_endpoint: &str,
    request: &str,
) -> Option<String> {
    let mut target: Option<String> = None;
    let mut referrer: Option<String> = None;
    let self_prefix = format!("{local_endpoint}/");

    for line in request.lines() {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if let Some(rest) = line.strip_prefix("GET ") {
            let path = rest.split_whitespace().next()?;
            target = Some(path.trim_start_matches('/').to_string());
        } else if let Some(rest) = line.strip_prefix("Referer: ") {
            // Only a referrer pointing back at this proxy counts.
            if let Some((_, tail)) = rest.split_once(&self_prefix) {
                referrer = Some(tail.to_string());
            }
            break;
        }
    }

    let target = target?;

    if let Some(base) = referrer {
        let url = format!("{base}/{target}");
        session.last_referrer = Some(base);
        return Some(url);
    }

    if target == "favicon.ico" {
        let base = session
            .last_absolute
            .as_deref()
            .or(session.last_referrer.as_deref());
        return match base {
            Some(base) => Some(format!("{base}/{target}")),
            None => {
                tracing::warn!("favicon requested with nothing to resolve it against");
                None
            }
        };
    }

    session.last_absolute = Some(target.clone());
    Some(target)
}
