//! The local → peer → origin resolution hierarchy, end to end.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::*;

#[tokio::test]
async fn local_hit_serves_the_stored_body_verbatim() {
    let node = start_node().await.unwrap();
    node.store
        .insert("example.com/index.html", "text/html", b"<html>hi</html>")
        .unwrap();

    let reply = exchange(&node.endpoint, "GET /example.com/index.html HTTP/1.1\r\n\r\n")
        .await
        .unwrap();
    assert_eq!(&reply[..], b"<html>hi</html>");
}

#[tokio::test]
async fn local_hit_wins_over_unreachable_peers() {
    let node = start_node().await.unwrap();
    // A dead peer in the set must not matter when the cache has the URL.
    node.peers.insert("127.0.0.1:1".to_string());
    node.store.insert("u/page", "text/plain", b"local").unwrap();

    let reply = exchange(&node.endpoint, "GET /u/page HTTP/1.1\r\n\r\n")
        .await
        .unwrap();
    assert_eq!(&reply[..], b"local");
}

#[tokio::test]
async fn peer_pull_serves_and_caches_locally() {
    let a = start_node().await.unwrap();
    let b = start_node().await.unwrap();
    a.peers.insert(b.endpoint.clone());

    // The URL's "origin" is unreachable (port 1), so only the peer path
    // can produce this body.
    let url = "127.0.0.1:1/shared/page.html";
    b.store.insert(url, "text/html", b"<p>from b</p>").unwrap();

    let reply = exchange(&a.endpoint, &format!("GET /{url} HTTP/1.1\r\n\r\n"))
        .await
        .unwrap();
    assert_eq!(&reply[..], b"<p>from b</p>");

    // The pull propagated the entry into A's own cache.
    let entry = a.store.lookup(url).expect("peer pull must cache locally");
    assert_eq!(entry.content_type, "text/html");
    assert_eq!(&a.store.read_body(&entry).unwrap()[..], b"<p>from b</p>");

    // A now answers QUERY for it itself.
    let reply = exchange(&a.endpoint, &format!("QUERY {url}\r\n\r\n"))
        .await
        .unwrap();
    assert_eq!(&reply[..], b"YES text/html\r\n");
}

#[tokio::test]
async fn origin_fetch_normalizes_and_caches() {
    let node = start_node().await.unwrap();
    let origin =
        scripted_origin(b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nServer: t\r\n\r\nhello")
            .await
            .unwrap();

    let url = format!("{origin}/greeting.txt");
    let reply = exchange(&node.endpoint, &format!("GET /{url} HTTP/1.1\r\n\r\n"))
        .await
        .unwrap();

    let text = std::str::from_utf8(&reply).unwrap();
    assert!(text.starts_with("HTTP/1.1 200 Document Follows\r\n"));
    assert!(text.contains("Content-Type: text/plain\r\n"));
    assert!(text.contains("Content-Length: 5\r\n"));
    assert!(text.ends_with("\r\n\r\nhello"));

    let entry = node.store.lookup(&url).expect("origin result must be cached");
    assert_eq!(entry.content_type, "text/plain");
    assert_eq!(&node.store.read_body(&entry).unwrap()[..], b"hello");

    // Second request: the scripted origin is gone, so only the local
    // cache can answer — and it serves the body alone.
    let reply = exchange(&node.endpoint, &format!("GET /{url} HTTP/1.1\r\n\r\n"))
        .await
        .unwrap();
    assert_eq!(&reply[..], b"hello");
}

#[tokio::test]
async fn non_success_origin_response_passes_through_uncached() {
    let node = start_node().await.unwrap();
    let raw: &[u8] = b"HTTP/1.1 404 Not Found\r\nContent-Type: text/html\r\n\r\ngone";
    let origin = scripted_origin(raw).await.unwrap();

    let url = format!("{origin}/missing.html");
    let reply = exchange(&node.endpoint, &format!("GET /{url} HTTP/1.1\r\n\r\n"))
        .await
        .unwrap();
    assert_eq!(&reply[..], raw);
    assert!(node.store.lookup(&url).is_none());
}

#[tokio::test]
async fn unreachable_origin_yields_no_response() {
    let node = start_node().await.unwrap();

    let reply = exchange(&node.endpoint, "GET /127.0.0.1:1/anything HTTP/1.1\r\n\r\n")
        .await
        .unwrap();
    assert!(reply.is_empty());
    assert!(node.store.is_empty());
}

#[tokio::test]
async fn favicon_without_a_base_yields_no_response() {
    let node = start_node().await.unwrap();

    // Fresh connection, no referrer, no prior absolute URL in this
    // session: the fetch fails and the connection closes empty.
    let reply = exchange(&node.endpoint, "GET /favicon.ico HTTP/1.1\r\n\r\n")
        .await
        .unwrap();
    assert!(reply.is_empty());
}

#[tokio::test]
async fn favicon_resolves_against_an_earlier_request_on_the_connection() {
    let node = start_node().await.unwrap();
    node.store.insert("example.com", "text/html", b"page").unwrap();
    node.store
        .insert("example.com/favicon.ico", "image/x-icon", b"icon")
        .unwrap();

    // One connection, two requests: the page first, then the bare
    // favicon, which must resolve against it.
    let mut stream = TcpStream::connect(&node.endpoint).await.unwrap();
    stream
        .write_all(b"GET /example.com HTTP/1.1\r\n\r\n")
        .await
        .unwrap();
    let mut page = [0u8; 4];
    stream.read_exact(&mut page).await.unwrap();
    assert_eq!(&page, b"page");

    stream
        .write_all(b"GET /favicon.ico HTTP/1.1\r\n\r\n")
        .await
        .unwrap();
    stream.shutdown().await.unwrap();
    let mut icon = Vec::new();
    stream.read_to_end(&mut icon).await.unwrap();
    assert_eq!(&icon[..], b"icon");
}

#[tokio::test]
async fn connection_close_ends_the_session_after_one_response() {
    let node = start_node().await.unwrap();
    node.store.insert("example.com", "text/html", b"page").unwrap();

    // No half-close from the client; the header alone must make the
    // server close after the response.
    let mut stream = TcpStream::connect(&node.endpoint).await.unwrap();
    stream
        .write_all(b"GET /example.com HTTP/1.1\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).await.unwrap();
    assert_eq!(&reply[..], b"page");
}

#[tokio::test]
async fn referer_resolves_relative_resources() {
    let node = start_node().await.unwrap();
    // The page the referrer names, with the embedded resource cached
    // under the referrer-joined URL.
    node.store
        .insert("site.example/page/style.css", "text/css", b"body{}")
        .unwrap();

    let request = format!(
        "GET /style.css HTTP/1.1\r\nReferer: http://{}/site.example/page\r\n\r\n",
        node.endpoint
    );
    let reply = exchange(&node.endpoint, &request).await.unwrap();
    assert_eq!(&reply[..], b"body{}");
}
