//! meshcache wire formats — the multicast presence datagram and the
//! point-to-point cache protocol.
//!
//! The presence datagram borrows the shape of an mDNS question: a 12-byte
//! header with every field zero except QDCOUNT (= 1), a one-byte label
//! length, the UTF-8 text `"<service-tag> <ip>:<port>"`, a null name
//! terminator, and QTYPE A / QCLASS IN both set to 1. Every byte here IS
//! the protocol — a node on the group that does not recognize the service
//! tag must be able to ignore us, and vice versa.
//!
//! The cache protocol is plain CRLF text over TCP:
//!   request  `QUERY <url>`
//!   response `NO` | `YES <content-type>`
//! followed, on a hit, by an ordinary GET on a fresh connection.

/// Fixed string identifying this application's traffic on the shared
/// multicast group. Receivers drop datagrams without it.
pub const SERVICE_TAG: &str = "smm-cs621-cache";

/// Well-known multicast group for presence announcements.
pub const GROUP_ADDR: &str = "224.0.0.251";

/// Well-known multicast port for presence announcements.
pub const GROUP_PORT: u16 = 5353;

/// Reply line sent by a peer that does not have the queried URL.
pub const REPLY_MISS: &str = "NO";

/// Prefix of the reply line sent by a peer that has the queried URL.
/// The rest of the line is the content type.
pub const REPLY_HIT_PREFIX: &str = "YES ";

// 12-byte DNS-style header + 1 length byte.
const HEADER_LEN: usize = 13;
// Null name terminator + QTYPE + QCLASS.
const TRAILER_LEN: usize = 5;

/// The text payload a presence datagram carries for `endpoint`.
pub fn presence_text(endpoint: &str) -> String {
    format!("{SERVICE_TAG} {endpoint}")
}

/// Encode a presence datagram announcing `endpoint` (an `ip:port` string).
///
/// The label length is a single byte; None when the text would overflow
/// it. A service tag plus a real ip:port is always well under the limit.
pub fn encode_presence(endpoint: &str) -> Option<Vec<u8>> {
    let text = presence_text(endpoint);
    if text.len() > u8::MAX as usize {
        return None;
    }

    let mut packet = Vec::with_capacity(HEADER_LEN + text.len() + TRAILER_LEN);
    packet.resize(HEADER_LEN, 0);
    packet[5] = 1; // QDCOUNT = 1: one question follows
    packet[12] = text.len() as u8; // label length
    packet.extend_from_slice(text.as_bytes());
    packet.push(0); // name terminator
    packet.extend_from_slice(&1u16.to_be_bytes()); // QTYPE: A
    packet.extend_from_slice(&1u16.to_be_bytes()); // QCLASS: IN
    Some(packet)
}

/// Extract the text payload from a presence datagram.
///
/// Returns None for datagrams that do not carry our framing (too short,
/// QDCOUNT != 1, truncated label, non-UTF-8 text). Whether the text names
/// our service tag is the membership listener's decision, not ours.
pub fn decode_presence(datagram: &[u8]) -> Option<&str> {
    if datagram.len() < HEADER_LEN {
        return None;
    }
    if datagram[5] != 1 {
        return None;
    }
    let text_len = datagram[12] as usize;
    let text = datagram.get(HEADER_LEN..HEADER_LEN + text_len)?;
    std::str::from_utf8(text).ok()
}

/// The full request a peer-cache query sends: the query line plus the
/// blank line that terminates the request block.
pub fn query_request(url: &str) -> String {
    format!("QUERY {url}\r\n\r\n")
}

/// Craft the minimal GET used for both origin fetches and peer pulls.
/// `host` goes into the Host header verbatim (a domain or an `ip:port`).
pub fn craft_get(host: &str, resource: &str) -> String {
    let lead = if resource.starts_with('/') { "" } else { "/" };
    format!("GET {lead}{resource} HTTP/1.1\r\nHost: {host}\r\nConnection: close\r\n\r\n")
}
