//! Membership behavior at the packet-handling seam.

use meshcache_core::wire;
use meshcache_services::new_peer_set;
use meshcached::discovery::listener::register_presence;

/// A fresh node hears a presence packet from 10.0.0.5:9001: the peer set
/// becomes {self, newcomer} and exactly one greeting announce is owed.
#[test]
fn first_contact_grows_peer_set_once() {
    let peers = new_peer_set("10.0.0.1:9000");
    let packet = wire::encode_presence("10.0.0.5:9001").unwrap();

    assert_eq!(
        register_presence(&peers, &packet).as_deref(),
        Some("10.0.0.5:9001")
    );
    assert_eq!(peers.len(), 2);
    assert!(peers.contains("10.0.0.1:9000"));
    assert!(peers.contains("10.0.0.5:9001"));

    // Replays of the same announcement never grow the set or trigger
    // another greeting.
    for _ in 0..3 {
        assert!(register_presence(&peers, &packet).is_none());
    }
    assert_eq!(peers.len(), 2);
}

#[test]
fn each_distinct_peer_grows_the_set_by_one() {
    let peers = new_peer_set("10.0.0.1:9000");

    for port in 9001..9005 {
        let endpoint = format!("10.0.0.5:{port}");
        let packet = wire::encode_presence(&endpoint).unwrap();
        assert_eq!(register_presence(&peers, &packet).as_deref(), Some(endpoint.as_str()));
    }
    assert_eq!(peers.len(), 5);
}

#[test]
fn mdns_lookalike_traffic_is_ignored() {
    let peers = new_peer_set("10.0.0.1:9000");

    // Same framing, a different service's name.
    let mut packet = vec![0u8; 13];
    let text = b"_ipp._tcp.local whatever";
    packet[5] = 1;
    packet[12] = text.len() as u8;
    packet.extend_from_slice(text);
    packet.extend_from_slice(&[0, 0, 1, 0, 1]);

    assert!(register_presence(&peers, &packet).is_none());
    assert_eq!(peers.len(), 1);
}
