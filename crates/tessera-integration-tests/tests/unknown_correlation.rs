//! Integration test: replies with unissued correlation ids are dropped.
//!
//! A NodeReply injected with a correlation id the node never allocated
//! must not change any observable state.

use std::net::Ipv4Addr;
use std::time::Duration;

use tokio::net::UdpSocket;

use tessera_node::Node;
use tessera_transport::messages::Message;
use tessera_transport::wire;
use tessera_types::{Contact, Key};

fn key_with_last_byte(byte: u8) -> Key {
    let mut bytes = [0u8; 20];
    bytes[19] = byte;
    Key::from_bytes(bytes)
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_correlation_reply_is_ignored() {
    let node = Node::bind("owner-u", key_with_last_byte(0x71), 0)
        .await
        .expect("bind node");
    let known = Contact::new(key_with_last_byte(0x72), Ipv4Addr::LOCALHOST, 7777);
    node.add_contact(known.clone());

    let intruder = Contact::new(key_with_last_byte(0x7E), Ipv4Addr::LOCALHOST, 7778);
    let bogus = wire::encode(
        &Message::NodeReply {
            origin: intruder.clone(),
            contacts: vec![intruder],
        },
        0xDEAD_0000,
    )
    .expect("encode");

    let socket = UdpSocket::bind(("127.0.0.1", 0)).await.expect("bind socket");
    socket
        .send_to(&bogus, node.local().address())
        .await
        .expect("inject");

    tokio::time::sleep(Duration::from_millis(200)).await;

    // No state change: the intruder was not learned and nothing was stored.
    assert_eq!(node.contacts(), vec![known]);
    assert!(node.contents().is_empty());
}
