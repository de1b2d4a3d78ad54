//! Integration test: node state survives a snapshot round-trip.
//!
//! A node with three contacts and two content items is saved, torn down,
//! and reconstructed from its four snapshot files with an identical
//! routing table and content store.

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::time::Duration;

use tessera_node::{snapshot, Node};
use tessera_types::{Contact, Content, Key};

fn key_with_last_byte(byte: u8) -> Key {
    let mut bytes = [0u8; 20];
    bytes[19] = byte;
    Key::from_bytes(bytes)
}

fn sorted_contents(mut contents: Vec<Content>) -> Vec<Content> {
    contents.sort_by(|a, b| {
        (a.key, &a.owner, &a.kind)
            .cmp(&(b.key, &b.owner, &b.kind))
    });
    contents
}

#[tokio::test(flavor = "multi_thread")]
async fn snapshot_roundtrip() {
    let base = tempfile::tempdir().expect("tempdir");
    let node = Node::bind("dave", key_with_last_byte(0x41), 0)
        .await
        .expect("bind node");

    // Place content first: puts on an isolated node stay local.
    let item_a = Content {
        key: key_with_last_byte(0x51),
        owner: Some("dave".to_string()),
        kind: Some("text".to_string()),
        value: b"one".to_vec(),
    };
    let item_b = Content::new(key_with_last_byte(0x52), b"two".to_vec());
    assert_eq!(node.put(item_a.clone()).await.expect("put a"), 1);
    assert_eq!(node.put(item_b.clone()).await.expect("put b"), 1);

    for byte in 0x61..=0x63u8 {
        node.add_contact(Contact::new(
            key_with_last_byte(byte),
            Ipv4Addr::LOCALHOST,
            7600 + u16::from(byte),
        ));
    }

    snapshot::save_in(base.path(), &node).expect("save");
    assert!(snapshot::exists_in(base.path(), "dave"));

    let expected_local = node.local().clone();
    let expected_contacts: HashSet<Contact> = node.contacts().into_iter().collect();
    let expected_contents = sorted_contents(node.contents());

    // Release the port before the snapshot rebinds it.
    node.shutdown();
    drop(node);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let restored = snapshot::load_in(base.path(), "dave").await.expect("load");
    assert_eq!(restored.owner(), "dave");
    assert_eq!(restored.local(), &expected_local);

    let restored_contacts: HashSet<Contact> = restored.contacts().into_iter().collect();
    assert_eq!(restored_contacts, expected_contacts);
    assert_eq!(sorted_contents(restored.contents()), expected_contents);
}
