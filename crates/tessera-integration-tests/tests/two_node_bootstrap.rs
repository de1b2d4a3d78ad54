//! Integration test: two-node bootstrap and put/get.
//!
//! Exercises the smallest possible overlay:
//! 1. Node B joins through node A.
//! 2. Both routing tables contain exactly the other node.
//! 3. A content item put by B lands on both nodes (total nodes <= K).
//! 4. A then serves the item from its local store.

use std::time::Duration;

use tessera_node::Node;
use tessera_types::{Content, GetParameter, Key};

fn key_with_last_byte(byte: u8) -> Key {
    let mut bytes = [0u8; 20];
    bytes[19] = byte;
    Key::from_bytes(bytes)
}

#[tokio::test(flavor = "multi_thread")]
async fn two_node_bootstrap() {
    let node_a = Node::bind("owner-a", key_with_last_byte(0x01), 0)
        .await
        .expect("bind A");
    let node_b = Node::bind("owner-b", key_with_last_byte(0x02), 0)
        .await
        .expect("bind B");

    node_b
        .connect(node_a.local().address())
        .await
        .expect("B joins through A");

    let a_contacts = node_a.contacts();
    assert_eq!(a_contacts.len(), 1, "A knows exactly one peer");
    assert_eq!(&a_contacts[0], node_b.local());

    let b_contacts = node_b.contacts();
    assert_eq!(b_contacts.len(), 1, "B knows exactly one peer");
    assert_eq!(&b_contacts[0], node_a.local());
}

#[tokio::test(flavor = "multi_thread")]
async fn put_get_on_bootstrapped_pair() {
    let node_a = Node::bind("owner-pa", key_with_last_byte(0x11), 0)
        .await
        .expect("bind A");
    let node_b = Node::bind("owner-pb", key_with_last_byte(0x12), 0)
        .await
        .expect("bind B");
    node_b
        .connect(node_a.local().address())
        .await
        .expect("B joins through A");

    // The key equals B's id, but with only two nodes both are among the
    // K closest anyway.
    let content = Content::new(node_b.local().id, b"x".to_vec());
    let placed = node_b.put(content.clone()).await.expect("put");
    assert_eq!(placed, 2, "stored at A and B");

    // StoreRequest is fire-and-forget; give A a moment to apply it.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let got = node_a
        .get(GetParameter::new(content.key), 1)
        .await
        .expect("get");
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].value, b"x".to_vec());
}
