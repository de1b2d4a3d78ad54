//! Integration test: lookup convergence across a 10-node overlay.
//!
//! Ten nodes pairwise bootstrapped through node 0. A lookup from node 0
//! for node 9's id terminates and returns the K closest responders, with
//! node 9 itself first.

use tessera_dht::K;
use tessera_node::Node;
use tessera_types::Key;

fn key_with_last_byte(byte: u8) -> Key {
    let mut bytes = [0u8; 20];
    bytes[19] = byte;
    Key::from_bytes(bytes)
}

#[tokio::test(flavor = "multi_thread")]
async fn ten_node_lookup_converges() {
    let mut nodes = Vec::with_capacity(10);
    for i in 0..10u8 {
        let node = Node::bind(format!("ring-{i}"), key_with_last_byte(i + 1), 0)
            .await
            .expect("bind node");
        nodes.push(node);
    }

    let bootstrap = nodes[0].local().address();
    for node in &nodes[1..] {
        node.connect(bootstrap).await.expect("join overlay");
    }
    assert_eq!(
        nodes[0].contacts().len(),
        9,
        "node 0 met every joiner during bootstrap"
    );

    let target = nodes[9].local().id;
    let found = nodes[0].lookup(target).await.expect("lookup");

    assert_eq!(found.len(), K, "lookup returns the K closest responders");
    assert_eq!(
        found[0].id, target,
        "the target id itself is the closest responder"
    );
    for pair in found.windows(2) {
        assert!(
            pair[0].id.xor(&target) <= pair[1].id.xor(&target),
            "results sorted by distance to the target"
        );
    }
}
