//! Iterative lookup driver.
//!
//! Wires the distance/status bookkeeping of
//! [`LookupState`](tessera_dht::kademlia::LookupState) to the transport:
//! keeps up to alpha requests in flight, suspends on one channel for
//! replies and timeouts, and applies the Kademlia convergence rules until
//! the closest-K set is stable. Node lookups and content lookups share the
//! same loop; they differ only in the outgoing verb and in whether a
//! ContentReply terminates the run.

use tokio::sync::mpsc;
use tracing::{debug, warn};

use tessera_dht::kademlia::LookupState;
use tessera_dht::K;
use tessera_transport::messages::Message;
use tessera_transport::udp::ReplyEvent;
use tessera_types::{Contact, Content, GetParameter, Key};

use crate::node::NodeShared;
use crate::{NodeError, Result};

enum RequestKind {
    Node,
    Content { params: GetParameter, wanted: usize },
}

/// Look up the K closest contacts to `target`.
pub(crate) async fn node_lookup(shared: &NodeShared, target: Key) -> Result<Vec<Contact>> {
    let (closest, _) = iterate(shared, target, RequestKind::Node).await?;
    Ok(closest)
}

/// Look up content matching `params`, collecting up to `wanted` distinct
/// replies.
pub(crate) async fn content_lookup(
    shared: &NodeShared,
    params: GetParameter,
    wanted: usize,
) -> Result<Vec<Content>> {
    let target = params.key;
    let (_, found) = iterate(shared, target, RequestKind::Content { params, wanted }).await?;
    if found.is_empty() {
        return Err(NodeError::ContentNotFound);
    }
    Ok(found)
}

async fn iterate(
    shared: &NodeShared,
    target: Key,
    kind: RequestKind,
) -> Result<(Vec<Contact>, Vec<Content>)> {
    let seeds = shared.table_guard().all_nodes();
    let mut state = LookupState::new(target, shared.local().clone(), seeds);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut found: Vec<Content> = Vec::new();

    loop {
        // Fill the in-flight window. A failed send marks the peer failed,
        // so the next round picks a replacement candidate.
        loop {
            let batch = state.next_batch();
            if batch.is_empty() {
                break;
            }
            for peer in batch {
                let message = match &kind {
                    RequestKind::Node => Message::NodeLookupRequest {
                        origin: shared.local().clone(),
                        target,
                    },
                    RequestKind::Content { params, .. } => Message::ContentLookupRequest {
                        origin: shared.local().clone(),
                        params: params.clone(),
                    },
                };
                match shared
                    .transport()
                    .request(peer.address(), message, tx.clone())
                    .await
                {
                    Ok(correlation) => state.sent(correlation, peer.id),
                    Err(error) => {
                        warn!(peer = %peer, error = %error, "lookup send failed");
                        state.mark_failed(&peer.id);
                        let _ = shared.table_guard().remove(&peer.id);
                    }
                }
            }
        }

        if state.is_finished() {
            break;
        }

        // The single suspension point: the next reply or timeout, bounded
        // by the lookup-wide inactivity budget.
        let event = tokio::time::timeout(shared.operation_timeout(), rx.recv())
            .await
            .map_err(|_| NodeError::RoutingTimeout)?;
        let Some(event) = event else {
            return Err(NodeError::RoutingTimeout);
        };

        match event {
            ReplyEvent::Reply {
                correlation,
                message,
            } => {
                let Some(source_id) = state.take_in_flight(correlation) else {
                    debug!(correlation, "reply for a request this lookup never sent");
                    continue;
                };
                state.mark_asked(&source_id);
                match message {
                    Message::NodeReply { origin, contacts } => {
                        shared.table_guard().insert(origin);
                        state.add_candidates(&contacts);
                    }
                    Message::ContentReply { origin, content } => {
                        shared.table_guard().insert(origin);
                        if let RequestKind::Content { params, wanted } = &kind {
                            if params.matches(&content) && !found.contains(&content) {
                                found.push(content);
                                if found.len() >= *wanted {
                                    return Ok((state.closest_asked(K), found));
                                }
                            }
                        }
                    }
                    other => {
                        debug!(code = other.code(), "unexpected reply kind during lookup");
                    }
                }
            }
            ReplyEvent::Timeout { correlation } => {
                if let Some(id) = state.take_in_flight(correlation) {
                    debug!(peer = %id, "lookup peer timed out");
                    state.mark_failed(&id);
                    let _ = shared.table_guard().remove(&id);
                }
            }
        }
    }

    Ok((state.closest_asked(K), found))
}
