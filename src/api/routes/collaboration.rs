//! WebSocket relay for real-time multi-user editing.
//!
//! Each connection is a peer on the document's hub channel. Messages are
//! re-stamped with the connection's id, so peers never see their own
//! traffic echoed back. Readers without write access receive mutations but
//! cannot send them.

use super::app_state::AppState;
use super::auth_context::MaybeAuth;
use super::error::ApiError;
use crate::services::collaboration::{
    CollaborationEvent, CollaborationMessage, CollaborationTransport,
};
use crate::storage::{Capability, DocumentStore, StorageError};
use axum::{
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// GET /flows/{id}/collaborate
pub async fn handle_websocket(
    Path(flow_id): Path<Uuid>,
    auth: MaybeAuth,
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    info!(
        "[Collaboration] WebSocket connection request for flow: {}",
        flow_id
    );

    let caller = auth.capability();
    // Unreadable flows are indistinguishable from missing ones.
    state.store.fetch(flow_id, &caller).await?;
    let can_write = can_write(state.store.as_ref(), flow_id, &caller).await?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, flow_id, can_write, state)))
}

async fn can_write(
    store: &dyn DocumentStore,
    flow_id: Uuid,
    caller: &Capability,
) -> Result<bool, StorageError> {
    if !caller.is_authenticated() {
        return Ok(false);
    }
    Ok(store
        .list(caller)
        .await?
        .iter()
        .any(|summary| summary.id == flow_id && summary.role.can_write()))
}

async fn handle_socket(socket: WebSocket, flow_id: Uuid, can_write: bool, state: AppState) {
    let peer_id = Uuid::new_v4();
    info!(
        "[Collaboration] Peer {} connected to flow {} (write: {})",
        peer_id, flow_id, can_write
    );

    let (mut sender, mut receiver) = socket.split();

    let tx = state.hub.channel(flow_id);
    let mut rx = tx.subscribe();
    let _ = tx.send(CollaborationMessage {
        sender: peer_id,
        event: CollaborationEvent::Joined,
    });

    let mut send_task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(message) if message.sender == peer_id => continue,
                Ok(message) => {
                    let Ok(json) = serde_json::to_string(&message) else {
                        continue;
                    };
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("[Collaboration] Peer {} missed {} messages", peer_id, missed);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let tx_for_recv = tx.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    if let Err(e) = relay_client_message(&text, peer_id, can_write, &tx_for_recv) {
                        warn!("[Collaboration] Error handling client message: {}", e);
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
        }
        _ = (&mut recv_task) => {
            send_task.abort();
        }
    }

    let _ = tx.send(CollaborationMessage {
        sender: peer_id,
        event: CollaborationEvent::Left,
    });
    drop(tx);
    state.hub.prune();
    info!(
        "[Collaboration] Peer {} disconnected from flow {}",
        peer_id, flow_id
    );
}

/// Parses one client frame and forwards it to the other peers.
fn relay_client_message(
    text: &str,
    peer_id: Uuid,
    can_write: bool,
    tx: &broadcast::Sender<CollaborationMessage>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let value: Value = serde_json::from_str(text)?;
    let event: CollaborationEvent = serde_json::from_value(value)?;

    match event {
        CollaborationEvent::Mutation { payload } => {
            if !can_write {
                debug!("[Collaboration] Dropping mutation from read-only peer {}", peer_id);
                return Ok(());
            }
            debug!("[Collaboration] Relaying {} from {}", payload.kind(), peer_id);
            // No other peers is not an error.
            let _ = tx.send(CollaborationMessage {
                sender: peer_id,
                event: CollaborationEvent::Mutation { payload },
            });
        }
        // Presence is announced by the relay itself.
        CollaborationEvent::Joined | CollaborationEvent::Left => {}
    }
    Ok(())
}
