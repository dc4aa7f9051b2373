//! Real-time fan-out of diagram mutations between sessions on one document.
//!
//! Best effort: no sequencing and no replay of missed history. A session
//! that drops off keeps editing locally and autosave carries on.

use super::diagram_service::{ChangeListener, ChangeOrigin, DiagramChange, DiagramService};
use super::identity_resolver::IdentityListener;
use crate::models::{Diagram, DiagramMutation};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 1000;

/// Events exchanged on a document channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CollaborationEvent {
    #[serde(rename = "MUTATION")]
    Mutation { payload: DiagramMutation },
    #[serde(rename = "USER_JOINED")]
    Joined,
    #[serde(rename = "USER_LEFT")]
    Left,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollaborationMessage {
    /// Session that produced the event.
    pub sender: Uuid,
    #[serde(flatten)]
    pub event: CollaborationEvent,
}

/// Source of per-document broadcast channels.
pub trait CollaborationTransport: Send + Sync {
    /// Returns the channel for `diagram_id`, creating it on first use.
    fn channel(&self, diagram_id: Uuid) -> broadcast::Sender<CollaborationMessage>;
}

/// In-process transport: one broadcast channel per document id.
/// Also backs the server's websocket relay.
#[derive(Default)]
pub struct CollaborationHub {
    channels: Mutex<HashMap<Uuid, broadcast::Sender<CollaborationMessage>>>,
}

impl CollaborationHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.lock().len()
    }

    /// Drops channels nobody listens to any more.
    pub fn prune(&self) {
        self.channels
            .lock()
            .retain(|_, tx| tx.receiver_count() > 0);
    }
}

impl CollaborationTransport for CollaborationHub {
    fn channel(&self, diagram_id: Uuid) -> broadcast::Sender<CollaborationMessage> {
        let mut channels = self.channels.lock();
        if let Some(tx) = channels.get(&diagram_id) {
            tx.clone()
        } else {
            let (tx, _rx) = broadcast::channel::<CollaborationMessage>(CHANNEL_CAPACITY);
            channels.insert(diagram_id, tx.clone());
            info!(
                "[Collaboration] Created broadcast channel for diagram: {}",
                diagram_id
            );
            tx
        }
    }
}

struct Membership {
    diagram_id: Uuid,
    tx: broadcast::Sender<CollaborationMessage>,
    receiver: JoinHandle<()>,
}

/// One session's subscription, tied to the currently active document id.
pub struct CollaborationChannel {
    session_id: Uuid,
    transport: Arc<dyn CollaborationTransport>,
    diagram: Arc<DiagramService>,
    membership: Mutex<Option<Membership>>,
}

impl CollaborationChannel {
    pub fn new(transport: Arc<dyn CollaborationTransport>, diagram: Arc<DiagramService>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            transport,
            diagram,
            membership: Mutex::new(None),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn joined_id(&self) -> Option<Uuid> {
        self.membership.lock().as_ref().map(|m| m.diagram_id)
    }

    /// Subscribes to `diagram_id`, leaving any previous document first.
    pub fn join(&self, diagram_id: Uuid) {
        let mut membership = self.membership.lock();
        if membership.as_ref().map(|m| m.diagram_id) == Some(diagram_id) {
            return;
        }
        if let Some(previous) = membership.take() {
            self.close(previous);
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("[Collaboration] No async runtime, cannot join {}", diagram_id);
            return;
        };

        let tx = self.transport.channel(diagram_id);
        let rx = tx.subscribe();
        let receiver = runtime.spawn(receive_loop(
            rx,
            self.session_id,
            diagram_id,
            self.diagram.clone(),
        ));
        let _ = tx.send(CollaborationMessage {
            sender: self.session_id,
            event: CollaborationEvent::Joined,
        });
        info!(
            "[Collaboration] Session {} joined diagram {}",
            self.session_id, diagram_id
        );
        *membership = Some(Membership {
            diagram_id,
            tx,
            receiver,
        });
    }

    pub fn leave(&self) {
        if let Some(previous) = self.membership.lock().take() {
            self.close(previous);
        }
    }

    fn close(&self, membership: Membership) {
        membership.receiver.abort();
        let _ = membership.tx.send(CollaborationMessage {
            sender: self.session_id,
            event: CollaborationEvent::Left,
        });
        info!(
            "[Collaboration] Session {} left diagram {}",
            self.session_id, membership.diagram_id
        );
    }

    /// Sends a locally applied mutation to peers. No-op when not joined.
    pub fn broadcast(&self, mutation: DiagramMutation) {
        let membership = self.membership.lock();
        let Some(membership) = membership.as_ref() else {
            return;
        };
        let message = CollaborationMessage {
            sender: self.session_id,
            event: CollaborationEvent::Mutation { payload: mutation },
        };
        if membership.tx.send(message).is_err() {
            debug!("[Collaboration] No peers on diagram {}", membership.diagram_id);
        }
    }
}

async fn receive_loop(
    mut rx: broadcast::Receiver<CollaborationMessage>,
    session_id: Uuid,
    diagram_id: Uuid,
    diagram: Arc<DiagramService>,
) {
    loop {
        match rx.recv().await {
            Ok(message) if message.sender == session_id => continue,
            Ok(message) => match message.event {
                CollaborationEvent::Mutation { payload } => {
                    let kind = payload.kind();
                    if let Err(e) = diagram.apply_remote(payload) {
                        warn!(
                            "[Collaboration] Rejected remote {} from {}: {}",
                            kind, message.sender, e
                        );
                    }
                }
                CollaborationEvent::Joined => {
                    info!("[Collaboration] Peer {} joined {}", message.sender, diagram_id);
                }
                CollaborationEvent::Left => {
                    info!("[Collaboration] Peer {} left {}", message.sender, diagram_id);
                }
            },
            Err(RecvError::Lagged(missed)) => {
                warn!(
                    "[Collaboration] Missed {} messages on diagram {}",
                    missed, diagram_id
                );
            }
            Err(RecvError::Closed) => {
                info!("[Collaboration] Channel closed for diagram {}", diagram_id);
                break;
            }
        }
    }
}

impl ChangeListener for CollaborationChannel {
    fn on_change(&self, change: &DiagramChange, _diagram: &Diagram) {
        if change.origin != ChangeOrigin::Local {
            return;
        }
        if let Some(mutation) = &change.mutation {
            self.broadcast(mutation.clone());
        }
    }
}

impl IdentityListener for CollaborationChannel {
    fn on_identity(&self, canonical_id: Option<Uuid>) {
        match canonical_id {
            Some(id) => self.join(id),
            None => self.leave(),
        }
    }
}

impl Drop for CollaborationChannel {
    fn drop(&mut self) {
        if let Some(membership) = self.membership.get_mut().take() {
            membership.receiver.abort();
        }
    }
}
