//! Managed diagram state with a single change-notification path.
//!
//! Every applied mutation bumps the revision and is delivered once to each
//! subscribed [`ChangeListener`]. Autosave, collaboration and the local draft
//! mirror all subscribe here.

use crate::models::{
    ConnectGesture, Diagram, DiagramContent, DiagramMutation, Edge, ModelError, Node, Position,
    Size,
};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use std::sync::{Arc, Weak};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// Edit made in this session
    Local,
    /// Edit received from a collaborator
    Remote,
    /// Whole diagram swapped in by open/new
    Load,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiagramChange {
    pub revision: u64,
    pub origin: ChangeOrigin,
    /// `None` for loads.
    pub mutation: Option<DiagramMutation>,
}

/// Receives diagram changes after they are applied.
///
/// Called with the diagram lock held: implementations must not call back
/// into the [`DiagramService`].
pub trait ChangeListener: Send + Sync {
    fn on_change(&self, change: &DiagramChange, diagram: &Diagram);
}

struct State {
    diagram: Diagram,
    revision: u64,
}

pub struct DiagramService {
    state: Mutex<State>,
    listeners: RwLock<Vec<Weak<dyn ChangeListener>>>,
}

impl Default for DiagramService {
    fn default() -> Self {
        Self::new(Diagram::blank())
    }
}

impl DiagramService {
    pub fn new(diagram: Diagram) -> Self {
        Self {
            state: Mutex::new(State {
                diagram,
                revision: 0,
            }),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Listeners are held weakly; dropping the last `Arc` unsubscribes.
    pub fn subscribe<L: ChangeListener + 'static>(&self, listener: &Arc<L>) {
        let weak: Weak<dyn ChangeListener> = Arc::downgrade(listener) as Weak<dyn ChangeListener>;
        self.listeners.write().push(weak);
    }

    pub fn snapshot(&self) -> Diagram {
        self.state.lock().diagram.clone()
    }

    pub fn read<R>(&self, f: impl FnOnce(&Diagram) -> R) -> R {
        f(&self.state.lock().diagram)
    }

    pub fn revision(&self) -> u64 {
        self.state.lock().revision
    }

    pub fn current_id(&self) -> Option<Uuid> {
        self.state.lock().diagram.id
    }

    /// Applies a local edit. Stale references resolve to `Ok(None)`.
    pub fn apply(&self, mutation: DiagramMutation) -> Result<Option<u64>, ModelError> {
        self.apply_with_origin(mutation, ChangeOrigin::Local)
    }

    /// Applies a collaborator's edit through the same primitives as local ones.
    pub fn apply_remote(&self, mutation: DiagramMutation) -> Result<Option<u64>, ModelError> {
        self.apply_with_origin(mutation, ChangeOrigin::Remote)
    }

    fn apply_with_origin(
        &self,
        mutation: DiagramMutation,
        origin: ChangeOrigin,
    ) -> Result<Option<u64>, ModelError> {
        let mut state = self.state.lock();
        match state.diagram.apply(&mutation) {
            Ok(()) => {}
            Err(e) if e.is_stale_reference() => {
                debug!("[Diagram] Ignoring {} on missing element: {}", mutation.kind(), e);
                return Ok(None);
            }
            Err(e) => return Err(e),
        }
        state.revision += 1;
        let change = DiagramChange {
            revision: state.revision,
            origin,
            mutation: Some(mutation),
        };
        self.notify(&change, &state.diagram);
        Ok(Some(change.revision))
    }

    /// Replaces the whole diagram, identity included.
    pub fn load(&self, diagram: Diagram) -> u64 {
        self.load_if(|| true, diagram).unwrap_or_default()
    }

    /// Loads `diagram` only if `still_current` holds under the diagram lock.
    pub fn load_if(&self, still_current: impl FnOnce() -> bool, diagram: Diagram) -> Option<u64> {
        let mut state = self.state.lock();
        if !still_current() {
            return None;
        }
        state.diagram = diagram;
        state.revision += 1;
        let change = DiagramChange {
            revision: state.revision,
            origin: ChangeOrigin::Load,
            mutation: None,
        };
        self.notify(&change, &state.diagram);
        Some(change.revision)
    }

    /// Records persistence metadata. Not a content change, so no event.
    ///
    /// `still_current` is checked under the diagram lock: a load racing with
    /// a late commit either lands first and is skipped, or lands after and
    /// overwrites the stamp.
    pub fn set_identity_if(
        &self,
        still_current: impl FnOnce() -> bool,
        id: Option<Uuid>,
        updated_at: Option<DateTime<Utc>>,
    ) -> bool {
        let mut state = self.state.lock();
        if !still_current() {
            return false;
        }
        state.diagram.id = id;
        if updated_at.is_some() {
            state.diagram.updated_at = updated_at;
        }
        true
    }

    fn notify(&self, change: &DiagramChange, diagram: &Diagram) {
        let listeners: Vec<Arc<dyn ChangeListener>> = {
            let mut guard = self.listeners.write();
            guard.retain(|w| w.strong_count() > 0);
            guard.iter().filter_map(Weak::upgrade).collect()
        };
        for listener in listeners {
            listener.on_change(change, diagram);
        }
    }

    pub fn add_node(&self, node: Node) -> Result<Option<u64>, ModelError> {
        self.apply(DiagramMutation::AddNode { node })
    }

    pub fn update_node_data(
        &self,
        id: &str,
        patch: Map<String, Value>,
    ) -> Result<Option<u64>, ModelError> {
        self.apply(DiagramMutation::UpdateNodeData {
            id: id.to_string(),
            patch,
        })
    }

    pub fn move_node(&self, id: &str, position: Position) -> Result<Option<u64>, ModelError> {
        self.apply(DiagramMutation::MoveNode {
            id: id.to_string(),
            position,
        })
    }

    pub fn resize_node(&self, id: &str, size: Option<Size>) -> Result<Option<u64>, ModelError> {
        self.apply(DiagramMutation::ResizeNode {
            id: id.to_string(),
            size,
        })
    }

    pub fn delete_node(&self, id: &str) -> Result<Option<u64>, ModelError> {
        self.apply(DiagramMutation::DeleteNode { id: id.to_string() })
    }

    pub fn add_edge(&self, edge: Edge) -> Result<Option<u64>, ModelError> {
        self.apply(DiagramMutation::AddEdge { edge })
    }

    /// Creates an edge from a canvas gesture; ambiguous gestures are refused.
    pub fn connect(&self, gesture: ConnectGesture) -> Result<Edge, ModelError> {
        let edge = gesture.into_edge()?;
        self.add_edge(edge.clone())?;
        Ok(edge)
    }

    pub fn relabel_edge(&self, id: &str, label: Option<String>) -> Result<Option<u64>, ModelError> {
        self.apply(DiagramMutation::RelabelEdge {
            id: id.to_string(),
            label,
        })
    }

    pub fn delete_edge(&self, id: &str) -> Result<Option<u64>, ModelError> {
        self.apply(DiagramMutation::DeleteEdge { id: id.to_string() })
    }

    pub fn rename(&self, name: impl Into<String>) -> Result<Option<u64>, ModelError> {
        self.apply(DiagramMutation::Rename { name: name.into() })
    }

    /// Swaps nodes and edges in one atomic step.
    pub fn replace_all(&self, content: DiagramContent) -> Result<Option<u64>, ModelError> {
        self.apply(DiagramMutation::ReplaceAll { content })
    }
}
