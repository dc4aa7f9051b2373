//! Editor session: one open flowchart plus everything that keeps it saved,
//! identified and shared.
//!
//! Constructed once per session with its collaborators injected, torn down
//! with [`EditorSession::close`].

use super::autosave::{AutosaveScheduler, SaveNotice, SaveOutcome, SaveStatus};
use super::collaboration::{CollaborationChannel, CollaborationTransport};
use super::diagram_service::{ChangeListener, ChangeOrigin, DiagramChange, DiagramService};
use super::generation_service::{
    ConversationExchange, GenerationAdapter, GenerationClient, GenerationError,
};
use super::identity_resolver::{IdentityResolver, Resolution, ResolutionSource};
use super::session::AuthSession;
use crate::config::EditorConfig;
use crate::models::{ConnectGesture, Diagram, Edge, ModelError, Node, Position, Tool};
use crate::storage::local_cache::LocalCache;
use crate::storage::{DocumentStore, StorageError, UserSession};
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EditorError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("Failed to serialize diagram: {0}")]
    Export(String),
}

/// Keeps the local draft slot in step with every edit, so a reload recovers
/// unsaved work even before the debounce fires.
pub struct LocalDraftMirror {
    identity: Arc<IdentityResolver>,
}

impl LocalDraftMirror {
    pub fn new(identity: Arc<IdentityResolver>) -> Self {
        Self { identity }
    }
}

impl ChangeListener for LocalDraftMirror {
    fn on_change(&self, change: &DiagramChange, diagram: &Diagram) {
        // Loads are mirrored by the identity resolver.
        if change.origin == ChangeOrigin::Load {
            return;
        }
        let draft = self.identity.local_draft(diagram);
        if let Err(e) = self.identity.cache().store_draft(&draft) {
            warn!("[Editor] Failed to mirror draft: {}", e);
        }
    }
}

/// A prompt/reply log the generation panel keeps between requests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationConversation {
    pub id: Uuid,
    pub exchanges: Vec<ConversationExchange>,
}

impl GenerationConversation {
    fn prompts(&self) -> usize {
        self.exchanges
            .iter()
            .filter(|e| e.role == crate::models::enums::ExchangeRole::User)
            .count()
    }
}

#[derive(Default)]
struct Conversations {
    started: usize,
    active: Option<GenerationConversation>,
}

pub struct EditorSession {
    config: EditorConfig,
    auth: Arc<AuthSession>,
    diagram: Arc<DiagramService>,
    identity: Arc<IdentityResolver>,
    autosave: Arc<AutosaveScheduler>,
    collaboration: Arc<CollaborationChannel>,
    // Held so the weak subscription stays alive.
    _mirror: Arc<LocalDraftMirror>,
    generation: GenerationAdapter,
    conversations: Mutex<Conversations>,
}

impl EditorSession {
    pub fn new(
        config: EditorConfig,
        auth: Arc<AuthSession>,
        store: Arc<dyn DocumentStore>,
        cache: Arc<dyn LocalCache>,
        transport: Arc<dyn CollaborationTransport>,
        generation_client: Arc<dyn GenerationClient>,
    ) -> Self {
        let diagram = Arc::new(DiagramService::default());
        let identity = Arc::new(IdentityResolver::new(store, cache));
        let autosave = AutosaveScheduler::new(
            diagram.clone(),
            identity.clone(),
            auth.clone(),
            config.autosave_debounce,
        );
        let collaboration = Arc::new(CollaborationChannel::new(transport, diagram.clone()));
        let mirror = Arc::new(LocalDraftMirror::new(identity.clone()));

        diagram.subscribe(&mirror);
        diagram.subscribe(&autosave);
        diagram.subscribe(&collaboration);
        identity.subscribe(&collaboration);

        let generation = GenerationAdapter::with_limits(
            generation_client,
            config.context_window,
            config.exchange_char_limit,
        );

        Self {
            config,
            auth,
            diagram,
            identity,
            autosave,
            collaboration,
            _mirror: mirror,
            generation,
            conversations: Mutex::new(Conversations::default()),
        }
    }

    pub fn diagram(&self) -> &Arc<DiagramService> {
        &self.diagram
    }

    pub fn identity(&self) -> &Arc<IdentityResolver> {
        &self.identity
    }

    pub fn autosave(&self) -> &Arc<AutosaveScheduler> {
        &self.autosave
    }

    pub fn collaboration(&self) -> &Arc<CollaborationChannel> {
        &self.collaboration
    }

    pub fn auth(&self) -> &Arc<AuthSession> {
        &self.auth
    }

    pub fn snapshot(&self) -> Diagram {
        self.diagram.snapshot()
    }

    /// Opens `requested`, or the root entry point when `None`.
    pub async fn open(&self, requested: Option<Uuid>) -> Resolution {
        let resolution = self
            .identity
            .resolve(requested, &self.auth.capability())
            .await;
        // A newer open already replaced this one.
        let epoch = resolution.epoch;
        self.diagram
            .load_if(|| self.identity.epoch() == epoch, resolution.diagram.clone());
        if resolution.source == ResolutionSource::Reset {
            info!("[Editor] Requested diagram unavailable, starting blank");
        }
        resolution
    }

    /// Explicit "new diagram": local slots cleared, blank canvas.
    pub fn new_diagram(&self) {
        self.identity.reset();
        self.diagram.load(Diagram::blank());
        info!("[Editor] Started a new diagram");
    }

    /// Places a node from a toolbar tool with its default template.
    pub fn place_node(&self, tool: Tool, position: Position) -> Result<Node, EditorError> {
        let node = Node::from_tool(tool, position);
        self.diagram.add_node(node.clone())?;
        Ok(node)
    }

    pub fn connect(&self, gesture: ConnectGesture) -> Result<Edge, EditorError> {
        Ok(self.diagram.connect(gesture)?)
    }

    pub fn status(&self) -> SaveStatus {
        self.autosave.status()
    }

    pub fn watch_status(&self) -> watch::Receiver<SaveStatus> {
        self.autosave.watch_status()
    }

    pub fn notices(&self) -> broadcast::Receiver<SaveNotice> {
        self.autosave.notices()
    }

    /// Manual save, bypassing the debounce.
    pub async fn save_now(&self) -> Result<SaveOutcome, EditorError> {
        Ok(self.autosave.fire_now().await?)
    }

    pub fn sign_in(&self, session: UserSession) {
        self.auth.sign_in(session);
    }

    pub fn sign_out(&self) {
        self.auth.sign_out();
        self.collaboration.leave();
    }

    /// Begins a new generation conversation, subject to the session limit.
    pub fn start_generation_session(&self) -> Result<Uuid, EditorError> {
        let mut conversations = self.conversations.lock();
        if conversations.started >= self.config.max_generation_sessions {
            return Err(GenerationError::LimitReached(format!(
                "at most {} generation sessions",
                self.config.max_generation_sessions
            ))
            .into());
        }
        conversations.started += 1;
        let id = Uuid::new_v4();
        conversations.active = Some(GenerationConversation {
            id,
            exchanges: Vec::new(),
        });
        Ok(id)
    }

    pub fn generation_conversation(&self) -> Option<GenerationConversation> {
        self.conversations.lock().active.clone()
    }

    /// Generates a diagram from `prompt` and swaps it in atomically.
    ///
    /// The current conversation supplies the context; one is started if
    /// none is active. On any failure the diagram is left untouched.
    pub async fn generate(&self, prompt: &str) -> Result<(), EditorError> {
        if self.conversations.lock().active.is_none() {
            self.start_generation_session()?;
        }
        let context = {
            let conversations = self.conversations.lock();
            let Some(active) = conversations.active.as_ref() else {
                return Err(GenerationError::LimitReached("no active session".into()).into());
            };
            if active.prompts() >= self.config.max_messages_per_session {
                return Err(GenerationError::LimitReached(format!(
                    "at most {} messages per session",
                    self.config.max_messages_per_session
                ))
                .into());
            }
            active.exchanges.clone()
        };

        let content = self
            .generation
            .generate(prompt, &context, &self.auth.capability())
            .await?;
        let summary = format!(
            "Generated a flowchart with {} nodes and {} edges.",
            content.nodes.len(),
            content.edges.len()
        );
        self.diagram.replace_all(content)?;

        if let Some(active) = self.conversations.lock().active.as_mut() {
            active.exchanges.push(ConversationExchange::user(prompt));
            active.exchanges.push(ConversationExchange::assistant(summary));
        }
        Ok(())
    }

    /// Returns `(file name, JSON body)` for download.
    pub fn export_json(&self) -> Result<(String, String), EditorError> {
        let diagram = self.diagram.snapshot();
        let body = diagram
            .export_json()
            .map_err(|e| EditorError::Export(e.to_string()))?;
        Ok((diagram.export_file_name(Utc::now().timestamp_millis()), body))
    }

    /// Replaces the canvas with an exported `{nodes, edges}` document.
    pub fn import_json(&self, json: &str) -> Result<(), EditorError> {
        let mut content = Diagram::parse_export(json)?;
        content.fill_missing_ids();
        self.diagram.replace_all(content)?;
        Ok(())
    }

    /// Leaves the collaboration channel and drops any pending debounce.
    pub fn close(&self) {
        self.autosave.cancel();
        self.collaboration.leave();
    }
}
