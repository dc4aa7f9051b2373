//! Shared fixtures for the unit and integration test targets.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{Json, Router, routing::post};
use flowchart_api::config::EditorConfig;
use flowchart_api::models::Diagram;
use flowchart_api::models::enums::CollaboratorRole;
use flowchart_api::services::collaboration::CollaborationHub;
use flowchart_api::services::generation_service::{
    GenerationClient, GenerationError, GenerationRequest,
};
use flowchart_api::services::{AuthSession, EditorSession};
use flowchart_api::storage::error::CacheError;
use flowchart_api::storage::local_cache::{LocalCache, MemoryLocalCache};
use flowchart_api::storage::{
    Capability, Collaborator, CommitReceipt, DocumentStore, DocumentSummary,
    InMemoryDocumentStore, StorageError, UserContext, UserSession,
};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use uuid::Uuid;

pub fn user_session(email: &str) -> UserSession {
    UserSession {
        user: UserContext {
            user_id: Uuid::new_v4(),
            email: email.to_string(),
        },
        access_token: format!("token-{}", Uuid::new_v4()),
    }
}

pub fn authenticated(email: &str) -> Capability {
    Capability::Authenticated(user_session(email))
}

/// In-memory store that counts commits and can be slowed down or made to fail.
#[derive(Default)]
pub struct InstrumentedStore {
    inner: InMemoryDocumentStore,
    creates: AtomicUsize,
    updates: AtomicUsize,
    fetches: AtomicUsize,
    commit_delay: Mutex<Duration>,
    commit_failures: Mutex<VecDeque<StorageError>>,
    lost_responses: AtomicUsize,
    fetch_failure: Mutex<Option<StorageError>>,
    committed: Mutex<Vec<(Option<Uuid>, Diagram)>>,
}

impl InstrumentedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_commit_delay(delay: Duration) -> Self {
        let store = Self::default();
        *store.commit_delay.lock() = delay;
        store
    }

    pub fn fail_next_commit(&self, error: StorageError) {
        self.commit_failures.lock().push_back(error);
    }

    /// The next write lands in the store but the caller sees a failure.
    pub fn lose_next_response(&self) {
        self.lost_responses.fetch_add(1, Ordering::SeqCst);
    }

    pub fn fail_fetches(&self, error: StorageError) {
        *self.fetch_failure.lock() = Some(error);
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.creates() + self.updates()
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Every commit request in arrival order, with the target id.
    pub fn committed(&self) -> Vec<(Option<Uuid>, Diagram)> {
        self.committed.lock().clone()
    }

    pub async fn document_count(&self) -> usize {
        self.inner.document_count().await
    }

    async fn before_write(&self, id: Option<Uuid>, diagram: &Diagram) -> Result<(), StorageError> {
        match id {
            Some(_) => self.updates.fetch_add(1, Ordering::SeqCst),
            None => self.creates.fetch_add(1, Ordering::SeqCst),
        };
        self.committed.lock().push((id, diagram.clone()));

        let delay = *self.commit_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let failure = self.commit_failures.lock().pop_front();
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn after_write(&self, receipt: CommitReceipt) -> Result<CommitReceipt, StorageError> {
        let lost = self
            .lost_responses
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if lost {
            return Err(StorageError::CommitFailure("response lost".to_string()));
        }
        Ok(receipt)
    }
}

/// Memory cache whose writes can be switched to fail like a full disk.
#[derive(Default)]
pub struct InstrumentedCache {
    inner: MemoryLocalCache,
    failing_writes: AtomicBool,
}

impl InstrumentedCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, failing: bool) {
        self.failing_writes.store(failing, Ordering::SeqCst);
    }
}

impl LocalCache for InstrumentedCache {
    fn read_slot(&self, slot: &str) -> Result<Option<String>, CacheError> {
        self.inner.read_slot(slot)
    }

    fn write_slot(&self, slot: &str, value: &str) -> Result<(), CacheError> {
        if self.failing_writes.load(Ordering::SeqCst) {
            return Err(CacheError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_FULL),
                Some("database or disk is full".to_string()),
            )));
        }
        self.inner.write_slot(slot, value)
    }

    fn remove_slot(&self, slot: &str) -> Result<(), CacheError> {
        self.inner.remove_slot(slot)
    }
}

#[async_trait]
impl DocumentStore for InstrumentedStore {
    async fn commit(
        &self,
        id: Option<Uuid>,
        diagram: &Diagram,
        caller: &Capability,
    ) -> Result<CommitReceipt, StorageError> {
        self.before_write(id, diagram).await?;
        let receipt = self.inner.commit(id, diagram, caller).await?;
        self.after_write(receipt)
    }

    async fn create_once(
        &self,
        create_key: Uuid,
        diagram: &Diagram,
        caller: &Capability,
    ) -> Result<CommitReceipt, StorageError> {
        self.before_write(None, diagram).await?;
        let receipt = self.inner.create_once(create_key, diagram, caller).await?;
        self.after_write(receipt)
    }

    async fn fetch(&self, id: Uuid, caller: &Capability) -> Result<Diagram, StorageError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let failure = self.fetch_failure.lock().clone();
        if let Some(error) = failure {
            return Err(error);
        }
        self.inner.fetch(id, caller).await
    }

    async fn list(&self, caller: &Capability) -> Result<Vec<DocumentSummary>, StorageError> {
        self.inner.list(caller).await
    }

    async fn remove(&self, id: Uuid, caller: &Capability) -> Result<(), StorageError> {
        self.inner.remove(id, caller).await
    }

    async fn is_public(&self, id: Uuid) -> Result<bool, StorageError> {
        self.inner.is_public(id).await
    }

    async fn set_public(
        &self,
        id: Uuid,
        is_public: bool,
        caller: &Capability,
    ) -> Result<(), StorageError> {
        self.inner.set_public(id, is_public, caller).await
    }

    async fn collaborators(
        &self,
        id: Uuid,
        caller: &Capability,
    ) -> Result<Vec<Collaborator>, StorageError> {
        self.inner.collaborators(id, caller).await
    }

    async fn add_collaborator(
        &self,
        id: Uuid,
        user_id: Uuid,
        role: CollaboratorRole,
        caller: &Capability,
    ) -> Result<(), StorageError> {
        self.inner.add_collaborator(id, user_id, role, caller).await
    }

    async fn update_collaborator_role(
        &self,
        id: Uuid,
        user_id: Uuid,
        role: CollaboratorRole,
        caller: &Capability,
    ) -> Result<(), StorageError> {
        self.inner
            .update_collaborator_role(id, user_id, role, caller)
            .await
    }

    async fn remove_collaborator(
        &self,
        id: Uuid,
        user_id: Uuid,
        caller: &Capability,
    ) -> Result<(), StorageError> {
        self.inner.remove_collaborator(id, user_id, caller).await
    }
}

/// Generation client returning queued replies and recording requests.
#[derive(Default)]
pub struct StubGenerationClient {
    replies: Mutex<VecDeque<Result<Value, GenerationError>>>,
    requests: Mutex<Vec<(GenerationRequest, String)>>,
}

impl StubGenerationClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&self, reply: Result<Value, GenerationError>) {
        self.replies.lock().push_back(reply);
    }

    pub fn requests(&self) -> Vec<(GenerationRequest, String)> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl GenerationClient for StubGenerationClient {
    async fn request(
        &self,
        request: &GenerationRequest,
        access_token: &str,
    ) -> Result<Value, GenerationError> {
        self.requests
            .lock()
            .push((request.clone(), access_token.to_string()));
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(json!({"nodes": [], "edges": []})))
    }
}

/// An editor session with its collaborators exposed for assertions.
pub struct Harness {
    pub editor: EditorSession,
    pub store: Arc<InstrumentedStore>,
    pub cache: Arc<InstrumentedCache>,
    pub hub: Arc<CollaborationHub>,
    pub generation: Arc<StubGenerationClient>,
}

impl Harness {
    pub fn anonymous() -> Self {
        Self::build(
            AuthSession::anonymous(),
            Arc::new(InstrumentedStore::new()),
            Arc::new(CollaborationHub::new()),
        )
    }

    pub fn signed_in(email: &str) -> Self {
        Self::with_store(email, Arc::new(InstrumentedStore::new()))
    }

    pub fn with_store(email: &str, store: Arc<InstrumentedStore>) -> Self {
        Self::build(
            AuthSession::signed_in(user_session(email)),
            store,
            Arc::new(CollaborationHub::new()),
        )
    }

    /// A second participant sharing `self`'s store and hub.
    pub fn peer(&self, session: UserSession) -> Self {
        Self::build(
            AuthSession::signed_in(session),
            self.store.clone(),
            self.hub.clone(),
        )
    }

    pub fn build(auth: AuthSession, store: Arc<InstrumentedStore>, hub: Arc<CollaborationHub>) -> Self {
        Self::build_with(EditorConfig::default(), auth, store, hub)
    }

    pub fn build_with(
        config: EditorConfig,
        auth: AuthSession,
        store: Arc<InstrumentedStore>,
        hub: Arc<CollaborationHub>,
    ) -> Self {
        let cache = Arc::new(InstrumentedCache::new());
        let generation = Arc::new(StubGenerationClient::new());
        let editor = EditorSession::new(
            config,
            Arc::new(auth),
            store.clone(),
            cache.clone() as Arc<dyn LocalCache>,
            hub.clone(),
            generation.clone(),
        );
        Self {
            editor,
            store,
            cache,
            hub,
            generation,
        }
    }

    pub fn capability(&self) -> Capability {
        self.editor.auth().capability()
    }
}

/// Polls `condition` for up to one second.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Lets timers up to `ms` from now fire (paused clock auto-advances).
pub async fn settle(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

/// Serves `app` on an ephemeral local port and returns its base URL.
pub async fn spawn_server(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{}", addr)
}

/// OpenAI-compatible chat completions endpoint that always answers `reply`.
pub async fn spawn_fake_llm(reply: &str) -> String {
    let reply = reply.to_string();
    let app = Router::new().route(
        "/v1/chat/completions",
        post(move || {
            let reply = reply.clone();
            async move {
                Json(json!({
                    "choices": [{"message": {"role": "assistant", "content": reply}}]
                }))
            }
        }),
    );
    format!("{}/v1/chat/completions", spawn_server(app).await)
}
