//! Application state management.
//!
//! Holds the document store, the collaboration hub backing the websocket
//! relay, token validation and the generation backend.

use crate::config::AppConfig;
use crate::middleware::rate_limit::{KeyedRateLimiter, create_rate_limiter_with_quota};
use crate::services::collaboration::CollaborationHub;
use crate::services::generation_service::LlmService;
use crate::services::jwt_service::{JwtService, SharedJwtService};
use crate::storage::{DocumentStore, InMemoryDocumentStore, PostgresDocumentStore, StorageError};
use axum::extract::FromRef;
use std::sync::Arc;
use tracing::info;

/// Application state shared across all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    /// Per-document broadcast channels for `/flows/{id}/collaborate`
    pub hub: Arc<CollaborationHub>,
    pub jwt: SharedJwtService,
    pub llm: Arc<LlmService>,
    /// Per-user quota on the generation endpoint
    pub generation_limiter: KeyedRateLimiter,
}

impl AppState {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        jwt: JwtService,
        llm: LlmService,
        generation_rate_per_minute: u32,
    ) -> Self {
        Self {
            store,
            hub: Arc::new(CollaborationHub::new()),
            jwt: Arc::new(jwt),
            llm: Arc::new(llm),
            generation_limiter: create_rate_limiter_with_quota(generation_rate_per_minute),
        }
    }

    /// In-memory store, no LLM key. Suitable for tests and local runs.
    pub fn in_memory(jwt_secret: &str) -> Self {
        Self::new(
            Arc::new(InMemoryDocumentStore::new()),
            JwtService::new(jwt_secret),
            LlmService::new(None, String::new(), String::new()),
            crate::config::DEFAULT_GENERATION_RATE_PER_MINUTE,
        )
    }

    /// Connects to PostgreSQL when `database_url` is set, otherwise keeps
    /// documents in memory.
    pub async fn from_config(config: &AppConfig) -> Result<Self, StorageError> {
        let store: Arc<dyn DocumentStore> = match &config.database_url {
            Some(database_url) => {
                let pool = sqlx::PgPool::connect(database_url).await.map_err(|e| {
                    StorageError::ConnectionError(format!("Failed to connect to database: {}", e))
                })?;
                let store = PostgresDocumentStore::new(pool);
                store.migrate().await?;
                info!("Using PostgreSQL document store");
                Arc::new(store)
            }
            None => {
                info!("DATABASE_URL not set, using in-memory document store");
                Arc::new(InMemoryDocumentStore::new())
            }
        };

        let llm = LlmService::new(
            config.ai_api_key.clone(),
            config.ai_model.clone(),
            config.ai_service_url.clone(),
        );

        Ok(Self::new(
            store,
            JwtService::new(&config.jwt_secret),
            llm,
            config.generation_rate_per_minute,
        ))
    }
}

impl FromRef<AppState> for Arc<dyn DocumentStore> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.store.clone()
    }
}

impl FromRef<AppState> for Arc<CollaborationHub> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.hub.clone()
    }
}
