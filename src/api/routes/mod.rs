//! API routes module - organizes all route handlers.
//!
//! Everything is mounted under `/api/v1`:
//! - `/flows` document CRUD, sharing and the collaboration websocket
//! - `/generate-flowchart` natural-language generation

pub mod app_state;
pub mod auth_context;
pub mod collaboration;
pub mod error;
pub mod flows;
pub mod generate;

use axum::{Json, Router, routing::get};
use serde_json::{Value, json};

pub use app_state::AppState;
pub use auth_context::{AuthContext, MaybeAuth};
pub use error::ApiError;

/// Create the API router combining all route modules.
///
/// State is applied by callers (`.with_state(app_state)`).
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .nest("/flows", flows::flows_router())
        .merge(generate::generate_router())
}

/// Full application router with state, rooted at `/`.
pub fn create_app(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", create_api_router())
        .with_state(app_state)
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "flowchart-api",
    }))
}
