//! Flow document routes: CRUD, visibility and collaborator management.

use super::app_state::AppState;
use super::auth_context::{AuthContext, MaybeAuth};
use super::error::ApiError;
use crate::models::Diagram;
use crate::models::enums::CollaboratorRole;
use crate::storage::remote::IDEMPOTENCY_KEY;
use crate::storage::traits::grantable_role;
use crate::storage::{Collaborator, CommitReceipt, DocumentSummary};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, put},
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibilityBody {
    pub is_public: bool,
}

#[derive(Debug, Deserialize)]
pub struct RoleBody {
    #[serde(default)]
    pub role: Option<CollaboratorRole>,
}

/// Create the flows router, mounted at `/flows`
pub fn flows_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_flows).post(create_flow))
        .route("/{id}", get(get_flow).put(update_flow).delete(delete_flow))
        .route("/{id}/visibility", get(get_visibility).put(set_visibility))
        .route("/{id}/collaborators", get(list_collaborators))
        .route(
            "/{id}/collaborators/{user_id}",
            put(add_collaborator)
                .patch(update_collaborator)
                .delete(remove_collaborator),
        )
        .route("/{id}/collaborate", get(super::collaboration::handle_websocket))
}

/// GET /flows - owned and shared flows, newest first
async fn list_flows(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<Vec<DocumentSummary>>, ApiError> {
    Ok(Json(state.store.list(&auth.capability()).await?))
}

/// POST /flows - create, minting a new id
///
/// With an `Idempotency-Key` header, a repeated request updates the flow the
/// key first created instead of creating another.
async fn create_flow(
    State(state): State<AppState>,
    auth: AuthContext,
    headers: HeaderMap,
    Json(diagram): Json<Diagram>,
) -> Result<(StatusCode, Json<CommitReceipt>), ApiError> {
    let caller = auth.capability();
    let receipt = match create_key(&headers)? {
        Some(key) => state.store.create_once(key, &diagram, &caller).await?,
        None => state.store.commit(None, &diagram, &caller).await?,
    };
    info!(
        "Created flow {} for user {}",
        receipt.id, auth.user_context.user_id
    );
    Ok((StatusCode::CREATED, Json(receipt)))
}

fn create_key(headers: &HeaderMap) -> Result<Option<Uuid>, ApiError> {
    let Some(value) = headers.get(IDEMPOTENCY_KEY) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
        .map(Some)
        .ok_or_else(|| ApiError::bad_request("Idempotency-Key must be a UUID"))
}

/// GET /flows/{id} - public flows are readable anonymously
async fn get_flow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth: MaybeAuth,
) -> Result<Json<Diagram>, ApiError> {
    Ok(Json(state.store.fetch(id, &auth.capability()).await?))
}

/// PUT /flows/{id} - update in place; safe to retry
async fn update_flow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth: AuthContext,
    Json(diagram): Json<Diagram>,
) -> Result<Json<CommitReceipt>, ApiError> {
    Ok(Json(
        state
            .store
            .commit(Some(id), &diagram, &auth.capability())
            .await?,
    ))
}

/// DELETE /flows/{id} - owner only
async fn delete_flow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth: AuthContext,
) -> Result<StatusCode, ApiError> {
    state.store.remove(id, &auth.capability()).await?;
    info!("Deleted flow {}", id);
    Ok(StatusCode::NO_CONTENT)
}

async fn get_visibility(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<VisibilityBody>, ApiError> {
    Ok(Json(VisibilityBody {
        is_public: state.store.is_public(id).await?,
    }))
}

async fn set_visibility(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth: AuthContext,
    Json(body): Json<VisibilityBody>,
) -> Result<Json<VisibilityBody>, ApiError> {
    state
        .store
        .set_public(id, body.is_public, &auth.capability())
        .await?;
    Ok(Json(body))
}

async fn list_collaborators(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth: AuthContext,
) -> Result<Json<Vec<Collaborator>>, ApiError> {
    Ok(Json(state.store.collaborators(id, &auth.capability()).await?))
}

/// PUT /flows/{id}/collaborators/{user_id} - add or replace; role defaults to editor
async fn add_collaborator(
    State(state): State<AppState>,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
    auth: AuthContext,
    Json(body): Json<RoleBody>,
) -> Result<StatusCode, ApiError> {
    let role = grantable_role(body.role.unwrap_or(CollaboratorRole::Editor))?;
    state
        .store
        .add_collaborator(id, user_id, role, &auth.capability())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn update_collaborator(
    State(state): State<AppState>,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
    auth: AuthContext,
    Json(body): Json<RoleBody>,
) -> Result<StatusCode, ApiError> {
    let role = body
        .role
        .ok_or_else(|| ApiError::bad_request("role is required"))?;
    let role = grantable_role(role)?;
    state
        .store
        .update_collaborator_role(id, user_id, role, &auth.capability())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn remove_collaborator(
    State(state): State<AppState>,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
    auth: AuthContext,
) -> Result<StatusCode, ApiError> {
    state
        .store
        .remove_collaborator(id, user_id, &auth.capability())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
