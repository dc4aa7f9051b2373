//! Natural-language flowchart generation endpoint.

use super::app_state::AppState;
use super::auth_context::MaybeAuth;
use super::error::ApiError;
use crate::middleware::rate_limit;
use crate::services::generation_service::ConversationExchange;
use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{error, info};

#[derive(Debug, Deserialize)]
struct GenerateFlowchartRequest {
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    context: Vec<ConversationExchange>,
}

pub fn generate_router() -> Router<AppState> {
    Router::new().route("/generate-flowchart", post(generate_flowchart))
}

/// POST /generate-flowchart - returns `{success: true, flowData}`
async fn generate_flowchart(
    State(state): State<AppState>,
    auth: MaybeAuth,
    Json(request): Json<GenerateFlowchartRequest>,
) -> Result<Json<Value>, ApiError> {
    let Some(auth) = auth.0 else {
        return Err(ApiError::unauthorized());
    };

    let prompt = request
        .prompt
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::bad_request("Prompt is required"))?;

    let user_id = auth.user_context.user_id;
    if !rate_limit::allow(&state.generation_limiter, user_id) {
        return Err(ApiError::new(
            StatusCode::TOO_MANY_REQUESTS,
            "Generation limit reached, try again shortly",
        ));
    }

    if !state.llm.is_configured() {
        error!("[Generation] Request from {} but no AI key configured", user_id);
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "AI service not configured",
        ));
    }

    info!(
        "[Generation] Prompt from {} ({} context exchanges)",
        user_id,
        request.context.len()
    );
    match state.llm.generate_flowchart(prompt, &request.context).await {
        Ok(flow_data) => Ok(Json(json!({ "success": true, "flowData": flow_data }))),
        Err(e) => {
            error!("[Generation] Failed for {}: {:#}", user_id, e);
            Err(ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to generate flowchart: {}", e),
            ))
        }
    }
}
