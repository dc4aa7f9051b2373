//! Authentication context extractors.
//!
//! The bearer token comes from the `Authorization` header, or from a `token`
//! query parameter for websocket upgrades that cannot set headers.

use super::app_state::AppState;
use super::error::ApiError;
use crate::services::jwt_service::JwtService;
use crate::storage::{Capability, UserContext, UserSession};
use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use serde::Deserialize;
use std::convert::Infallible;

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Authenticated caller.
#[derive(Clone, Debug)]
pub struct AuthContext {
    pub user_context: UserContext,
    pub session_id: String,
    access_token: String,
}

impl AuthContext {
    pub fn capability(&self) -> Capability {
        Capability::Authenticated(UserSession {
            user: self.user_context.clone(),
            access_token: self.access_token.clone(),
        })
    }
}

fn bearer_token(parts: &Parts) -> Option<String> {
    if let Some(header) = parts
        .headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
    {
        return JwtService::extract_bearer_token(header).map(str::to_string);
    }
    Query::<TokenQuery>::try_from_uri(&parts.uri)
        .ok()
        .and_then(|Query(q)| q.token)
        .filter(|t| !t.is_empty())
}

fn authenticate(parts: &Parts, state: &AppState) -> Result<AuthContext, ApiError> {
    let token = bearer_token(parts).ok_or_else(|| {
        tracing::debug!("No authorization token provided");
        ApiError::unauthorized()
    })?;

    let claims = state.jwt.validate_access_token(&token).map_err(|e| {
        tracing::warn!("JWT validation failed: {}", e);
        ApiError::unauthorized()
    })?;

    let user_context = claims.user_context().map_err(|e| {
        tracing::warn!("JWT subject rejected: {}", e);
        ApiError::unauthorized()
    })?;

    Ok(AuthContext {
        user_context,
        session_id: claims.session_id,
        access_token: token,
    })
}

impl FromRequestParts<AppState> for AuthContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        authenticate(parts, state)
    }
}

/// Caller that may be anonymous. A missing or invalid token yields
/// [`Capability::Anonymous`].
#[derive(Clone, Debug, Default)]
pub struct MaybeAuth(pub Option<AuthContext>);

impl MaybeAuth {
    pub fn capability(&self) -> Capability {
        self.0
            .as_ref()
            .map(AuthContext::capability)
            .unwrap_or_default()
    }
}

impl FromRequestParts<AppState> for MaybeAuth {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(MaybeAuth(authenticate(parts, state).ok()))
    }
}
