//! JWT Service for session token generation and validation.
//!
//! Sessions carry a single short-lived (15 minutes) access token.

use crate::storage::{UserContext, UserSession};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, TokenData, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

const DEV_SECRET: &str = "dev-secret-do-not-use-in-production-change-me-now";

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,
    pub email: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Session ID (for tracking/revocation)
    pub session_id: String,
}

impl Claims {
    pub fn user_context(&self) -> Result<UserContext, String> {
        let user_id = Uuid::parse_str(&self.sub)
            .map_err(|_| "Token subject is not a user id".to_string())?;
        Ok(UserContext {
            user_id,
            email: self.email.clone(),
        })
    }
}

/// JWT Service configuration
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_duration: Duration,
}

impl JwtService {
    /// Create a new JWT service with the given secret
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            access_token_duration: Duration::minutes(15),
        }
    }

    /// Resolves the signing secret from `JWT_SECRET`.
    ///
    /// Outside `APP_ENV=development` a missing or short secret is an error;
    /// in development a fixed insecure secret is used with a warning.
    pub fn secret_from_env() -> Result<String, String> {
        let app_env = std::env::var("APP_ENV").unwrap_or_else(|_| "production".to_string());
        let is_development = app_env.to_lowercase() == "development";

        let secret = match std::env::var("JWT_SECRET") {
            Ok(s) => s,
            Err(_) => {
                if is_development {
                    warn!(
                        "JWT_SECRET not set! Using default secret for development. DO NOT USE IN PRODUCTION!"
                    );
                    DEV_SECRET.to_string()
                } else {
                    return Err(
                        "JWT_SECRET environment variable is required in production".to_string()
                    );
                }
            }
        };

        if secret.len() < 32 {
            if is_development {
                warn!("JWT_SECRET is less than 32 characters. Consider using a longer secret.");
            } else {
                return Err("JWT_SECRET must be at least 32 characters in production".to_string());
            }
        }

        Ok(secret)
    }

    pub fn from_env() -> Result<Self, String> {
        Ok(Self::new(&Self::secret_from_env()?))
    }

    /// Signs a fresh access token and wraps it as an editor session.
    pub fn issue_session(&self, user: UserContext) -> Result<UserSession, String> {
        let now = Utc::now();
        let expires_at = now + self.access_token_duration;
        let session_id = Uuid::new_v4().to_string();
        let claims = Claims {
            sub: user.user_id.to_string(),
            email: user.email.clone(),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
            session_id,
        };
        let access_token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| format!("Failed to encode token: {}", e))?;

        info!(
            "Issued session {} for user {}, expires: {}",
            claims.session_id, user.user_id, expires_at
        );
        Ok(UserSession { user, access_token })
    }

    /// Validate an access token and return the claims
    pub fn validate_access_token(&self, token: &str) -> Result<Claims, String> {
        Ok(self.decode_token(token)?.claims)
    }

    /// Decode and validate a token (checks signature and expiration)
    fn decode_token(&self, token: &str) -> Result<TokenData<Claims>, String> {
        let mut validation = Validation::default();
        validation.validate_exp = true;

        decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => "Token has expired".to_string(),
            jsonwebtoken::errors::ErrorKind::InvalidToken => "Invalid token format".to_string(),
            jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                "Invalid token signature".to_string()
            }
            _ => format!("Token validation failed: {}", e),
        })
    }

    /// Extract bearer token from Authorization header
    pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
        auth_header.strip_prefix("Bearer ")
    }
}

/// Shared JWT service for use across the application
pub type SharedJwtService = Arc<JwtService>;
