//! Environment-driven configuration.

use crate::services::autosave::DEFAULT_DEBOUNCE;
use crate::services::generation_service::{DEFAULT_CONTEXT_WINDOW, DEFAULT_EXCHANGE_CHAR_LIMIT};
use crate::services::jwt_service::JwtService;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 8081;
pub const DEFAULT_AI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_AI_SERVICE_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_GENERATION_RATE_PER_MINUTE: u32 = 20;
pub const DEFAULT_MAX_GENERATION_SESSIONS: usize = 10;
pub const DEFAULT_MAX_MESSAGES_PER_SESSION: usize = 20;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error("{0}")]
    Secret(String),
}

/// Per-session editor tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct EditorConfig {
    pub autosave_debounce: Duration,
    /// Prior exchanges forwarded to the generation service.
    pub context_window: usize,
    /// Characters kept from each forwarded exchange.
    pub exchange_char_limit: usize,
    pub max_generation_sessions: usize,
    pub max_messages_per_session: usize,
    /// SQLite file backing the local draft slots. `None` keeps them in memory.
    pub local_cache_path: Option<PathBuf>,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            autosave_debounce: DEFAULT_DEBOUNCE,
            context_window: DEFAULT_CONTEXT_WINDOW,
            exchange_char_limit: DEFAULT_EXCHANGE_CHAR_LIMIT,
            max_generation_sessions: DEFAULT_MAX_GENERATION_SESSIONS,
            max_messages_per_session: DEFAULT_MAX_MESSAGES_PER_SESSION,
            local_cache_path: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub ai_api_key: Option<String>,
    pub ai_model: String,
    pub ai_service_url: String,
    pub generation_rate_per_minute: u32,
    /// Empty means any origin.
    pub cors_allowed_origins: Vec<String>,
    pub editor: EditorConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let jwt_secret = JwtService::secret_from_env().map_err(ConfigError::Secret)?;

        let mut editor = EditorConfig::default();
        if let Some(ms) = parse_var::<u64>("AUTOSAVE_DEBOUNCE_MS")? {
            editor.autosave_debounce = Duration::from_millis(ms);
        }
        editor.local_cache_path = non_empty_var("LOCAL_CACHE_PATH").map(PathBuf::from);

        let generation_rate_per_minute = parse_var::<u32>("GENERATION_RATE_PER_MINUTE")?
            .unwrap_or(DEFAULT_GENERATION_RATE_PER_MINUTE);
        if generation_rate_per_minute == 0 {
            return Err(ConfigError::Invalid {
                key: "GENERATION_RATE_PER_MINUTE",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            port: parse_var("PORT")?.unwrap_or(DEFAULT_PORT),
            database_url: non_empty_var("DATABASE_URL"),
            jwt_secret,
            ai_api_key: non_empty_var("AI_API_KEY"),
            ai_model: non_empty_var("AI_MODEL").unwrap_or_else(|| DEFAULT_AI_MODEL.to_string()),
            ai_service_url: non_empty_var("AI_SERVICE_URL")
                .unwrap_or_else(|| DEFAULT_AI_SERVICE_URL.to_string()),
            generation_rate_per_minute,
            cors_allowed_origins: non_empty_var("CORS_ALLOWED_ORIGINS")
                .map(|raw| {
                    raw.split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            editor,
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match non_empty_var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(None),
    }
}
