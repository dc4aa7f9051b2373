//! Natural-language diagram generation.
//!
//! [`GenerationAdapter`] is the editor-side boundary: it trims the
//! conversation context, calls a [`GenerationClient`] and validates the
//! returned structure. [`LlmService`] is the server-side half that talks to
//! an OpenAI-compatible chat completions API.

use crate::models::DiagramContent;
use crate::models::enums::ExchangeRole;
use crate::storage::Capability;
use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_CONTEXT_WINDOW: usize = 8;
pub const DEFAULT_EXCHANGE_CHAR_LIMIT: usize = 1000;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerationError {
    #[error("Sign in to generate diagrams")]
    Unauthenticated,
    #[error("Generation service returned an invalid diagram: {0}")]
    MalformedResponse(String),
    #[error("Generation service error: {0}")]
    Service(String),
    #[error("Could not reach generation service: {0}")]
    Transport(String),
    #[error("Generation limit reached: {0}")]
    LimitReached(String),
}

/// One prior prompt or reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationExchange {
    pub role: ExchangeRole,
    pub content: String,
}

impl ConversationExchange {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ExchangeRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ExchangeRole::Assistant,
            content: content.into(),
        }
    }
}

/// Body of `POST /api/v1/generate-flowchart`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<ConversationExchange>,
}

/// Transport to the generation endpoint. Returns the raw `flowData` value.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn request(
        &self,
        request: &GenerationRequest,
        access_token: &str,
    ) -> Result<Value, GenerationError>;
}

/// reqwest client for the generation endpoint.
pub struct HttpGenerationClient {
    client: Client,
    endpoint: String,
}

impl HttpGenerationClient {
    /// `base_url` is the server root; the endpoint path is appended.
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            endpoint: format!(
                "{}/api/v1/generate-flowchart",
                base_url.trim_end_matches('/')
            ),
        }
    }
}

#[async_trait]
impl GenerationClient for HttpGenerationClient {
    async fn request(
        &self,
        request: &GenerationRequest,
        access_token: &str,
    ) -> Result<Value, GenerationError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(access_token)
            .json(request)
            .send()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            // Error bodies may come from a proxy and need not be JSON.
            let message = response
                .json::<Value>()
                .await
                .ok()
                .and_then(|body| body.get("error").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| format!("Failed to generate flowchart ({})", status));
            return Err(status_error(status, message));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| GenerationError::MalformedResponse(e.to_string()))?;

        match body {
            Value::Object(mut object) => object.remove("flowData").ok_or_else(|| {
                GenerationError::MalformedResponse("missing flowData".to_string())
            }),
            _ => Err(GenerationError::MalformedResponse(
                "response is not an object".to_string(),
            )),
        }
    }
}

fn status_error(status: StatusCode, message: String) -> GenerationError {
    match status {
        StatusCode::UNAUTHORIZED => GenerationError::Unauthenticated,
        StatusCode::TOO_MANY_REQUESTS => GenerationError::LimitReached(message),
        _ => GenerationError::Service(message),
    }
}

/// Stateless boundary to the generation service.
pub struct GenerationAdapter {
    client: Arc<dyn GenerationClient>,
    context_window: usize,
    exchange_char_limit: usize,
}

impl GenerationAdapter {
    pub fn new(client: Arc<dyn GenerationClient>) -> Self {
        Self::with_limits(client, DEFAULT_CONTEXT_WINDOW, DEFAULT_EXCHANGE_CHAR_LIMIT)
    }

    pub fn with_limits(
        client: Arc<dyn GenerationClient>,
        context_window: usize,
        exchange_char_limit: usize,
    ) -> Self {
        Self {
            client,
            context_window,
            exchange_char_limit,
        }
    }

    /// Most recent exchanges only, each cut to the character limit.
    pub fn bounded_context(&self, context: &[ConversationExchange]) -> Vec<ConversationExchange> {
        let start = context.len().saturating_sub(self.context_window);
        context[start..]
            .iter()
            .map(|exchange| ConversationExchange {
                role: exchange.role,
                content: exchange
                    .content
                    .chars()
                    .take(self.exchange_char_limit)
                    .collect(),
            })
            .collect()
    }

    /// Produces replacement content. The caller applies it atomically.
    pub async fn generate(
        &self,
        prompt: &str,
        context: &[ConversationExchange],
        caller: &Capability,
    ) -> Result<DiagramContent, GenerationError> {
        let token = caller
            .access_token()
            .ok_or(GenerationError::Unauthenticated)?;

        let request = GenerationRequest {
            prompt: prompt.to_string(),
            context: self.bounded_context(context),
        };
        let flow_data = self.client.request(&request, token).await?;
        let content = DiagramContent::from_value(flow_data)
            .map_err(|e| GenerationError::MalformedResponse(e.to_string()))?;
        info!(
            "[Generation] Received {} nodes and {} edges",
            content.nodes.len(),
            content.edges.len()
        );
        Ok(content)
    }
}

const SYSTEM_PROMPT: &str = r#"You are a flowchart generation expert. Convert the user's description into React Flow JSON.
Output ONLY a JSON object {"nodes": [...], "edges": [...]} with no markdown and no explanations.
Every node has: id (string), type (string), position ({x, y}), data (object).
Every edge has: id (string), source (string), target (string), optional sourceHandle/targetHandle/label.
Node types:
  "terminal" for start and end, data {label, terminalType: "start"|"end"}
  "process" for actions and steps, data {label}
  "decision" for yes/no branches, data {label} ending in "?"; outgoing edges use sourceHandle "yes" or "no"
  "shape" only when the meaning matches, data {label, shape}: parallelogram for input/output, cylinder for storage, document for reports
  "database" for schema tables, data {label, columns: [{name, type, isPrimary, isForeignKey, references}]}
Space nodes 160-220px apart vertically and 250px apart horizontally; keep the chart under 800px wide."#;

fn strip_fences(text: &str) -> String {
    match Regex::new(r"(?i)^\s*```(?:json)?\s*|\s*```\s*$").ok() {
        Some(fence) => fence.replace_all(text.trim(), "").into_owned(),
        None => text.trim().to_string(),
    }
}

/// Pulls the diagram object out of a model reply: strips code fences, cuts
/// to the outermost braces, and checks `nodes`/`edges` are arrays.
pub fn extract_flow_data(text: &str) -> Result<Value> {
    let stripped = strip_fences(text);
    let start = stripped
        .find('{')
        .context("No JSON object in model response")?;
    let end = stripped
        .rfind('}')
        .filter(|end| *end > start)
        .context("Unterminated JSON object in model response")?;

    let flow_data: Value = serde_json::from_str(&stripped[start..=end])
        .context("Failed to parse model response as JSON")?;
    if !flow_data.get("nodes").is_some_and(Value::is_array) {
        anyhow::bail!("Invalid flowchart structure: nodes must be an array");
    }
    if !flow_data.get("edges").is_some_and(Value::is_array) {
        anyhow::bail!("Invalid flowchart structure: edges must be an array");
    }
    Ok(flow_data)
}

/// Server-side LLM client.
pub struct LlmService {
    client: Option<Client>,
    api_key: Option<String>,
    model: String,
    url: String,
}

impl LlmService {
    pub fn new(api_key: Option<String>, model: String, url: String) -> Self {
        let client = if api_key.is_some() {
            Some(Client::new())
        } else {
            warn!("[Generation] AI API key not configured");
            None
        };
        Self {
            client,
            api_key,
            model,
            url,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    pub async fn generate_flowchart(
        &self,
        prompt: &str,
        context: &[ConversationExchange],
    ) -> Result<Value> {
        let mut messages = vec![json!({"role": "system", "content": SYSTEM_PROMPT})];
        for exchange in context {
            messages.push(json!({"role": exchange.role, "content": exchange.content}));
        }
        messages.push(json!({"role": "user", "content": prompt}));

        let reply = self.call_ai(messages).await?;
        extract_flow_data(&reply)
    }

    async fn call_ai(&self, messages: Vec<Value>) -> Result<String> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("AI client not initialized"))?;
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("API key not configured"))?;

        let request_body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": 0.3,
            "response_format": {"type": "json_object"}
        });

        let response = client
            .post(&self.url)
            .bearer_auth(api_key)
            .json(&request_body)
            .send()
            .await
            .context("Failed to send request to AI service")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "AI service returned error {}: {}",
                status,
                error_text
            ));
        }

        let response_json: Value = response
            .json()
            .await
            .context("Failed to parse AI service response")?;

        let content = response_json
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|arr| arr.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|msg| msg.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| anyhow::anyhow!("Invalid AI response format"))?;

        Ok(content.to_string())
    }
}
