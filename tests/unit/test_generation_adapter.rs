//! Generation adapter and the server-side LLM client.

#[path = "../support/mod.rs"]
mod support;

use flowchart_api::models::NodeKind;
use flowchart_api::models::enums::ExchangeRole;
use flowchart_api::services::generation_service::{
    ConversationExchange, GenerationAdapter, GenerationError, LlmService,
};
use flowchart_api::storage::Capability;
use serde_json::json;
use std::sync::Arc;
use support::{StubGenerationClient, authenticated, spawn_fake_llm};

fn conversation(len: usize) -> Vec<ConversationExchange> {
    (0..len)
        .map(|i| {
            if i % 2 == 0 {
                ConversationExchange::user(format!("prompt {i}"))
            } else {
                ConversationExchange::assistant(format!("reply {i}"))
            }
        })
        .collect()
}

#[test]
fn test_context_keeps_last_eight_exchanges() {
    let adapter = GenerationAdapter::new(Arc::new(StubGenerationClient::new()));
    let bounded = adapter.bounded_context(&conversation(11));
    assert_eq!(bounded.len(), 8);
    assert_eq!(bounded[0].content, "reply 3");
    assert_eq!(bounded[7].content, "prompt 10");
}

#[test]
fn test_context_truncates_long_exchanges() {
    let adapter = GenerationAdapter::new(Arc::new(StubGenerationClient::new()));
    let long = ConversationExchange::user("é".repeat(1500));
    let bounded = adapter.bounded_context(&[long]);
    assert_eq!(bounded[0].content.chars().count(), 1000);
    assert_eq!(bounded[0].role, ExchangeRole::User);
}

#[test]
fn test_custom_limits() {
    let adapter = GenerationAdapter::with_limits(Arc::new(StubGenerationClient::new()), 2, 4);
    let bounded = adapter.bounded_context(&conversation(5));
    let contents: Vec<&str> = bounded.iter().map(|e| e.content.as_str()).collect();
    assert_eq!(contents, vec!["repl", "prom"]);
}

#[tokio::test]
async fn test_generate_returns_content_and_sends_bounded_request() {
    let client = Arc::new(StubGenerationClient::new());
    client.reply(Ok(json!({
        "nodes": [
            {"id": "1", "type": "terminal", "position": {"x": 0, "y": 0},
             "data": {"label": "Start", "terminalType": "start"}},
            {"id": "2", "type": "decision", "position": {"x": 0, "y": 180},
             "data": {"label": "Valid?"}}
        ],
        "edges": [{"id": "e1-2", "source": "1", "target": "2"}]
    })));
    let adapter = GenerationAdapter::new(client.clone());
    let caller = authenticated("alice@example.com");

    let content = adapter
        .generate("login flow", &conversation(10), &caller)
        .await
        .unwrap();
    assert_eq!(content.nodes.len(), 2);
    assert_eq!(content.nodes[1].kind, NodeKind::Decision);
    assert_eq!(content.edges[0].target, "2");

    let requests = client.requests();
    assert_eq!(requests.len(), 1);
    let (request, token) = &requests[0];
    assert_eq!(request.prompt, "login flow");
    assert_eq!(request.context.len(), 8);
    assert_eq!(Some(token.as_str()), caller.access_token());
}

#[tokio::test]
async fn test_generate_requires_session() {
    let client = Arc::new(StubGenerationClient::new());
    let adapter = GenerationAdapter::new(client.clone());
    let err = adapter
        .generate("anything", &[], &Capability::Anonymous)
        .await
        .unwrap_err();
    assert_eq!(err, GenerationError::Unauthenticated);
    assert!(client.requests().is_empty());
}

#[tokio::test]
async fn test_generate_rejects_malformed_structure() {
    let client = Arc::new(StubGenerationClient::new());
    client.reply(Ok(json!({"nodes": {"id": "1"}, "edges": []})));
    client.reply(Ok(json!(["not", "an", "object"])));
    let adapter = GenerationAdapter::new(client);
    let caller = authenticated("alice@example.com");

    for _ in 0..2 {
        assert!(matches!(
            adapter.generate("x", &[], &caller).await,
            Err(GenerationError::MalformedResponse(_))
        ));
    }
}

#[tokio::test]
async fn test_missing_attributes_are_accepted() {
    let client = Arc::new(StubGenerationClient::new());
    client.reply(Ok(json!({
        "nodes": [{"type": "process", "position": {"x": 5, "y": 5}, "data": {}}],
        "edges": []
    })));
    let adapter = GenerationAdapter::new(client);
    let content = adapter
        .generate("x", &[], &authenticated("alice@example.com"))
        .await
        .unwrap();
    assert_eq!(content.nodes.len(), 1);
    assert!(content.nodes[0].label().is_none());
    assert!(!content.nodes[0].id.is_empty());
}

#[tokio::test]
async fn test_service_errors_pass_through() {
    let client = Arc::new(StubGenerationClient::new());
    client.reply(Err(GenerationError::Service("AI service not configured".into())));
    let adapter = GenerationAdapter::new(client);
    let err = adapter
        .generate("x", &[], &authenticated("alice@example.com"))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Generation service error: AI service not configured");
}

#[tokio::test]
async fn test_llm_service_extracts_fenced_reply() {
    let url = spawn_fake_llm("```json\n{\"nodes\": [{\"id\": \"1\"}], \"edges\": []}\n```").await;
    let llm = LlmService::new(Some("test-key".into()), "gpt-4o-mini".into(), url);
    assert!(llm.is_configured());

    let flow_data = llm
        .generate_flowchart("one step", &[ConversationExchange::user("earlier")])
        .await
        .unwrap();
    assert_eq!(flow_data["nodes"][0]["id"], "1");
}

#[tokio::test]
async fn test_llm_service_rejects_prose_reply() {
    let url = spawn_fake_llm("Sorry, I can't draw that.").await;
    let llm = LlmService::new(Some("test-key".into()), "gpt-4o-mini".into(), url);
    assert!(llm.generate_flowchart("x", &[]).await.is_err());
}

#[test]
fn test_llm_service_without_key_is_unconfigured() {
    let llm = LlmService::new(None, "gpt-4o-mini".into(), "http://127.0.0.1:9".into());
    assert!(!llm.is_configured());
}
