//! End-to-end editor behaviour: generation, import/export and the toolbar.

#[path = "../support/mod.rs"]
mod support;

use flowchart_api::config::EditorConfig;
use flowchart_api::models::enums::ExchangeRole;
use flowchart_api::models::{ConnectGesture, ModelError, Position, Tool};
use flowchart_api::services::autosave::SaveStatus;
use flowchart_api::services::collaboration::CollaborationHub;
use flowchart_api::services::generation_service::GenerationError;
use flowchart_api::services::{AuthSession, EditorError};
use flowchart_api::storage::{DocumentStore, LocalCache};
use serde_json::json;
use std::sync::Arc;
use support::{Harness, InstrumentedStore, user_session};

fn generated_flow() -> serde_json::Value {
    json!({
        "nodes": [
            {"id": "1", "type": "terminal", "position": {"x": 250, "y": 0},
             "data": {"label": "Start", "terminalType": "start"}},
            {"id": "2", "type": "process", "position": {"x": 250, "y": 180}, "data": {}},
            {"id": "3", "type": "terminal", "position": {"x": 250, "y": 360},
             "data": {"label": "End", "terminalType": "end"}}
        ],
        "edges": [
            {"id": "e1-2", "source": "1", "target": "2"},
            {"id": "e2-3", "source": "2", "target": "3"}
        ]
    })
}

fn limited(sessions: usize, messages: usize) -> Harness {
    let config = EditorConfig {
        max_generation_sessions: sessions,
        max_messages_per_session: messages,
        ..EditorConfig::default()
    };
    Harness::build_with(
        config,
        AuthSession::signed_in(user_session("alice@example.com")),
        Arc::new(InstrumentedStore::new()),
        Arc::new(CollaborationHub::new()),
    )
}

#[tokio::test]
async fn test_generated_diagram_without_labels_is_accepted() {
    let harness = Harness::signed_in("alice@example.com");
    harness.generation.reply(Ok(generated_flow()));

    harness.editor.generate("a three step flow").await.unwrap();

    let diagram = harness.editor.snapshot();
    assert_eq!(diagram.nodes.len(), 3);
    assert_eq!(diagram.edges.len(), 2);
    assert_eq!(diagram.node("2").unwrap().label(), None);
    assert_eq!(harness.editor.status(), SaveStatus::Unsaved);
    assert!(harness.editor.autosave().is_pending());

    let conversation = harness.editor.generation_conversation().unwrap();
    assert_eq!(conversation.exchanges.len(), 2);
    assert_eq!(conversation.exchanges[0].role, ExchangeRole::User);
    assert_eq!(
        conversation.exchanges[1].content,
        "Generated a flowchart with 3 nodes and 2 edges."
    );
}

#[tokio::test]
async fn test_malformed_generation_leaves_diagram_untouched() {
    let harness = Harness::signed_in("alice@example.com");
    harness
        .editor
        .place_node(Tool::Process, Position::default())
        .unwrap();
    harness.editor.save_now().await.unwrap();
    let before = harness.editor.snapshot();
    let revision = harness.editor.diagram().revision();

    harness.generation.reply(Ok(json!({"nodes": "not-an-array"})));
    let err = harness.editor.generate("anything").await.unwrap_err();

    assert!(matches!(
        err,
        EditorError::Generation(GenerationError::MalformedResponse(_))
    ));
    assert_eq!(harness.editor.snapshot(), before);
    assert_eq!(harness.editor.diagram().revision(), revision);
    assert_eq!(harness.editor.status(), SaveStatus::Saved);
    assert!(
        harness
            .editor
            .generation_conversation()
            .unwrap()
            .exchanges
            .is_empty()
    );
}

#[tokio::test]
async fn test_generation_requires_sign_in() {
    let harness = Harness::anonymous();
    let err = harness.editor.generate("login flow").await.unwrap_err();
    assert_eq!(err, EditorError::Generation(GenerationError::Unauthenticated));
    assert!(harness.generation.requests().is_empty());
    assert!(harness.editor.snapshot().is_empty());
}

#[tokio::test]
async fn test_generation_replaces_content_but_keeps_identity() {
    let harness = Harness::signed_in("alice@example.com");
    let mut existing = flowchart_api::models::Diagram::blank();
    existing.rename("Checkout");
    existing
        .add_node(flowchart_api::models::Node::from_tool(Tool::Database, Position::default()))
        .unwrap();
    let id = harness
        .store
        .commit(None, &existing, &harness.capability())
        .await
        .unwrap()
        .id;
    harness.editor.open(Some(id)).await;

    harness.generation.reply(Ok(generated_flow()));
    harness.editor.generate("redo it").await.unwrap();

    let diagram = harness.editor.snapshot();
    assert_eq!(diagram.id, Some(id));
    assert_eq!(diagram.name, "Checkout");
    assert_eq!(diagram.nodes.len(), 3);
}

#[tokio::test]
async fn test_conversation_context_is_forwarded() {
    let harness = Harness::signed_in("alice@example.com");
    harness.generation.reply(Ok(generated_flow()));
    harness.generation.reply(Ok(generated_flow()));

    harness.editor.generate("first").await.unwrap();
    harness.editor.generate("make it longer").await.unwrap();

    let requests = harness.generation.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].0.context.is_empty());
    let context = &requests[1].0.context;
    assert_eq!(context.len(), 2);
    assert_eq!(context[0].content, "first");
    assert_eq!(context[1].role, ExchangeRole::Assistant);
}

#[tokio::test]
async fn test_message_limit_per_session() {
    let harness = limited(5, 2);
    for _ in 0..2 {
        harness.generation.reply(Ok(generated_flow()));
        harness.editor.generate("again").await.unwrap();
    }

    let err = harness.editor.generate("one more").await.unwrap_err();
    assert!(matches!(
        err,
        EditorError::Generation(GenerationError::LimitReached(_))
    ));
    assert_eq!(harness.generation.requests().len(), 2);

    // A fresh session resets the message count.
    harness.editor.start_generation_session().unwrap();
    harness.editor.generate("fresh start").await.unwrap();
    assert_eq!(harness.generation.requests().len(), 3);
}

#[tokio::test]
async fn test_session_limit() {
    let harness = limited(2, 20);
    let first = harness.editor.start_generation_session().unwrap();
    let second = harness.editor.start_generation_session().unwrap();
    assert_ne!(first, second);
    assert_eq!(harness.editor.generation_conversation().unwrap().id, second);

    assert!(matches!(
        harness.editor.start_generation_session(),
        Err(EditorError::Generation(GenerationError::LimitReached(_)))
    ));
}

#[tokio::test]
async fn test_export_and_import_between_editors() {
    let source = Harness::anonymous();
    let start = source
        .editor
        .place_node(Tool::TerminalStart, Position::new(0.0, 0.0))
        .unwrap();
    let check = source
        .editor
        .place_node(Tool::Decision, Position::new(0.0, 180.0))
        .unwrap();
    source
        .editor
        .connect(ConnectGesture::between(&start.id, "b", &check.id, "t"))
        .unwrap();
    source.editor.diagram().rename("Approval").unwrap();

    let (file_name, body) = source.editor.export_json().unwrap();
    assert!(file_name.starts_with("Approval-"));
    assert!(file_name.ends_with(".json"));

    let target = Harness::anonymous();
    target.editor.import_json(&body).unwrap();
    let imported = target.editor.snapshot();
    assert_eq!(imported.content(), source.editor.snapshot().content());
    assert_eq!(target.editor.status(), SaveStatus::Unsaved);

    // Importing what was just exported changes nothing further.
    let (_, again) = target.editor.export_json().unwrap();
    assert_eq!(again, body);
}

#[tokio::test]
async fn test_import_fills_missing_ids_and_rejects_garbage() {
    let harness = Harness::anonymous();
    harness
        .editor
        .import_json(r#"{"nodes": [{"type": "process", "data": {"label": "A"}}], "edges": []}"#)
        .unwrap();
    let diagram = harness.editor.snapshot();
    assert_eq!(diagram.nodes.len(), 1);
    assert!(!diagram.nodes[0].id.is_empty());

    let err = harness.editor.import_json(r#"{"nodes": 3}"#).unwrap_err();
    assert!(matches!(err, EditorError::Model(ModelError::InvalidDocument(_))));
    assert_eq!(harness.editor.snapshot(), diagram);
}

#[tokio::test]
async fn test_toolbar_placement_and_connections() {
    let harness = Harness::anonymous();
    let table = harness
        .editor
        .place_node(Tool::parse("database").unwrap(), Position::new(40.0, 40.0))
        .unwrap();
    let star = harness
        .editor
        .place_node(Tool::parse("shape-star").unwrap(), Position::new(400.0, 40.0))
        .unwrap();
    assert_eq!(table.data.columns.len(), 2);

    let err = harness
        .editor
        .connect(ConnectGesture {
            source: Some(table.id.clone()),
            ..ConnectGesture::default()
        })
        .unwrap_err();
    assert_eq!(err, EditorError::Model(ModelError::AmbiguousGesture));

    let edge = harness
        .editor
        .connect(ConnectGesture::between(&table.id, "r", &star.id, "l"))
        .unwrap();
    assert_eq!(harness.editor.snapshot().edges, vec![edge]);

    // The local draft follows every edit.
    let draft = harness.cache.load_draft().unwrap().unwrap();
    assert_eq!(draft.nodes.len(), 2);
    assert_eq!(draft.edges.len(), 1);
}

#[tokio::test]
async fn test_close_cancels_pending_save() {
    let harness = Harness::signed_in("alice@example.com");
    harness
        .editor
        .place_node(Tool::Process, Position::default())
        .unwrap();
    assert!(harness.editor.autosave().is_pending());

    harness.editor.close();
    assert!(!harness.editor.autosave().is_pending());
    assert_eq!(harness.store.commits(), 0);
}
