//! Local draft cache: slot layout and persistence.

use flowchart_api::models::{Diagram, Node, Position, Tool};
use flowchart_api::storage::local_cache::{DRAFT_SLOT, POINTER_SLOT};
use flowchart_api::storage::{CacheError, Draft, LocalCache, MemoryLocalCache, SqliteLocalCache};
use serde_json::Value;
use tempfile::TempDir;
use uuid::Uuid;

fn sample_draft() -> Draft {
    let mut diagram = Diagram::blank();
    diagram.rename("Payments");
    diagram
        .add_node(Node::from_tool(Tool::Process, Position::new(10.0, 20.0)))
        .unwrap();
    Draft::from_diagram(&diagram)
}

fn exercise_slots(cache: &dyn LocalCache) {
    assert_eq!(cache.load_pointer().unwrap(), None);
    assert_eq!(cache.load_draft().unwrap(), None);

    let id = Uuid::new_v4();
    let draft = sample_draft();
    cache.store_pointer(id).unwrap();
    cache.store_draft(&draft).unwrap();

    assert_eq!(cache.load_pointer().unwrap(), Some(id.to_string()));
    assert_eq!(cache.load_draft().unwrap(), Some(draft));

    cache.clear().unwrap();
    assert_eq!(cache.read_slot(POINTER_SLOT).unwrap(), None);
    assert_eq!(cache.read_slot(DRAFT_SLOT).unwrap(), None);
}

#[test]
fn test_memory_cache_slots() {
    exercise_slots(&MemoryLocalCache::new());
}

#[test]
fn test_sqlite_cache_slots() {
    exercise_slots(&SqliteLocalCache::in_memory().unwrap());
}

#[test]
fn test_sqlite_cache_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("drafts.db");
    let id = Uuid::new_v4();
    {
        let cache = SqliteLocalCache::open(&path).unwrap();
        cache.store_pointer(id).unwrap();
        cache.store_draft(&sample_draft()).unwrap();
    }

    let reopened = SqliteLocalCache::open(&path).unwrap();
    assert_eq!(reopened.load_pointer().unwrap(), Some(id.to_string()));
    let restored = reopened.load_draft().unwrap().unwrap().into_diagram();
    assert_eq!(restored.name, "Payments");
    assert_eq!(restored.nodes.len(), 1);
    assert!(restored.id.is_none());
}

#[test]
fn test_overwrite_keeps_single_value() {
    let cache = SqliteLocalCache::in_memory().unwrap();
    cache.write_slot(POINTER_SLOT, "first").unwrap();
    cache.write_slot(POINTER_SLOT, "second").unwrap();
    assert_eq!(cache.load_pointer().unwrap().as_deref(), Some("second"));
}

#[test]
fn test_draft_slot_holds_nodes_edges_and_name() {
    let cache = MemoryLocalCache::new();
    cache.store_draft(&sample_draft()).unwrap();

    let raw: Value = serde_json::from_str(&cache.read_slot(DRAFT_SLOT).unwrap().unwrap()).unwrap();
    assert_eq!(raw["name"], "Payments");
    assert_eq!(raw["nodes"][0]["type"], "process");
    assert!(raw["edges"].as_array().unwrap().is_empty());
}

#[test]
fn test_pointer_slot_is_verbatim() {
    let cache = MemoryLocalCache::new();
    cache.write_slot(POINTER_SLOT, "not-a-uuid").unwrap();
    assert_eq!(cache.load_pointer().unwrap().as_deref(), Some("not-a-uuid"));
}

#[test]
fn test_legacy_draft_without_name() {
    let cache = MemoryLocalCache::new();
    cache
        .write_slot(DRAFT_SLOT, r#"{"nodes":[],"edges":[]}"#)
        .unwrap();
    let diagram = cache.load_draft().unwrap().unwrap().into_diagram();
    assert_eq!(diagram.name, flowchart_api::models::DEFAULT_DIAGRAM_NAME);
}

#[test]
fn test_garbage_draft_reports_payload_error() {
    let cache = MemoryLocalCache::new();
    cache.write_slot(DRAFT_SLOT, "{{{").unwrap();
    assert!(matches!(cache.load_draft(), Err(CacheError::Payload(_))));
}
