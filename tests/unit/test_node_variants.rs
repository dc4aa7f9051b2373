//! Node variants: toolbar templates, geometry, wire parsing, column keys.

use flowchart_api::models::enums::{ShapeKind, TerminalKind};
use flowchart_api::models::node::{AttributeSchema, STICKY_NOTE_COLOR};
use flowchart_api::models::{
    Column, ColumnType, ModelError, Node, NodeData, NodeKind, Position, Size, Tool,
};
use serde_json::{Map, Value, json};

fn node_from(value: Value) -> Node {
    serde_json::from_value(value).unwrap()
}

#[test]
fn test_tool_names_parse() {
    assert_eq!(Tool::parse("process"), Some(Tool::Process));
    assert_eq!(Tool::parse("terminal-end"), Some(Tool::TerminalEnd));
    assert_eq!(Tool::parse("stickyNote"), Some(Tool::StickyNote));
    assert_eq!(
        Tool::parse("shape-arrow-left-right"),
        Some(Tool::Shape(ShapeKind::ArrowLeftRight))
    );
    assert_eq!(Tool::parse("shape-blob"), None);
    assert_eq!(Tool::parse("lasso"), None);
}

#[test]
fn test_tool_templates() {
    let origin = Position::new(100.0, 40.0);

    let decision = Node::from_tool(Tool::Decision, origin);
    assert!(decision.id.starts_with("node-"));
    assert_eq!(decision.kind, NodeKind::Decision);
    assert_eq!(decision.label(), Some("Decision?"));
    assert_eq!(decision.position, origin);

    let end = Node::from_tool(Tool::TerminalEnd, origin);
    assert_eq!(end.kind, NodeKind::Terminal(TerminalKind::End));
    assert_eq!(end.label(), Some("End"));

    let note = Node::from_tool(Tool::StickyNote, origin);
    assert_eq!(note.data.color.as_deref(), Some(STICKY_NOTE_COLOR));

    let table = Node::from_tool(Tool::Database, origin);
    assert_eq!(table.label(), Some("table_name"));
    assert_eq!(table.data.columns.len(), 2);
    assert!(table.data.columns[0].is_primary);
    assert_eq!(table.data.columns[0].column_type, ColumnType::Uuid);

    let cloud = Node::from_tool(Tool::Shape(ShapeKind::Cloud), origin);
    assert_eq!(cloud.kind, NodeKind::Shape(ShapeKind::Cloud));
    assert_eq!(cloud.label(), Some("cloud"));

    assert_ne!(decision.id, end.id);
}

#[test]
fn test_default_geometry() {
    let at = Position::default();
    let size = |tool| Node::from_tool(tool, at).geometry();
    assert_eq!(size(Tool::Process), Size::new(160.0, 50.0));
    assert_eq!(size(Tool::Decision), Size::new(130.0, 130.0));
    assert_eq!(size(Tool::TerminalStart), Size::new(130.0, 44.0));
    assert_eq!(size(Tool::StickyNote), Size::new(180.0, 160.0));
    assert_eq!(size(Tool::Shape(ShapeKind::Circle)), Size::new(90.0, 90.0));
    assert_eq!(size(Tool::Shape(ShapeKind::ArrowUp)), Size::new(80.0, 120.0));
}

#[test]
fn test_database_height_grows_with_columns() {
    let mut table = Node::from_tool(Tool::Database, Position::default());
    assert_eq!(table.geometry(), Size::new(220.0, 96.0));

    table.data.columns.push(Column::new("email", ColumnType::Varchar));
    assert_eq!(table.geometry(), Size::new(220.0, 126.0));

    table.data.columns.clear();
    assert_eq!(table.geometry(), Size::new(220.0, 36.0));
}

#[test]
fn test_attribute_schema_per_variant() {
    assert_eq!(NodeKind::Database.descriptor().schema, AttributeSchema::Columns);
    assert_eq!(NodeKind::StickyNote.descriptor().schema, AttributeSchema::Label);
    assert_eq!(NodeKind::Shape(ShapeKind::Star).type_tag(), "shape");
}

#[test]
fn test_wire_parsing_of_variants() {
    let start = node_from(json!({
        "id": "s", "type": "terminal", "position": {"x": 1, "y": 2},
        "data": {"label": "Begin", "terminalType": "start"}
    }));
    assert_eq!(start.kind, NodeKind::Terminal(TerminalKind::Start));
    assert_eq!(start.position, Position::new(1.0, 2.0));

    let input = node_from(json!({"id": "i", "type": "input", "data": {"label": "In"}}));
    assert_eq!(input.kind, NodeKind::Terminal(TerminalKind::Start));
    let output = node_from(json!({"id": "o", "type": "output", "data": {"label": "Out"}}));
    assert_eq!(output.kind, NodeKind::Terminal(TerminalKind::End));

    let unknown = node_from(json!({"id": "u", "type": "swimlane", "data": {"label": "?"}}));
    assert_eq!(unknown.kind, NodeKind::Process);

    let odd_shape = node_from(json!({"id": "x", "type": "shape", "data": {"shape": "blob"}}));
    assert_eq!(odd_shape.kind, NodeKind::Shape(ShapeKind::Square));
}

#[test]
fn test_unknown_data_keys_survive_round_trip() {
    let raw = json!({
        "id": "n1", "type": "process", "position": {"x": 0.0, "y": 0.0},
        "width": 200.0, "height": 70.0,
        "data": {"label": "Step", "owner": "ops", "priority": 3}
    });
    let node = node_from(raw.clone());
    assert_eq!(node.size, Some(Size::new(200.0, 70.0)));
    assert_eq!(node.data.extra["owner"], json!("ops"));
    assert_eq!(serde_json::to_value(&node).unwrap(), raw);
}

#[test]
fn test_variant_cannot_change_through_patch() {
    let mut node = Node::from_tool(Tool::TerminalStart, Position::default());
    let mut patch = Map::new();
    patch.insert("terminalType".into(), json!("end"));
    let err = node
        .data
        .apply_patch(&node.id.clone(), node.kind, &patch)
        .unwrap_err();
    assert!(matches!(err, ModelError::VariantChange { .. }));
    assert_eq!(node.label(), Some("Start"));

    // Restating the current variant is accepted.
    patch.insert("terminalType".into(), json!("start"));
    patch.insert("label".into(), json!("Go"));
    node.data.apply_patch("n", node.kind, &patch).unwrap();
    assert_eq!(node.label(), Some("Go"));
}

#[test]
fn test_columns_patch_replaces_list() {
    let mut node = Node::new(
        "t",
        NodeKind::Database,
        Position::default(),
        NodeData::labelled("users"),
    );
    let mut patch = Map::new();
    patch.insert(
        "columns".into(),
        json!([
            {"name": "id", "type": "uuid", "isPrimary": true},
            {"name": "org_id", "type": "UUID", "isForeign": true, "references": "orgs.id"},
            {"name": "meta", "type": "blob"}
        ]),
    );
    node.data.apply_patch("t", node.kind, &patch).unwrap();

    let columns = &node.data.columns;
    assert_eq!(columns.len(), 3);
    assert!(columns[0].is_primary);
    assert_eq!(columns[1].column_type, ColumnType::Uuid);
    let reference = columns[1].reference().unwrap();
    assert_eq!((reference.table.as_str(), reference.column.as_str()), ("orgs", "id"));
    assert_eq!(columns[2].column_type, ColumnType::Text);
}

#[test]
fn test_malformed_columns_are_kept_verbatim() {
    let columns = json!([{"name": "id", "type": "uuid"}, {"type": "int"}]);
    let document = json!({
        "nodes": [{
            "id": "t", "type": "database", "position": {"x": 0.0, "y": 0.0},
            "data": {"label": "users", "columns": columns}
        }],
        "edges": []
    });

    let content = flowchart_api::models::Diagram::parse_export(&document.to_string()).unwrap();
    let node = &content.nodes[0];
    assert!(node.data.columns.is_empty());
    assert_eq!(serde_json::to_value(node).unwrap()["data"]["columns"], columns);
    assert_eq!(
        serde_json::to_value(&content).unwrap()["nodes"][0]["data"]["columns"],
        columns
    );

    // A well-formed replacement takes over from the raw entries.
    let mut node = node.clone();
    let mut patch = Map::new();
    patch.insert("columns".into(), json!([{"name": "id", "type": "uuid"}]));
    node.data.apply_patch("t", node.kind, &patch).unwrap();
    assert_eq!(node.data.columns.len(), 1);
    assert_eq!(
        serde_json::to_value(&node).unwrap()["data"]["columns"],
        json!([{"name": "id", "type": "uuid", "isPrimary": false, "isForeignKey": false}])
    );
}

#[test]
fn test_column_key_cycle() {
    let mut column = Column::new("user_id", ColumnType::Uuid);
    column.cycle_key();
    assert!(column.is_primary);
    column.cycle_key();
    assert!(column.is_foreign_key && !column.is_primary);
    column.references = Some("users.id".into());
    column.cycle_key();
    assert!(!column.is_primary && !column.is_foreign_key);
    assert!(column.references.is_none());
}

#[test]
fn test_lenient_column_types() {
    assert_eq!(ColumnType::parse_lenient(" BigInt "), ColumnType::Bigint);
    assert_eq!(ColumnType::parse_lenient("jsonb"), ColumnType::Jsonb);
    assert_eq!(ColumnType::parse_lenient("money"), ColumnType::Text);
    assert_eq!(ColumnType::Timestamp.as_str(), "timestamp");
}
