//! Node variants, their attribute bags and default geometry.

use super::column::{Column, ColumnType};
use super::enums::{ShapeKind, TerminalKind};
use super::error::ModelError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Node variant. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Process,
    Decision,
    Terminal(TerminalKind),
    Shape(ShapeKind),
    StickyNote,
    Database,
}

/// Which attribute a variant's data bag is built around.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeSchema {
    Label,
    Columns,
}

/// Per-variant static facts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VariantDescriptor {
    pub type_tag: &'static str,
    pub schema: AttributeSchema,
    pub default_size: Size,
}

const DATABASE_WIDTH: f64 = 220.0;
const DATABASE_HEADER_HEIGHT: f64 = 36.0;
const DATABASE_ROW_HEIGHT: f64 = 30.0;

impl NodeKind {
    pub fn descriptor(self) -> VariantDescriptor {
        let (type_tag, schema, default_size) = match self {
            NodeKind::Process => ("process", AttributeSchema::Label, Size::new(160.0, 50.0)),
            NodeKind::Decision => ("decision", AttributeSchema::Label, Size::new(130.0, 130.0)),
            NodeKind::Terminal(_) => ("terminal", AttributeSchema::Label, Size::new(130.0, 44.0)),
            NodeKind::Shape(shape) => ("shape", AttributeSchema::Label, shape_default_size(shape)),
            NodeKind::StickyNote => (
                "stickyNote",
                AttributeSchema::Label,
                Size::new(180.0, 160.0),
            ),
            NodeKind::Database => (
                "database",
                AttributeSchema::Columns,
                Size::new(DATABASE_WIDTH, DATABASE_HEADER_HEIGHT),
            ),
        };
        VariantDescriptor {
            type_tag,
            schema,
            default_size,
        }
    }

    pub fn type_tag(self) -> &'static str {
        self.descriptor().type_tag
    }

    /// Human readable variant name used in error messages.
    pub fn describe(self) -> String {
        match self {
            NodeKind::Terminal(terminal) => format!("terminal/{}", terminal.as_tag()),
            NodeKind::Shape(shape) => format!("shape/{}", shape.as_tag()),
            other => other.type_tag().to_string(),
        }
    }

    /// Resolves a wire `type` tag plus its data bag into a variant.
    ///
    /// Unknown tags fall back to `process` so a generated diagram with an odd
    /// node type still renders.
    fn from_wire(type_tag: Option<&str>, data: &Map<String, Value>) -> Self {
        match type_tag {
            Some("decision") => NodeKind::Decision,
            Some("terminal") => {
                match data.get("terminalType").and_then(Value::as_str) {
                    Some("end") => NodeKind::Terminal(TerminalKind::End),
                    _ => NodeKind::Terminal(TerminalKind::Start),
                }
            }
            Some("input") => NodeKind::Terminal(TerminalKind::Start),
            Some("output") => NodeKind::Terminal(TerminalKind::End),
            Some("shape") => NodeKind::Shape(
                data.get("shape")
                    .and_then(Value::as_str)
                    .and_then(ShapeKind::from_tag)
                    .unwrap_or(ShapeKind::Square),
            ),
            Some("stickyNote") => NodeKind::StickyNote,
            Some("database") => NodeKind::Database,
            Some("process") => NodeKind::Process,
            other => {
                tracing::debug!("[Model] Unknown node type {:?}, rendering as process", other);
                NodeKind::Process
            }
        }
    }
}

fn shape_default_size(shape: ShapeKind) -> Size {
    match shape {
        ShapeKind::Square | ShapeKind::Parallelogram => Size::new(160.0, 80.0),
        ShapeKind::Circle => Size::new(90.0, 90.0),
        ShapeKind::Diamond => Size::new(130.0, 130.0),
        ShapeKind::Pill => Size::new(160.0, 60.0),
        ShapeKind::Hexagon => Size::new(160.0, 90.0),
        ShapeKind::Triangle => Size::new(130.0, 110.0),
        ShapeKind::Cylinder => Size::new(120.0, 110.0),
        ShapeKind::Star => Size::new(100.0, 100.0),
        ShapeKind::Cloud => Size::new(170.0, 100.0),
        ShapeKind::Document => Size::new(160.0, 100.0),
        ShapeKind::Pentagon => Size::new(110.0, 110.0),
        ShapeKind::ArrowRight | ShapeKind::ArrowLeft => Size::new(160.0, 80.0),
        ShapeKind::ArrowUp | ShapeKind::ArrowDown => Size::new(80.0, 120.0),
        ShapeKind::ArrowLeftRight => Size::new(180.0, 80.0),
    }
}

/// Attribute bag. Keys the model does not understand are kept in `extra`
/// and written back unchanged.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodeData {
    pub label: Option<String>,
    pub color: Option<String>,
    pub columns: Vec<Column>,
    pub extra: Map<String, Value>,
}

impl NodeData {
    pub fn labelled(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Self::default()
        }
    }

    fn from_wire(mut raw: Map<String, Value>) -> Self {
        raw.remove("terminalType");
        raw.remove("shape");

        let label = take_if(&mut raw, "label", |v| v.as_str().map(str::to_string));
        let color = take_if(&mut raw, "color", |v| v.as_str().map(str::to_string));
        let columns = take_if(&mut raw, "columns", |v| {
            serde_json::from_value::<Vec<Column>>(v.clone()).ok()
        })
        .unwrap_or_default();

        Self {
            label,
            color,
            columns,
            extra: raw,
        }
    }

    fn to_wire(&self, kind: NodeKind) -> Map<String, Value> {
        let mut data = self.extra.clone();
        if let Some(label) = &self.label {
            data.insert("label".to_string(), Value::String(label.clone()));
        }
        if let Some(color) = &self.color {
            data.insert("color".to_string(), Value::String(color.clone()));
        }
        // Columns that failed to parse stay in `extra` verbatim.
        if !self.extra.contains_key("columns")
            && (kind == NodeKind::Database || !self.columns.is_empty())
        {
            data.insert("columns".to_string(), json!(self.columns));
        }
        match kind {
            NodeKind::Terminal(terminal) => {
                data.insert("terminalType".to_string(), json!(terminal.as_tag()));
            }
            NodeKind::Shape(shape) => {
                data.insert("shape".to_string(), json!(shape.as_tag()));
            }
            _ => {}
        }
        data
    }

    /// Shallow-merges `patch` into the bag. A `null` value clears the key.
    pub fn apply_patch(
        &mut self,
        node_id: &str,
        kind: NodeKind,
        patch: &Map<String, Value>,
    ) -> Result<(), ModelError> {
        // Validate everything first so a rejected patch leaves no partial write.
        let mut next = self.clone();
        for (key, value) in patch {
            match key.as_str() {
                "label" => next.label = optional_string(node_id, key, value)?,
                "color" => next.color = optional_string(node_id, key, value)?,
                "columns" => {
                    next.extra.remove(key);
                    next.columns = if value.is_null() {
                        Vec::new()
                    } else {
                        serde_json::from_value(value.clone()).map_err(|_| {
                            ModelError::InvalidPatch {
                                node_id: node_id.to_string(),
                                field: key.clone(),
                            }
                        })?
                    };
                }
                "terminalType" | "shape" => {
                    let requested = value.as_str().unwrap_or_default();
                    let current = match kind {
                        NodeKind::Terminal(terminal) if key == "terminalType" => terminal.as_tag(),
                        NodeKind::Shape(shape) if key == "shape" => shape.as_tag(),
                        _ => "",
                    };
                    if requested != current {
                        return Err(ModelError::VariantChange {
                            node_id: node_id.to_string(),
                            current: kind.describe(),
                            requested: requested.to_string(),
                        });
                    }
                }
                _ => {
                    if value.is_null() {
                        next.extra.remove(key);
                    } else {
                        next.extra.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        *self = next;
        Ok(())
    }
}

fn take_if<T>(
    map: &mut Map<String, Value>,
    key: &str,
    parse: impl Fn(&Value) -> Option<T>,
) -> Option<T> {
    let parsed = map.get(key).and_then(&parse)?;
    map.remove(key);
    Some(parsed)
}

fn optional_string(node_id: &str, field: &str, value: &Value) -> Result<Option<String>, ModelError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        _ => Err(ModelError::InvalidPatch {
            node_id: node_id.to_string(),
            field: field.to_string(),
        }),
    }
}

/// A diagram node. Serialized in the canvas wire shape
/// `{id, type, position, width?, height?, data}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Node {
    pub id: String,
    pub kind: NodeKind,
    pub position: Position,
    pub size: Option<Size>,
    pub data: NodeData,
}

impl Node {
    pub fn new(id: impl Into<String>, kind: NodeKind, position: Position, data: NodeData) -> Self {
        Self {
            id: id.into(),
            kind,
            position,
            size: None,
            data,
        }
    }

    /// Width/height to draw with: the explicit size, else the variant default.
    pub fn geometry(&self) -> Size {
        if let Some(size) = self.size {
            return size;
        }
        let default_size = self.kind.descriptor().default_size;
        if self.kind == NodeKind::Database {
            let rows = self.data.columns.len() as f64;
            return Size::new(
                default_size.width,
                default_size.height + rows * DATABASE_ROW_HEIGHT,
            );
        }
        default_size
    }

    pub fn label(&self) -> Option<&str> {
        self.data.label.as_deref()
    }

    /// Places a node from an editor tool with that tool's default attributes.
    pub fn from_tool(tool: Tool, position: Position) -> Self {
        let id = format!("node-{}", Uuid::new_v4());
        let (kind, data) = tool.template();
        Self::new(id, kind, position, data)
    }

    pub fn to_value(&self) -> Value {
        let mut object = Map::new();
        object.insert("id".to_string(), Value::String(self.id.clone()));
        object.insert("type".to_string(), json!(self.kind.type_tag()));
        object.insert("position".to_string(), json!(self.position));
        if let Some(size) = self.size {
            object.insert("width".to_string(), json!(size.width));
            object.insert("height".to_string(), json!(size.height));
        }
        object.insert("data".to_string(), Value::Object(self.data.to_wire(self.kind)));
        Value::Object(object)
    }
}

impl TryFrom<Value> for Node {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Object(mut object) = value else {
            return Err("node entry is not an object".to_string());
        };

        let id = match object.remove("id") {
            Some(Value::String(s)) => s,
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        };
        let data = match object.remove("data") {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        let kind = NodeKind::from_wire(object.get("type").and_then(Value::as_str), &data);
        let position = object
            .remove("position")
            .and_then(|v| serde_json::from_value::<Position>(v).ok())
            .unwrap_or_default();
        let size = match (
            object.get("width").and_then(Value::as_f64),
            object.get("height").and_then(Value::as_f64),
        ) {
            (Some(width), Some(height)) => Some(Size::new(width, height)),
            _ => None,
        };

        Ok(Self {
            id,
            kind,
            position,
            size,
            data: NodeData::from_wire(data),
        })
    }
}

impl From<Node> for Value {
    fn from(node: Node) -> Self {
        node.to_value()
    }
}

/// Placement tools offered by the editor toolbar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Process,
    Decision,
    TerminalStart,
    TerminalEnd,
    StickyNote,
    Database,
    Shape(ShapeKind),
}

pub const STICKY_NOTE_COLOR: &str = "#fef08a";
pub const DEFAULT_SHAPE_COLOR: &str = "primary";

impl Tool {
    /// Parses toolbar names such as `process`, `terminal-end` or `shape-cloud`.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "process" => Some(Tool::Process),
            "decision" => Some(Tool::Decision),
            "terminal-start" => Some(Tool::TerminalStart),
            "terminal-end" => Some(Tool::TerminalEnd),
            "stickyNote" => Some(Tool::StickyNote),
            "database" => Some(Tool::Database),
            other => other
                .strip_prefix("shape-")
                .and_then(ShapeKind::from_tag)
                .map(Tool::Shape),
        }
    }

    fn template(self) -> (NodeKind, NodeData) {
        match self {
            Tool::Process => (NodeKind::Process, NodeData::labelled("Process")),
            Tool::Decision => (NodeKind::Decision, NodeData::labelled("Decision?")),
            Tool::TerminalStart => (
                NodeKind::Terminal(TerminalKind::Start),
                NodeData::labelled("Start"),
            ),
            Tool::TerminalEnd => (
                NodeKind::Terminal(TerminalKind::End),
                NodeData::labelled("End"),
            ),
            Tool::StickyNote => (
                NodeKind::StickyNote,
                NodeData {
                    color: Some(STICKY_NOTE_COLOR.to_string()),
                    ..NodeData::labelled("Note...")
                },
            ),
            Tool::Database => (
                NodeKind::Database,
                NodeData {
                    columns: vec![
                        Column::new("id", ColumnType::Uuid).primary(),
                        Column::new("created_at", ColumnType::Timestamp),
                    ],
                    ..NodeData::labelled("table_name")
                },
            ),
            Tool::Shape(shape) => (
                NodeKind::Shape(shape),
                NodeData {
                    color: Some(DEFAULT_SHAPE_COLOR.to_string()),
                    ..NodeData::labelled(shape.as_tag())
                },
            ),
        }
    }
}
