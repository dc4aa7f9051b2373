use super::error::ModelError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Anchor tags understood by the canvas. Never validated against geometry.
pub mod handles {
    pub const TOP: &str = "t";
    pub const BOTTOM: &str = "b";
    pub const LEFT: &str = "l";
    pub const RIGHT: &str = "r";
    pub const YES: &str = "yes";
    pub const NO: &str = "no";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub source_handle: Option<String>,
    pub target_handle: Option<String>,
    pub label: Option<String>,
    /// Presentational keys (`animated`, `style`, ...) carried through untouched.
    pub extra: Map<String, Value>,
}

impl Edge {
    pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            source_handle: None,
            target_handle: None,
            label: None,
            extra: Map::new(),
        }
    }

    pub fn with_handles(mut self, source_handle: &str, target_handle: &str) -> Self {
        self.source_handle = Some(source_handle.to_string());
        self.target_handle = Some(target_handle.to_string());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn touches(&self, node_id: &str) -> bool {
        self.source == node_id || self.target == node_id
    }

    pub fn to_value(&self) -> Value {
        let mut object = self.extra.clone();
        object.insert("id".to_string(), Value::String(self.id.clone()));
        object.insert("source".to_string(), Value::String(self.source.clone()));
        object.insert("target".to_string(), Value::String(self.target.clone()));
        if let Some(handle) = &self.source_handle {
            object.insert("sourceHandle".to_string(), Value::String(handle.clone()));
        }
        if let Some(handle) = &self.target_handle {
            object.insert("targetHandle".to_string(), Value::String(handle.clone()));
        }
        if let Some(label) = &self.label {
            object.insert("label".to_string(), Value::String(label.clone()));
        }
        Value::Object(object)
    }
}

fn id_like(value: Option<Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn string_field(object: &mut Map<String, Value>, key: &str) -> Option<String> {
    match object.get(key) {
        Some(Value::String(s)) => {
            let s = s.clone();
            object.remove(key);
            Some(s)
        }
        Some(Value::Null) => {
            object.remove(key);
            None
        }
        _ => None,
    }
}

impl TryFrom<Value> for Edge {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Object(mut object) = value else {
            return Err("edge entry is not an object".to_string());
        };
        let id = id_like(object.remove("id")).unwrap_or_default();
        let source = id_like(object.remove("source")).unwrap_or_default();
        let target = id_like(object.remove("target")).unwrap_or_default();
        let source_handle = string_field(&mut object, "sourceHandle");
        let target_handle = string_field(&mut object, "targetHandle");
        let label = string_field(&mut object, "label");
        Ok(Self {
            id,
            source,
            target,
            source_handle,
            target_handle,
            label,
            extra: object,
        })
    }
}

impl From<Edge> for Value {
    fn from(edge: Edge) -> Self {
        edge.to_value()
    }
}

/// Pointer gesture reported by the canvas when the user drags between nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectGesture {
    pub source: Option<String>,
    pub target: Option<String>,
    pub source_handle: Option<String>,
    pub target_handle: Option<String>,
}

impl ConnectGesture {
    pub fn between(source: &str, source_handle: &str, target: &str, target_handle: &str) -> Self {
        Self {
            source: Some(source.to_string()),
            target: Some(target.to_string()),
            source_handle: Some(source_handle.to_string()),
            target_handle: Some(target_handle.to_string()),
        }
    }

    /// Turns the gesture into an edge. Anything short of both endpoints and
    /// both handles is a drag, not a connection.
    pub fn into_edge(self) -> Result<Edge, ModelError> {
        match self {
            ConnectGesture {
                source: Some(source),
                target: Some(target),
                source_handle: Some(source_handle),
                target_handle: Some(target_handle),
            } if !source.is_empty() && !target.is_empty() => Ok(Edge {
                id: format!("edge-{}", Uuid::new_v4()),
                source,
                target,
                source_handle: Some(source_handle),
                target_handle: Some(target_handle),
                label: None,
                extra: Map::new(),
            }),
            _ => Err(ModelError::AmbiguousGesture),
        }
    }
}
