//! The diagram aggregate and its mutation primitives.

use super::edge::Edge;
use super::error::ModelError;
use super::node::{Node, Position, Size};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use uuid::Uuid;

pub const DEFAULT_DIAGRAM_NAME: &str = "Untitled Flowchart";

fn default_name() -> String {
    DEFAULT_DIAGRAM_NAME.to_string()
}

/// Nodes and edges without metadata. This is the export format and the
/// payload of a wholesale replacement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiagramContent {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl DiagramContent {
    /// Structural check: `nodes` and `edges` must both be arrays of objects.
    /// Individual attributes are not validated.
    pub fn from_value(value: Value) -> Result<Self, ModelError> {
        let Value::Object(mut object) = value else {
            return Err(ModelError::InvalidDocument("expected a JSON object".to_string()));
        };
        let nodes = take_array(&mut object, "nodes")?;
        let edges = take_array(&mut object, "edges")?;
        let nodes = nodes
            .into_iter()
            .map(Node::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map_err(ModelError::InvalidDocument)?;
        let edges = edges
            .into_iter()
            .map(Edge::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map_err(ModelError::InvalidDocument)?;
        let mut content = Self { nodes, edges };
        content.fill_missing_ids();
        Ok(content)
    }

    /// Gives id-less elements a synthetic id so they can be addressed.
    pub fn fill_missing_ids(&mut self) {
        let mut taken: HashSet<String> = self
            .nodes
            .iter()
            .map(|n| n.id.clone())
            .chain(self.edges.iter().map(|e| e.id.clone()))
            .filter(|id| !id.is_empty())
            .collect();

        for (index, node) in self.nodes.iter_mut().enumerate() {
            if node.id.is_empty() {
                node.id = unique_id(&mut taken, format!("node-{}", index + 1));
            }
        }
        for (index, edge) in self.edges.iter_mut().enumerate() {
            if edge.id.is_empty() {
                let base = format!("edge-{}-{}-{}", edge.source, edge.target, index);
                edge.id = unique_id(&mut taken, base);
            }
        }
    }
}

fn take_array(object: &mut Map<String, Value>, key: &str) -> Result<Vec<Value>, ModelError> {
    match object.remove(key) {
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(ModelError::InvalidDocument(format!("'{key}' is not an array"))),
        None => Err(ModelError::InvalidDocument(format!("missing '{key}'"))),
    }
}

fn unique_id(taken: &mut HashSet<String>, base: String) -> String {
    let mut candidate = base.clone();
    let mut suffix = 1;
    while taken.contains(&candidate) {
        candidate = format!("{base}-{suffix}");
        suffix += 1;
    }
    taken.insert(candidate.clone());
    candidate
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagram {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    /// Time of the last successful remote commit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for Diagram {
    fn default() -> Self {
        Self {
            id: None,
            name: default_name(),
            nodes: Vec::new(),
            edges: Vec::new(),
            updated_at: None,
        }
    }
}

impl Diagram {
    pub fn blank() -> Self {
        Self::default()
    }

    pub fn with_content(name: impl Into<String>, content: DiagramContent) -> Self {
        Self {
            name: name.into(),
            nodes: content.nodes,
            edges: content.edges,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edges.iter().find(|e| e.id == id)
    }

    fn node_mut(&mut self, id: &str) -> Result<&mut Node, ModelError> {
        self.nodes
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| ModelError::UnknownNode(id.to_string()))
    }

    pub fn add_node(&mut self, node: Node) -> Result<(), ModelError> {
        if self.node(&node.id).is_some() {
            return Err(ModelError::DuplicateId(node.id));
        }
        self.nodes.push(node);
        Ok(())
    }

    pub fn update_node_data(&mut self, id: &str, patch: &Map<String, Value>) -> Result<(), ModelError> {
        let node = self.node_mut(id)?;
        let kind = node.kind;
        node.data.apply_patch(id, kind, patch)
    }

    pub fn move_node(&mut self, id: &str, position: Position) -> Result<(), ModelError> {
        self.node_mut(id)?.position = position;
        Ok(())
    }

    /// `None` restores the variant's default geometry.
    pub fn resize_node(&mut self, id: &str, size: Option<Size>) -> Result<(), ModelError> {
        self.node_mut(id)?.size = size;
        Ok(())
    }

    /// Removes the node and every edge attached to it. Returns the removed edges.
    pub fn delete_node(&mut self, id: &str) -> Result<Vec<Edge>, ModelError> {
        let index = self
            .nodes
            .iter()
            .position(|n| n.id == id)
            .ok_or_else(|| ModelError::UnknownNode(id.to_string()))?;
        self.nodes.remove(index);

        let (removed, kept): (Vec<Edge>, Vec<Edge>) =
            self.edges.drain(..).partition(|e| e.touches(id));
        self.edges = kept;
        Ok(removed)
    }

    /// Endpoints are not checked; dangling edges are filtered by readers.
    pub fn add_edge(&mut self, edge: Edge) -> Result<(), ModelError> {
        if self.edge(&edge.id).is_some() {
            return Err(ModelError::DuplicateId(edge.id));
        }
        self.edges.push(edge);
        Ok(())
    }

    pub fn relabel_edge(&mut self, id: &str, label: Option<String>) -> Result<(), ModelError> {
        let edge = self
            .edges
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| ModelError::UnknownEdge(id.to_string()))?;
        edge.label = label;
        Ok(())
    }

    pub fn delete_edge(&mut self, id: &str) -> Result<Edge, ModelError> {
        let index = self
            .edges
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| ModelError::UnknownEdge(id.to_string()))?;
        Ok(self.edges.remove(index))
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Swaps all nodes and edges in one step. Identity and name are kept.
    pub fn replace_content(&mut self, content: DiagramContent) {
        self.nodes = content.nodes;
        self.edges = content.edges;
    }

    pub fn content(&self) -> DiagramContent {
        DiagramContent {
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
        }
    }

    fn has_node(&self, id: &str) -> bool {
        self.nodes.iter().any(|n| n.id == id)
    }

    /// Edges whose endpoints both exist.
    pub fn valid_edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges
            .iter()
            .filter(|e| self.has_node(&e.source) && self.has_node(&e.target))
    }

    pub fn dangling_edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges
            .iter()
            .filter(|e| !self.has_node(&e.source) || !self.has_node(&e.target))
    }

    /// Serializes `{nodes, edges}` for download.
    pub fn export_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.content())
    }

    pub fn export_file_name(&self, unix_ms: i64) -> String {
        let base = if self.name.trim().is_empty() {
            "flowchart"
        } else {
            self.name.as_str()
        };
        format!("{base}-{unix_ms}.json")
    }

    pub fn parse_export(json: &str) -> Result<DiagramContent, ModelError> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| ModelError::InvalidDocument(e.to_string()))?;
        DiagramContent::from_value(value)
    }
}
