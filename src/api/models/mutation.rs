use super::diagram::{Diagram, DiagramContent};
use super::edge::Edge;
use super::error::ModelError;
use super::node::{Node, Position, Size};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One applied change to a diagram. Also the descriptor broadcast to peers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DiagramMutation {
    #[serde(rename = "ADD_NODE")]
    AddNode { node: Node },
    #[serde(rename = "UPDATE_NODE_DATA")]
    UpdateNodeData { id: String, patch: Map<String, Value> },
    #[serde(rename = "MOVE_NODE")]
    MoveNode { id: String, position: Position },
    #[serde(rename = "RESIZE_NODE")]
    ResizeNode { id: String, size: Option<Size> },
    #[serde(rename = "DELETE_NODE")]
    DeleteNode { id: String },
    #[serde(rename = "ADD_EDGE")]
    AddEdge { edge: Edge },
    #[serde(rename = "RELABEL_EDGE")]
    RelabelEdge { id: String, label: Option<String> },
    #[serde(rename = "DELETE_EDGE")]
    DeleteEdge { id: String },
    #[serde(rename = "RENAME")]
    Rename { name: String },
    #[serde(rename = "REPLACE_ALL")]
    ReplaceAll { content: DiagramContent },
}

impl DiagramMutation {
    pub fn kind(&self) -> &'static str {
        match self {
            DiagramMutation::AddNode { .. } => "add_node",
            DiagramMutation::UpdateNodeData { .. } => "update_node_data",
            DiagramMutation::MoveNode { .. } => "move_node",
            DiagramMutation::ResizeNode { .. } => "resize_node",
            DiagramMutation::DeleteNode { .. } => "delete_node",
            DiagramMutation::AddEdge { .. } => "add_edge",
            DiagramMutation::RelabelEdge { .. } => "relabel_edge",
            DiagramMutation::DeleteEdge { .. } => "delete_edge",
            DiagramMutation::Rename { .. } => "rename",
            DiagramMutation::ReplaceAll { .. } => "replace_all",
        }
    }
}

impl Diagram {
    pub fn apply(&mut self, mutation: &DiagramMutation) -> Result<(), ModelError> {
        match mutation {
            DiagramMutation::AddNode { node } => self.add_node(node.clone()),
            DiagramMutation::UpdateNodeData { id, patch } => self.update_node_data(id, patch),
            DiagramMutation::MoveNode { id, position } => self.move_node(id, *position),
            DiagramMutation::ResizeNode { id, size } => self.resize_node(id, *size),
            DiagramMutation::DeleteNode { id } => self.delete_node(id).map(|_| ()),
            DiagramMutation::AddEdge { edge } => self.add_edge(edge.clone()),
            DiagramMutation::RelabelEdge { id, label } => self.relabel_edge(id, label.clone()),
            DiagramMutation::DeleteEdge { id } => self.delete_edge(id).map(|_| ()),
            DiagramMutation::Rename { name } => {
                self.rename(name.clone());
                Ok(())
            }
            DiagramMutation::ReplaceAll { content } => {
                self.replace_content(content.clone());
                Ok(())
            }
        }
    }
}
