//! Errors raised by Diagram Model mutations.

use thiserror::Error;

/// Mutation rejections.
///
/// `UnknownNode` and `UnknownEdge` describe stale references; the managed
/// diagram store treats them as no-ops since the element is already gone.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("Node not found: {0}")]
    UnknownNode(String),
    #[error("Edge not found: {0}")]
    UnknownEdge(String),
    #[error("Duplicate id: {0}")]
    DuplicateId(String),
    #[error("Node {node_id} is a {current} node and cannot become {requested}")]
    VariantChange {
        node_id: String,
        current: String,
        requested: String,
    },
    #[error("Invalid value for '{field}' on node {node_id}")]
    InvalidPatch { node_id: String, field: String },
    #[error("Ambiguous connect gesture: both source and target handles must be engaged")]
    AmbiguousGesture,
    #[error("Invalid diagram document: {0}")]
    InvalidDocument(String),
}

impl ModelError {
    /// True when the error only says the target element no longer exists.
    pub fn is_stale_reference(&self) -> bool {
        matches!(self, ModelError::UnknownNode(_) | ModelError::UnknownEdge(_))
    }
}
