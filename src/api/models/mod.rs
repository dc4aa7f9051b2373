// Models module - diagram aggregate, node variants, edges, columns and mutations

pub mod column;
pub mod diagram;
pub mod edge;
pub mod enums;
pub mod error;
pub mod mutation;
pub mod node;

pub use column::{Column, ColumnType};
pub use diagram::{DEFAULT_DIAGRAM_NAME, Diagram, DiagramContent};
pub use edge::{ConnectGesture, Edge};
pub use error::ModelError;
pub use mutation::DiagramMutation;
pub use node::{Node, NodeData, NodeKind, Position, Size, Tool};
