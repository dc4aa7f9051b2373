// API module for the flowchart editor backend
pub mod api;

// Re-export api modules at crate root (so services can use crate::models, crate::storage)
pub use api::config;
pub use api::middleware;
pub use api::models;
pub use api::routes;
pub use api::services;
pub use api::storage;
