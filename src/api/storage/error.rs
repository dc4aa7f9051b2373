//! Storage error types for the document store and local cache.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Document store errors.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StorageError {
    /// No record, or no record this caller may read
    #[error("Document not found: {document_id}")]
    NotFound { document_id: String },
    /// Write attempted without a session; callers fall back to the local cache
    #[error("Authentication required")]
    Unauthenticated,
    /// Authenticated but lacking the required role
    #[error("Forbidden: {0}")]
    Forbidden(String),
    /// Network or store-side failure while persisting
    #[error("Commit failed: {0}")]
    CommitFailure(String),
    /// Database connection error
    #[error("Connection error: {0}")]
    ConnectionError(String),
    /// General storage error
    #[error("Storage error: {0}")]
    Other(String),
}

impl StorageError {
    pub fn not_found(document_id: impl ToString) -> Self {
        StorageError::NotFound {
            document_id: document_id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StorageError::not_found("row"),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StorageError::ConnectionError(err.to_string())
            }
            other => StorageError::Other(other.to_string()),
        }
    }
}

/// Local-only cache errors.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Local cache database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Local cache payload error: {0}")]
    Payload(#[from] serde_json::Error),
}
