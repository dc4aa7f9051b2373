//! Storage module for the API.
//!
//! Document store backends (in-memory, PostgreSQL, remote REST) and the
//! device-local draft cache.

pub mod error;
pub mod local_cache;
pub mod memory;
pub mod postgres;
pub mod remote;
pub mod traits;

pub use error::{CacheError, StorageError};
pub use local_cache::{Draft, LocalCache, MemoryLocalCache, SqliteLocalCache};
pub use memory::InMemoryDocumentStore;
pub use postgres::PostgresDocumentStore;
pub use remote::RemoteDocumentStore;
pub use traits::{
    Capability, Collaborator, CommitReceipt, DocumentStore, DocumentSummary, UserContext,
    UserSession,
};
