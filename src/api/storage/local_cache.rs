//! Device-local draft cache.
//!
//! Two well-known slots, not keyed by diagram: the last known document id
//! and the last known diagram payload. Only one diagram is mirrored at a time.

use super::error::CacheError;
use crate::models::{Diagram, Edge, Node};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use uuid::Uuid;

pub const POINTER_SLOT: &str = "flowchart-id";
pub const DRAFT_SLOT: &str = "flowchart-data";

/// Unsaved-work payload held in the draft slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub name: Option<String>,
    /// Key of a first save whose outcome was never confirmed.
    #[serde(default, rename = "createKey", skip_serializing_if = "Option::is_none")]
    pub create_key: Option<Uuid>,
}

impl Draft {
    pub fn from_diagram(diagram: &Diagram) -> Self {
        Self {
            nodes: diagram.nodes.clone(),
            edges: diagram.edges.clone(),
            name: Some(diagram.name.clone()),
            create_key: None,
        }
    }

    pub fn with_create_key(mut self, create_key: Option<Uuid>) -> Self {
        self.create_key = create_key;
        self
    }

    /// Rebuilds an id-less diagram from the draft.
    pub fn into_diagram(self) -> Diagram {
        let mut diagram = Diagram::blank();
        if let Some(name) = self.name {
            diagram.name = name;
        }
        diagram.nodes = self.nodes;
        diagram.edges = self.edges;
        diagram
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}

/// Raw slot storage plus the typed accessors built on it.
pub trait LocalCache: Send + Sync {
    fn read_slot(&self, slot: &str) -> Result<Option<String>, CacheError>;
    fn write_slot(&self, slot: &str, value: &str) -> Result<(), CacheError>;
    fn remove_slot(&self, slot: &str) -> Result<(), CacheError>;

    /// Pending document id left by an earlier session, verbatim.
    fn load_pointer(&self) -> Result<Option<String>, CacheError> {
        self.read_slot(POINTER_SLOT)
    }

    fn store_pointer(&self, id: Uuid) -> Result<(), CacheError> {
        self.write_slot(POINTER_SLOT, &id.to_string())
    }

    fn load_draft(&self) -> Result<Option<Draft>, CacheError> {
        match self.read_slot(DRAFT_SLOT)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn store_draft(&self, draft: &Draft) -> Result<(), CacheError> {
        let raw = serde_json::to_string(draft)?;
        self.write_slot(DRAFT_SLOT, &raw)
    }

    /// Clears both slots together.
    fn clear(&self) -> Result<(), CacheError> {
        self.remove_slot(POINTER_SLOT)?;
        self.remove_slot(DRAFT_SLOT)
    }
}

/// SQLite-backed cache that survives restarts.
pub struct SqliteLocalCache {
    conn: Mutex<Connection>,
}

impl SqliteLocalCache {
    pub fn open(db_path: &Path) -> Result<Self, CacheError> {
        let conn = Connection::open(db_path)?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self, CacheError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, CacheError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS local_slots (
                slot TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl LocalCache for SqliteLocalCache {
    fn read_slot(&self, slot: &str) -> Result<Option<String>, CacheError> {
        let conn = self.conn.lock();
        let value = conn
            .query_row(
                "SELECT value FROM local_slots WHERE slot = ?1",
                params![slot],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn write_slot(&self, slot: &str, value: &str) -> Result<(), CacheError> {
        self.conn.lock().execute(
            "INSERT INTO local_slots (slot, value, updated_at) VALUES (?1, ?2, CURRENT_TIMESTAMP)
             ON CONFLICT(slot) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
            params![slot, value],
        )?;
        Ok(())
    }

    fn remove_slot(&self, slot: &str) -> Result<(), CacheError> {
        self.conn
            .lock()
            .execute("DELETE FROM local_slots WHERE slot = ?1", params![slot])?;
        Ok(())
    }
}

/// Volatile cache for tests and sessions without a cache path.
#[derive(Default)]
pub struct MemoryLocalCache {
    slots: Mutex<HashMap<String, String>>,
}

impl MemoryLocalCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalCache for MemoryLocalCache {
    fn read_slot(&self, slot: &str) -> Result<Option<String>, CacheError> {
        Ok(self.slots.lock().get(slot).cloned())
    }

    fn write_slot(&self, slot: &str, value: &str) -> Result<(), CacheError> {
        self.slots.lock().insert(slot.to_string(), value.to_string());
        Ok(())
    }

    fn remove_slot(&self, slot: &str) -> Result<(), CacheError> {
        self.slots.lock().remove(slot);
        Ok(())
    }
}
