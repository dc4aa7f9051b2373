//! Document store trait and the caller capability it is checked against.

use super::StorageError;
use crate::models::Diagram;
use crate::models::enums::CollaboratorRole;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Authenticated user identity
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: Uuid,
    pub email: String,
}

/// A signed-in session: the identity plus the bearer token that proves it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSession {
    pub user: UserContext,
    pub access_token: String,
}

/// What the caller may do against the document store.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Capability {
    #[default]
    Anonymous,
    Authenticated(UserSession),
}

impl Capability {
    pub fn user(&self) -> Option<&UserContext> {
        match self {
            Capability::Anonymous => None,
            Capability::Authenticated(session) => Some(&session.user),
        }
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.user().map(|u| u.user_id)
    }

    pub fn access_token(&self) -> Option<&str> {
        match self {
            Capability::Anonymous => None,
            Capability::Authenticated(session) => Some(&session.access_token),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Capability::Authenticated(_))
    }

    /// User id, or `Unauthenticated`.
    pub fn require_user(&self) -> Result<Uuid, StorageError> {
        self.user_id().ok_or(StorageError::Unauthenticated)
    }
}

/// Result of a successful commit
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitReceipt {
    pub id: Uuid,
    pub committed_at: DateTime<Utc>,
}

/// One row of a document listing
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    pub id: Uuid,
    pub name: String,
    pub updated_at: DateTime<Utc>,
    pub role: CollaboratorRole,
    pub is_public: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collaborator {
    pub user_id: Uuid,
    pub role: CollaboratorRole,
    pub created_at: DateTime<Utc>,
}

/// Merges owned and shared listings: first entry per id wins, newest first.
pub fn merge_listing(
    owned: Vec<DocumentSummary>,
    shared: Vec<DocumentSummary>,
) -> Vec<DocumentSummary> {
    let mut merged: Vec<DocumentSummary> = Vec::with_capacity(owned.len() + shared.len());
    for summary in owned.into_iter().chain(shared) {
        if !merged.iter().any(|m| m.id == summary.id) {
            merged.push(summary);
        }
    }
    merged.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    merged
}

/// Rejects roles that cannot be granted through sharing.
pub fn grantable_role(role: CollaboratorRole) -> Result<CollaboratorRole, StorageError> {
    match role {
        CollaboratorRole::Owner => Err(StorageError::Other(
            "the owner role cannot be granted to a collaborator".to_string(),
        )),
        other => Ok(other),
    }
}

/// Authoritative document persistence.
///
/// Only the owner or an editor may write; only the owner may delete or
/// change visibility and collaborators. `fetch` of a public document
/// succeeds for anyone.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// `None` creates a new record and mints its id; `Some` updates in place.
    async fn commit(
        &self,
        id: Option<Uuid>,
        diagram: &Diagram,
        caller: &Capability,
    ) -> Result<CommitReceipt, StorageError>;

    /// Creates a record at most once per caller and `create_key`.
    ///
    /// Repeating the call with a key that already produced a record updates
    /// that record and returns its id, so a create whose response was lost
    /// can be retried safely.
    async fn create_once(
        &self,
        create_key: Uuid,
        diagram: &Diagram,
        caller: &Capability,
    ) -> Result<CommitReceipt, StorageError>;

    /// Missing and inaccessible records both yield `NotFound`.
    async fn fetch(&self, id: Uuid, caller: &Capability) -> Result<Diagram, StorageError>;

    async fn list(&self, caller: &Capability) -> Result<Vec<DocumentSummary>, StorageError>;

    async fn remove(&self, id: Uuid, caller: &Capability) -> Result<(), StorageError>;

    async fn is_public(&self, id: Uuid) -> Result<bool, StorageError>;

    async fn set_public(
        &self,
        id: Uuid,
        is_public: bool,
        caller: &Capability,
    ) -> Result<(), StorageError>;

    async fn collaborators(
        &self,
        id: Uuid,
        caller: &Capability,
    ) -> Result<Vec<Collaborator>, StorageError>;

    /// Upsert: re-adding an existing collaborator replaces the role.
    async fn add_collaborator(
        &self,
        id: Uuid,
        user_id: Uuid,
        role: CollaboratorRole,
        caller: &Capability,
    ) -> Result<(), StorageError>;

    async fn update_collaborator_role(
        &self,
        id: Uuid,
        user_id: Uuid,
        role: CollaboratorRole,
        caller: &Capability,
    ) -> Result<(), StorageError>;

    async fn remove_collaborator(
        &self,
        id: Uuid,
        user_id: Uuid,
        caller: &Capability,
    ) -> Result<(), StorageError>;
}
