//! In-process document store.
//!
//! Used by the server when no `DATABASE_URL` is configured and by tests.
//! Applies the same ownership and role rules as the PostgreSQL backend.

use super::{StorageError, traits::*};
use crate::models::Diagram;
use crate::models::enums::CollaboratorRole;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct StoredDocument {
    owner_id: Uuid,
    create_key: Option<Uuid>,
    diagram: Diagram,
    is_public: bool,
    updated_at: DateTime<Utc>,
    collaborators: HashMap<Uuid, Collaborator>,
}

impl StoredDocument {
    fn role_of(&self, user_id: Option<Uuid>) -> Option<CollaboratorRole> {
        let user_id = user_id?;
        if user_id == self.owner_id {
            return Some(CollaboratorRole::Owner);
        }
        self.collaborators.get(&user_id).map(|c| c.role)
    }

    fn summary(&self, id: Uuid, role: CollaboratorRole) -> DocumentSummary {
        DocumentSummary {
            id,
            name: self.diagram.name.clone(),
            updated_at: self.updated_at,
            role,
            is_public: self.is_public,
        }
    }
}

#[derive(Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<HashMap<Uuid, StoredDocument>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn document_count(&self) -> usize {
        self.documents.read().await.len()
    }

    fn insert(
        documents: &mut HashMap<Uuid, StoredDocument>,
        owner_id: Uuid,
        create_key: Option<Uuid>,
        diagram: &Diagram,
        now: DateTime<Utc>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        documents.insert(
            id,
            StoredDocument {
                owner_id,
                create_key,
                diagram: stored_copy(diagram, id, now),
                is_public: false,
                updated_at: now,
                collaborators: HashMap::new(),
            },
        );
        tracing::debug!("[Store] Created document {} for {}", id, owner_id);
        id
    }

    /// Owner-only gate. Callers without any access see `NotFound`.
    fn require_owner(
        document: Option<&StoredDocument>,
        id: Uuid,
        caller: &Capability,
    ) -> Result<(), StorageError> {
        let user_id = caller.require_user()?;
        let document = document.ok_or_else(|| StorageError::not_found(id))?;
        match document.role_of(Some(user_id)) {
            Some(CollaboratorRole::Owner) => Ok(()),
            Some(_) => Err(StorageError::Forbidden(
                "only the owner may change this document".to_string(),
            )),
            None => Err(StorageError::not_found(id)),
        }
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn commit(
        &self,
        id: Option<Uuid>,
        diagram: &Diagram,
        caller: &Capability,
    ) -> Result<CommitReceipt, StorageError> {
        let user_id = caller.require_user()?;
        let now = Utc::now();
        let mut documents = self.documents.write().await;

        let id = match id {
            Some(id) => {
                let document = documents
                    .get_mut(&id)
                    .ok_or_else(|| StorageError::not_found(id))?;
                match document.role_of(Some(user_id)) {
                    Some(role) if role.can_write() => {}
                    Some(_) => {
                        return Err(StorageError::Forbidden(
                            "viewers cannot modify this document".to_string(),
                        ));
                    }
                    None => return Err(StorageError::not_found(id)),
                }
                document.diagram = stored_copy(diagram, id, now);
                document.updated_at = now;
                id
            }
            None => Self::insert(&mut documents, user_id, None, diagram, now),
        };

        Ok(CommitReceipt {
            id,
            committed_at: now,
        })
    }

    async fn create_once(
        &self,
        create_key: Uuid,
        diagram: &Diagram,
        caller: &Capability,
    ) -> Result<CommitReceipt, StorageError> {
        let user_id = caller.require_user()?;
        let now = Utc::now();
        let mut documents = self.documents.write().await;

        let existing = documents
            .iter()
            .find(|(_, d)| d.owner_id == user_id && d.create_key == Some(create_key))
            .map(|(id, _)| *id);
        let id = match existing {
            Some(id) => {
                if let Some(document) = documents.get_mut(&id) {
                    document.diagram = stored_copy(diagram, id, now);
                    document.updated_at = now;
                }
                tracing::debug!("[Store] Create key {} already used by {}", create_key, id);
                id
            }
            None => Self::insert(&mut documents, user_id, Some(create_key), diagram, now),
        };

        Ok(CommitReceipt {
            id,
            committed_at: now,
        })
    }

    async fn fetch(&self, id: Uuid, caller: &Capability) -> Result<Diagram, StorageError> {
        let documents = self.documents.read().await;
        let document = documents
            .get(&id)
            .ok_or_else(|| StorageError::not_found(id))?;
        if document.is_public || document.role_of(caller.user_id()).is_some() {
            Ok(document.diagram.clone())
        } else {
            Err(StorageError::not_found(id))
        }
    }

    async fn list(&self, caller: &Capability) -> Result<Vec<DocumentSummary>, StorageError> {
        let user_id = caller.require_user()?;
        let documents = self.documents.read().await;
        let mut owned = Vec::new();
        let mut shared = Vec::new();
        for (id, document) in documents.iter() {
            match document.role_of(Some(user_id)) {
                Some(CollaboratorRole::Owner) => {
                    owned.push(document.summary(*id, CollaboratorRole::Owner))
                }
                Some(role) => shared.push(document.summary(*id, role)),
                None => {}
            }
        }
        Ok(merge_listing(owned, shared))
    }

    async fn remove(&self, id: Uuid, caller: &Capability) -> Result<(), StorageError> {
        let mut documents = self.documents.write().await;
        Self::require_owner(documents.get(&id), id, caller)?;
        documents.remove(&id);
        Ok(())
    }

    async fn is_public(&self, id: Uuid) -> Result<bool, StorageError> {
        Ok(self
            .documents
            .read()
            .await
            .get(&id)
            .map(|d| d.is_public)
            .unwrap_or(false))
    }

    async fn set_public(
        &self,
        id: Uuid,
        is_public: bool,
        caller: &Capability,
    ) -> Result<(), StorageError> {
        let mut documents = self.documents.write().await;
        Self::require_owner(documents.get(&id), id, caller)?;
        if let Some(document) = documents.get_mut(&id) {
            document.is_public = is_public;
        }
        Ok(())
    }

    async fn collaborators(
        &self,
        id: Uuid,
        caller: &Capability,
    ) -> Result<Vec<Collaborator>, StorageError> {
        let user_id = caller.require_user()?;
        let documents = self.documents.read().await;
        let document = documents
            .get(&id)
            .filter(|d| d.role_of(Some(user_id)).is_some())
            .ok_or_else(|| StorageError::not_found(id))?;
        let mut collaborators: Vec<Collaborator> =
            document.collaborators.values().cloned().collect();
        collaborators.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(collaborators)
    }

    async fn add_collaborator(
        &self,
        id: Uuid,
        user_id: Uuid,
        role: CollaboratorRole,
        caller: &Capability,
    ) -> Result<(), StorageError> {
        let role = grantable_role(role)?;
        let mut documents = self.documents.write().await;
        Self::require_owner(documents.get(&id), id, caller)?;
        if let Some(document) = documents.get_mut(&id) {
            document
                .collaborators
                .entry(user_id)
                .and_modify(|c| c.role = role)
                .or_insert_with(|| Collaborator {
                    user_id,
                    role,
                    created_at: Utc::now(),
                });
        }
        Ok(())
    }

    async fn update_collaborator_role(
        &self,
        id: Uuid,
        user_id: Uuid,
        role: CollaboratorRole,
        caller: &Capability,
    ) -> Result<(), StorageError> {
        let role = grantable_role(role)?;
        let mut documents = self.documents.write().await;
        Self::require_owner(documents.get(&id), id, caller)?;
        let collaborator = documents
            .get_mut(&id)
            .and_then(|d| d.collaborators.get_mut(&user_id))
            .ok_or_else(|| StorageError::not_found(user_id))?;
        collaborator.role = role;
        Ok(())
    }

    async fn remove_collaborator(
        &self,
        id: Uuid,
        user_id: Uuid,
        caller: &Capability,
    ) -> Result<(), StorageError> {
        let mut documents = self.documents.write().await;
        Self::require_owner(documents.get(&id), id, caller)?;
        if let Some(document) = documents.get_mut(&id) {
            document.collaborators.remove(&user_id);
        }
        Ok(())
    }
}

fn stored_copy(diagram: &Diagram, id: Uuid, now: DateTime<Utc>) -> Diagram {
    let mut copy = diagram.clone();
    copy.id = Some(id);
    copy.updated_at = Some(now);
    copy
}
