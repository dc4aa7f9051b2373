//! PostgreSQL document store.
//!
//! Uses sqlx for database operations and implements the DocumentStore trait.
//! Schema lives in `migrations/`.

use super::{StorageError, traits::*};
use crate::models::Diagram;
use crate::models::enums::CollaboratorRole;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// PostgreSQL document store.
pub struct PostgresDocumentStore {
    pool: PgPool,
}

/// Caller's standing on one flow.
struct Access {
    is_public: bool,
    role: Option<CollaboratorRole>,
}

impl PostgresDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::ConnectionError(format!("Migration failed: {}", e)))
    }

    async fn access(&self, id: Uuid, user_id: Option<Uuid>) -> Result<Option<Access>, StorageError> {
        let row = sqlx::query(
            r#"
            SELECT f.owner_id, f.is_public, c.role
            FROM flows f
            LEFT JOIN flow_collaborators c ON c.flow_id = f.id AND c.user_id = $2
            WHERE f.id = $1
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let owner_id: Uuid = row.try_get("owner_id")?;
        let is_public: bool = row.try_get("is_public")?;
        let collaborator_role: Option<String> = row.try_get("role")?;

        let role = if user_id == Some(owner_id) {
            Some(CollaboratorRole::Owner)
        } else {
            collaborator_role.as_deref().and_then(CollaboratorRole::parse)
        };
        Ok(Some(Access { is_public, role }))
    }

    async fn require_owner(&self, id: Uuid, caller: &Capability) -> Result<(), StorageError> {
        let user_id = caller.require_user()?;
        match self.access(id, Some(user_id)).await? {
            Some(Access {
                role: Some(CollaboratorRole::Owner),
                ..
            }) => Ok(()),
            Some(Access { role: Some(_), .. }) => Err(StorageError::Forbidden(
                "only the owner may change this document".to_string(),
            )),
            _ => Err(StorageError::not_found(id)),
        }
    }

    async fn summaries(&self, sql: &str, user_id: Uuid) -> Result<Vec<DocumentSummary>, StorageError> {
        let rows = sqlx::query(sql).bind(user_id).fetch_all(&self.pool).await?;
        let mut summaries = Vec::with_capacity(rows.len());
        for row in rows {
            let role: String = row.try_get("role")?;
            summaries.push(DocumentSummary {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                updated_at: row.try_get("updated_at")?,
                role: CollaboratorRole::parse(&role).unwrap_or(CollaboratorRole::Viewer),
                is_public: row.try_get("is_public")?,
            });
        }
        Ok(summaries)
    }
}

fn flow_data(diagram: &Diagram) -> Result<Value, StorageError> {
    Ok(json!({
        "name": diagram.name,
        "nodes": serde_json::to_value(&diagram.nodes)
            .map_err(|e| StorageError::Other(e.to_string()))?,
        "edges": serde_json::to_value(&diagram.edges)
            .map_err(|e| StorageError::Other(e.to_string()))?,
    }))
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    async fn commit(
        &self,
        id: Option<Uuid>,
        diagram: &Diagram,
        caller: &Capability,
    ) -> Result<CommitReceipt, StorageError> {
        let user_id = caller.require_user()?;
        let payload = Json(flow_data(diagram)?);
        let now = Utc::now();

        let id = match id {
            Some(id) => {
                match self.access(id, Some(user_id)).await? {
                    Some(Access { role: Some(role), .. }) if role.can_write() => {}
                    Some(Access { role: Some(_), .. }) => {
                        return Err(StorageError::Forbidden(
                            "viewers cannot modify this document".to_string(),
                        ));
                    }
                    _ => return Err(StorageError::not_found(id)),
                }
                sqlx::query(
                    r#"
                    UPDATE flows SET name = $2, flow_data = $3, updated_at = $4
                    WHERE id = $1
                    "#,
                )
                .bind(id)
                .bind(&diagram.name)
                .bind(payload)
                .bind(now)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::CommitFailure(e.to_string()))?;
                id
            }
            None => {
                let id = Uuid::new_v4();
                sqlx::query(
                    r#"
                    INSERT INTO flows (id, owner_id, name, flow_data, is_public, created_at, updated_at)
                    VALUES ($1, $2, $3, $4, FALSE, $5, $5)
                    "#,
                )
                .bind(id)
                .bind(user_id)
                .bind(&diagram.name)
                .bind(payload)
                .bind(now)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::CommitFailure(e.to_string()))?;
                tracing::info!("[Store] Created flow {} for {}", id, user_id);
                id
            }
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
        let payload = Json(flow_data(diagram)?);
        let now = Utc::now();

        let row = sqlx::query(
            r#"
            INSERT INTO flows (id, owner_id, create_key, name, flow_data, is_public, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, FALSE, $6, $6)
            ON CONFLICT (owner_id, create_key) DO UPDATE
            SET name = EXCLUDED.name, flow_data = EXCLUDED.flow_data, updated_at = EXCLUDED.updated_at
            RETURNING id, (xmax = 0) AS inserted
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(create_key)
        .bind(&diagram.name)
        .bind(payload)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::CommitFailure(e.to_string()))?;

        let id: Uuid = row.try_get("id")?;
        let inserted: bool = row.try_get("inserted")?;
        if inserted {
            tracing::info!("[Store] Created flow {} for {}", id, user_id);
        } else {
            tracing::info!("[Store] Create key {} already used by flow {}", create_key, id);
        }
        Ok(CommitReceipt {
            id,
            committed_at: now,
        })
    }

    async fn fetch(&self, id: Uuid, caller: &Capability) -> Result<Diagram, StorageError> {
        match self.access(id, caller.user_id()).await? {
            Some(access) if access.is_public || access.role.is_some() => {}
            _ => return Err(StorageError::not_found(id)),
        }

        let row = sqlx::query("SELECT flow_data, updated_at FROM flows WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StorageError::not_found(id))?;
        let Json(data): Json<Value> = row.try_get("flow_data")?;
        let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

        let mut diagram: Diagram = serde_json::from_value(data)
            .map_err(|e| StorageError::Other(format!("Corrupt flow_data for {}: {}", id, e)))?;
        diagram.id = Some(id);
        diagram.updated_at = Some(updated_at);
        Ok(diagram)
    }

    async fn list(&self, caller: &Capability) -> Result<Vec<DocumentSummary>, StorageError> {
        let user_id = caller.require_user()?;
        let owned = self
            .summaries(
                r#"
                SELECT id, name, updated_at, is_public, 'owner' AS role
                FROM flows WHERE owner_id = $1
                "#,
                user_id,
            )
            .await?;
        let shared = self
            .summaries(
                r#"
                SELECT f.id, f.name, f.updated_at, f.is_public, c.role
                FROM flow_collaborators c
                JOIN flows f ON f.id = c.flow_id
                WHERE c.user_id = $1
                "#,
                user_id,
            )
            .await?;
        Ok(merge_listing(owned, shared))
    }

    async fn remove(&self, id: Uuid, caller: &Capability) -> Result<(), StorageError> {
        self.require_owner(id, caller).await?;
        sqlx::query("DELETE FROM flows WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn is_public(&self, id: Uuid) -> Result<bool, StorageError> {
        let row = sqlx::query("SELECT is_public FROM flows WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(row.try_get("is_public")?),
            None => Ok(false),
        }
    }

    async fn set_public(
        &self,
        id: Uuid,
        is_public: bool,
        caller: &Capability,
    ) -> Result<(), StorageError> {
        self.require_owner(id, caller).await?;
        sqlx::query("UPDATE flows SET is_public = $2 WHERE id = $1")
            .bind(id)
            .bind(is_public)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn collaborators(
        &self,
        id: Uuid,
        caller: &Capability,
    ) -> Result<Vec<Collaborator>, StorageError> {
        let user_id = caller.require_user()?;
        match self.access(id, Some(user_id)).await? {
            Some(Access { role: Some(_), .. }) => {}
            _ => return Err(StorageError::not_found(id)),
        }

        let rows = sqlx::query(
            r#"
            SELECT user_id, role, created_at FROM flow_collaborators
            WHERE flow_id = $1 ORDER BY created_at
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let mut collaborators = Vec::with_capacity(rows.len());
        for row in rows {
            let role: String = row.try_get("role")?;
            collaborators.push(Collaborator {
                user_id: row.try_get("user_id")?,
                role: CollaboratorRole::parse(&role).unwrap_or(CollaboratorRole::Viewer),
                created_at: row.try_get("created_at")?,
            });
        }
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
        self.require_owner(id, caller).await?;
        sqlx::query(
            r#"
            INSERT INTO flow_collaborators (flow_id, user_id, role, invited_by, created_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (flow_id, user_id) DO UPDATE SET role = EXCLUDED.role
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(role.as_str())
        .bind(caller.user_id())
        .execute(&self.pool)
        .await?;
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
        self.require_owner(id, caller).await?;
        let result = sqlx::query(
            "UPDATE flow_collaborators SET role = $3 WHERE flow_id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .bind(role.as_str())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::not_found(user_id));
        }
        Ok(())
    }

    async fn remove_collaborator(
        &self,
        id: Uuid,
        user_id: Uuid,
        caller: &Capability,
    ) -> Result<(), StorageError> {
        self.require_owner(id, caller).await?;
        sqlx::query("DELETE FROM flow_collaborators WHERE flow_id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
