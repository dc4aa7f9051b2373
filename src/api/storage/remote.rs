//! Document store client for the `/api/v1/flows` REST surface.

use super::{StorageError, traits::*};
use crate::models::Diagram;
use crate::models::enums::CollaboratorRole;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use uuid::Uuid;

/// Header carrying the create key of a first save.
pub const IDEMPOTENCY_KEY: &str = "Idempotency-Key";

pub struct RemoteDocumentStore {
    client: Client,
    base_url: String,
}

impl RemoteDocumentStore {
    /// `base_url` is the server root, e.g. `http://localhost:8081`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/flows{}", self.base_url, path)
    }

    fn authorize(request: RequestBuilder, caller: &Capability) -> RequestBuilder {
        match caller.access_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(
        &self,
        request: RequestBuilder,
        caller: &Capability,
        document_id: impl ToString,
    ) -> Result<Response, StorageError> {
        let response = Self::authorize(request, caller)
            .send()
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let message = response
            .json::<Value>()
            .await
            .ok()
            .and_then(|body| body.get("error").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| status.to_string());
        Err(status_error(status, message, document_id.to_string()))
    }

    /// Sends a create or update. Transport failures surface as `CommitFailure`.
    async fn write(
        &self,
        request: RequestBuilder,
        diagram: &Diagram,
        caller: &Capability,
        id: Option<Uuid>,
    ) -> Result<CommitReceipt, StorageError> {
        // Anonymous callers are refused locally rather than round-tripping.
        caller.require_user()?;
        let response = self
            .send(
                request.json(&commit_body(diagram)),
                caller,
                id.map(|i| i.to_string()).unwrap_or_default(),
            )
            .await
            .map_err(|e| match e {
                StorageError::ConnectionError(msg) => StorageError::CommitFailure(msg),
                other => other,
            })?;
        Self::read(response).await
    }

    async fn read<T: DeserializeOwned>(response: Response) -> Result<T, StorageError> {
        response
            .json::<T>()
            .await
            .map_err(|e| StorageError::Other(format!("Invalid response body: {}", e)))
    }
}

fn status_error(status: StatusCode, message: String, document_id: String) -> StorageError {
    match status {
        StatusCode::UNAUTHORIZED => StorageError::Unauthenticated,
        StatusCode::FORBIDDEN => StorageError::Forbidden(message),
        StatusCode::NOT_FOUND => StorageError::NotFound { document_id },
        s if s.is_server_error() => StorageError::CommitFailure(message),
        _ => StorageError::Other(message),
    }
}

fn commit_body(diagram: &Diagram) -> Value {
    json!({
        "name": diagram.name,
        "nodes": diagram.nodes,
        "edges": diagram.edges,
    })
}

#[async_trait]
impl DocumentStore for RemoteDocumentStore {
    async fn commit(
        &self,
        id: Option<Uuid>,
        diagram: &Diagram,
        caller: &Capability,
    ) -> Result<CommitReceipt, StorageError> {
        let request = match id {
            Some(id) => self.client.put(self.url(&format!("/{}", id))),
            None => self.client.post(self.url("")),
        };
        self.write(request, diagram, caller, id).await
    }

    async fn create_once(
        &self,
        create_key: Uuid,
        diagram: &Diagram,
        caller: &Capability,
    ) -> Result<CommitReceipt, StorageError> {
        let request = self
            .client
            .post(self.url(""))
            .header(IDEMPOTENCY_KEY, create_key.to_string());
        self.write(request, diagram, caller, None).await
    }

    async fn fetch(&self, id: Uuid, caller: &Capability) -> Result<Diagram, StorageError> {
        let response = self
            .send(self.client.get(self.url(&format!("/{}", id))), caller, id)
            .await?;
        Self::read(response).await
    }

    async fn list(&self, caller: &Capability) -> Result<Vec<DocumentSummary>, StorageError> {
        caller.require_user()?;
        let response = self.send(self.client.get(self.url("")), caller, "").await?;
        Self::read(response).await
    }

    async fn remove(&self, id: Uuid, caller: &Capability) -> Result<(), StorageError> {
        self.send(self.client.delete(self.url(&format!("/{}", id))), caller, id)
            .await?;
        Ok(())
    }

    async fn is_public(&self, id: Uuid) -> Result<bool, StorageError> {
        let response = self
            .send(
                self.client.get(self.url(&format!("/{}/visibility", id))),
                &Capability::Anonymous,
                id,
            )
            .await;
        match response {
            Ok(response) => {
                let body: Value = Self::read(response).await?;
                Ok(body.get("isPublic").and_then(Value::as_bool).unwrap_or(false))
            }
            Err(StorageError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn set_public(
        &self,
        id: Uuid,
        is_public: bool,
        caller: &Capability,
    ) -> Result<(), StorageError> {
        let request = self
            .client
            .put(self.url(&format!("/{}/visibility", id)))
            .json(&json!({ "isPublic": is_public }));
        self.send(request, caller, id).await?;
        Ok(())
    }

    async fn collaborators(
        &self,
        id: Uuid,
        caller: &Capability,
    ) -> Result<Vec<Collaborator>, StorageError> {
        let response = self
            .send(
                self.client.get(self.url(&format!("/{}/collaborators", id))),
                caller,
                id,
            )
            .await?;
        Self::read(response).await
    }

    async fn add_collaborator(
        &self,
        id: Uuid,
        user_id: Uuid,
        role: CollaboratorRole,
        caller: &Capability,
    ) -> Result<(), StorageError> {
        let request = self
            .client
            .put(self.url(&format!("/{}/collaborators/{}", id, user_id)))
            .json(&json!({ "role": role }));
        self.send(request, caller, id).await?;
        Ok(())
    }

    async fn update_collaborator_role(
        &self,
        id: Uuid,
        user_id: Uuid,
        role: CollaboratorRole,
        caller: &Capability,
    ) -> Result<(), StorageError> {
        let request = self
            .client
            .patch(self.url(&format!("/{}/collaborators/{}", id, user_id)))
            .json(&json!({ "role": role }));
        self.send(request, caller, id).await?;
        Ok(())
    }

    async fn remove_collaborator(
        &self,
        id: Uuid,
        user_id: Uuid,
        caller: &Capability,
    ) -> Result<(), StorageError> {
        let request = self
            .client
            .delete(self.url(&format!("/{}/collaborators/{}", id, user_id)));
        self.send(request, caller, id).await?;
        Ok(())
    }
}
