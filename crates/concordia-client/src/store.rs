//! Persisted-operation store over HTTP.
//!
//! - `POST /operations` stores an operation and answers `{ "id": ... }`
//! - `GET /operations/{id}` returns the stored descriptor
//! - `GET /operations/{id}/ancestry` returns `{ "ids": [...] }`, root first

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::debug;

use concordia_core::{
    FormArgs, OperationKind, OperationStore, PersistedId, PersistedOperation, Result,
};

use crate::client::{segment, ConcordiaClient};

#[derive(Serialize)]
struct EncodeRequest<'a> {
    kind: OperationKind,
    form_args: &'a FormArgs,
    #[serde(skip_serializing_if = "Option::is_none")]
    predecessor_id: Option<&'a PersistedId>,
}

#[derive(Deserialize)]
struct EncodeResponse {
    id: PersistedId,
}

#[derive(Deserialize)]
struct AncestryResponse {
    ids: Vec<PersistedId>,
}

#[async_trait]
impl OperationStore for ConcordiaClient {
    async fn encode(
        &self,
        kind: OperationKind,
        form_args: &FormArgs,
        predecessor: Option<&PersistedId>,
    ) -> Result<PersistedId> {
        let body = EncodeRequest {
            kind,
            form_args,
            predecessor_id: predecessor,
        };
        let response: EncodeResponse = self
            .send_json(
                self.request(Method::POST, "/operations").json(&body),
                "encode",
            )
            .await?;
        debug!(persisted_id = %response.id, kind = %kind, "Stored operation");
        Ok(response.id)
    }

    async fn decode(&self, id: &PersistedId) -> Result<PersistedOperation> {
        let path = format!("/operations/{}", segment(id.as_str()));
        self.send_json(self.request(Method::GET, &path), "decode")
            .await
    }

    async fn list_ancestry(&self, id: &PersistedId) -> Result<Vec<PersistedId>> {
        let path = format!("/operations/{}/ancestry", segment(id.as_str()));
        let response: AncestryResponse = self
            .send_json(self.request(Method::GET, &path), "list_ancestry")
            .await?;
        Ok(response.ids)
    }
}
