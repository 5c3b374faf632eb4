use serde::Serialize;
use tracing::instrument;

use super::{
    Assistant, AssistantCreate, AssistantParams, AssistantPatch, AssistantUpdate, ModelPreset,
    ServicesResponse,
};
use crate::client::Client;
use crate::error::Result;

#[derive(Serialize)]
struct SearchAssistantsRequest<'a> {
    graph_id: &'a str,
    limit: usize,
}

/// Assistants API client.
#[derive(Debug)]
pub struct AssistantsApi<'a> {
    client: &'a Client,
}

impl<'a> AssistantsApi<'a> {
    pub(crate) fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// All agents of the configured graph.
    pub async fn list(&self) -> Result<Vec<Assistant>> {
        let body = SearchAssistantsRequest {
            graph_id: self.client.graph_id(),
            limit: self.client.search_limit(),
        };
        self.client.post("/assistants/search", &body).await
    }

    pub async fn get(&self, assistant_id: &str) -> Result<Assistant> {
        self.client
            .get(&format!("/assistants/{assistant_id}"))
            .await
    }

    pub async fn create(&self, request: &AssistantCreate) -> Result<Assistant> {
        self.client.post("/assistants", request).await
    }

    /// Create an agent in the configured graph from flat settings.
    pub async fn create_from_params(&self, params: AssistantParams) -> Result<Assistant> {
        let (name, config) = params.into_config();
        let request = AssistantCreate {
            graph_id: self.client.graph_id().to_string(),
            name,
            config,
            metadata: None,
        };
        self.create(&request).await
    }

    pub async fn update(&self, assistant_id: &str, update: &AssistantUpdate) -> Result<Assistant> {
        self.client
            .patch(&format!("/assistants/{assistant_id}"), update)
            .await
    }

    /// Update from flat settings, keeping whatever the patch leaves unset.
    #[instrument(skip(self, patch))]
    pub async fn update_from_params(
        &self,
        assistant_id: &str,
        patch: AssistantPatch,
    ) -> Result<Assistant> {
        let current = self.get(assistant_id).await?;
        let update = patch.apply_to(&current.config.configurable);
        self.update(assistant_id, &update).await
    }

    pub async fn delete(&self, assistant_id: &str) -> Result<()> {
        self.client
            .delete_unit(&format!("/assistants/{assistant_id}"))
            .await
    }

    /// Model presets agents can be configured with.
    pub async fn presets(&self) -> Result<Vec<ModelPreset>> {
        self.client.get("/agents/presets").await
    }

    /// Names of the tool services agents can be granted.
    pub async fn services(&self) -> Result<Vec<String>> {
        let response: ServicesResponse = self.client.get("/agents/gumcp-services").await?;
        Ok(response.services)
    }
}
