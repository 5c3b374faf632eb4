//! Custom agents, stored on the backend as LangGraph assistants.
//!
//! An agent is an assistant of graph [`DEFAULT_GRAPH_ID`](crate::client::DEFAULT_GRAPH_ID)
//! whose `config.configurable` picks a model preset, instructions, and the
//! flows and tool services it may call.

mod api;

pub use api::AssistantsApi;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Agent settings read by the custom graph at run time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantConfigurable {
    #[serde(default)]
    pub model_preset: String,
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub flow_tool_ids: Vec<String>,
    #[serde(default)]
    pub gumcp_services: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantConfig {
    #[serde(default)]
    pub configurable: AssistantConfigurable,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Assistant {
    pub assistant_id: String,
    pub graph_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub config: AssistantConfig,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub version: Option<u64>,
}

/// Body of `POST /assistants`.
#[derive(Debug, Clone, Serialize)]
pub struct AssistantCreate {
    pub graph_id: String,
    pub name: String,
    pub config: AssistantConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

/// Body of `PATCH /assistants/{id}`. Each update creates a new version.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AssistantUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<AssistantConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

/// Flat settings for a new agent.
#[derive(Debug, Clone, Default)]
pub struct AssistantParams {
    pub name: String,
    pub model_preset: String,
    pub instructions: String,
    pub flow_tool_ids: Vec<String>,
    pub gumcp_services: Vec<String>,
}

impl AssistantParams {
    pub fn into_config(self) -> (String, AssistantConfig) {
        let config = AssistantConfig {
            configurable: AssistantConfigurable {
                model_preset: self.model_preset,
                instructions: self.instructions,
                flow_tool_ids: self.flow_tool_ids,
                gumcp_services: self.gumcp_services,
            },
        };
        (self.name, config)
    }
}

/// Flat partial settings; unset fields keep the agent's current values.
#[derive(Debug, Clone, Default)]
pub struct AssistantPatch {
    pub name: Option<String>,
    pub model_preset: Option<String>,
    pub instructions: Option<String>,
    pub flow_tool_ids: Option<Vec<String>>,
    pub gumcp_services: Option<Vec<String>>,
}

impl AssistantPatch {
    /// Merge over the current configuration. The full `configurable` is always sent.
    pub fn apply_to(self, current: &AssistantConfigurable) -> AssistantUpdate {
        let configurable = AssistantConfigurable {
            model_preset: self
                .model_preset
                .unwrap_or_else(|| current.model_preset.clone()),
            instructions: self
                .instructions
                .unwrap_or_else(|| current.instructions.clone()),
            flow_tool_ids: self
                .flow_tool_ids
                .unwrap_or_else(|| current.flow_tool_ids.clone()),
            gumcp_services: self
                .gumcp_services
                .unwrap_or_else(|| current.gumcp_services.clone()),
        };
        AssistantUpdate {
            name: self.name,
            config: Some(AssistantConfig { configurable }),
            metadata: None,
        }
    }
}

/// A model choice offered by the backend (e.g. `claude-sonnet`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelPreset {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ModelPreset {
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ServicesResponse {
    #[serde(default)]
    pub services: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn patch_keeps_unset_fields() {
        let current = AssistantConfigurable {
            model_preset: "gpt-4o".to_string(),
            instructions: "be terse".to_string(),
            flow_tool_ids: vec!["f1".to_string()],
            gumcp_services: vec!["gmail".to_string()],
        };
        let update = AssistantPatch {
            instructions: Some("be thorough".to_string()),
            gumcp_services: Some(Vec::new()),
            ..AssistantPatch::default()
        }
        .apply_to(&current);

        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            json!({
                "config": {"configurable": {
                    "model_preset": "gpt-4o",
                    "instructions": "be thorough",
                    "flow_tool_ids": ["f1"],
                    "gumcp_services": []
                }}
            })
        );
    }

    #[test]
    fn assistant_without_tool_lists_defaults_them_to_empty() {
        let assistant: Assistant = serde_json::from_value(json!({
            "assistant_id": "a1",
            "graph_id": "custom_agent",
            "name": "Reporter",
            "config": {"configurable": {"model_preset": "claude-sonnet", "instructions": "hi"}},
            "version": 3
        }))
        .unwrap();
        assert!(assistant.config.configurable.flow_tool_ids.is_empty());
        assert_eq!(assistant.version, Some(3));
    }

    #[test]
    fn preset_label_falls_back_to_id() {
        let preset: ModelPreset =
            serde_json::from_value(json!({"id": "gemini-flash", "context_window": 1000000}))
                .unwrap();
        assert_eq!(preset.label(), "gemini-flash");
        assert!(preset.extra.contains_key("context_window"));
    }
}
