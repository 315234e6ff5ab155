//! Aggregated capability records and their index.
//!
//! Everything a server lists gets re-keyed under `(server_id, name|uri)` so
//! two servers can expose the same tool name without colliding. The index
//! is only ever mutated by the engine; readers get cloned snapshots.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use switchboard_mcp::{PromptArgument, PromptInfo, ResourceInfo, ResourceTemplateInfo, ToolInfo};

/// A tool offered by a connected server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedTool {
    /// Owning server.
    pub server_id: String,
    /// Tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool input.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
    /// Behavioral annotations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Value>,
}

/// A concrete resource offered by a connected server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedResource {
    /// Owning server.
    pub server_id: String,
    /// Resource URI.
    pub uri: String,
    /// Display name.
    pub name: String,
    /// MIME type, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Size in bytes, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// A resource template offered by a connected server.
///
/// The template's name doubles as its id; the protocol has no separate
/// identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedResourceTemplate {
    /// Owning server.
    pub server_id: String,
    /// Template id (the template name).
    pub id: String,
    /// Template name.
    pub name: String,
    /// URI template with `{placeholder}` segments.
    pub uri_template: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A prompt offered by a connected server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedPrompt {
    /// Owning server.
    pub server_id: String,
    /// Prompt name.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Declared arguments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Vec<PromptArgument>>,
}

/// Composite key: `(server_id, entry key)`.
type Key = (String, String);

/// All aggregated capability state, owned by the engine.
///
/// `BTreeMap` keeps snapshots deterministically ordered by
/// `(server_id, key)`, which keeps event consumers and tests stable.
#[derive(Debug, Default)]
pub struct CapabilityIndex {
    tools: BTreeMap<Key, AggregatedTool>,
    resources: BTreeMap<Key, AggregatedResource>,
    templates: BTreeMap<Key, AggregatedResourceTemplate>,
    prompts: BTreeMap<Key, AggregatedPrompt>,
}

impl CapabilityIndex {
    /// Replace every entry for `server_id` with the given listings.
    pub fn replace_server(
        &mut self,
        server_id: &str,
        tools: Vec<ToolInfo>,
        resources: Vec<ResourceInfo>,
        templates: Vec<ResourceTemplateInfo>,
        prompts: Vec<PromptInfo>,
    ) {
        self.remove_server(server_id);

        for tool in tools {
            self.tools.insert(
                (server_id.to_string(), tool.name.clone()),
                AggregatedTool {
                    server_id: server_id.to_string(),
                    name: tool.name,
                    description: tool.description,
                    input_schema: tool.input_schema,
                    annotations: tool.annotations,
                },
            );
        }
        for resource in resources {
            self.resources.insert(
                (server_id.to_string(), resource.uri.clone()),
                AggregatedResource {
                    server_id: server_id.to_string(),
                    uri: resource.uri,
                    name: resource.name,
                    mime_type: resource.mime_type,
                    size: resource.size,
                },
            );
        }
        for template in templates {
            self.templates.insert(
                (server_id.to_string(), template.name.clone()),
                AggregatedResourceTemplate {
                    server_id: server_id.to_string(),
                    id: template.name.clone(),
                    name: template.name,
                    uri_template: template.uri_template,
                    description: template.description,
                },
            );
        }
        for prompt in prompts {
            self.prompts.insert(
                (server_id.to_string(), prompt.name.clone()),
                AggregatedPrompt {
                    server_id: server_id.to_string(),
                    name: prompt.name,
                    description: prompt.description,
                    arguments: prompt.arguments,
                },
            );
        }
    }

    /// Remove every entry owned by `server_id`.
    pub fn remove_server(&mut self, server_id: &str) {
        self.tools.retain(|(sid, _), _| sid != server_id);
        self.resources.retain(|(sid, _), _| sid != server_id);
        self.templates.retain(|(sid, _), _| sid != server_id);
        self.prompts.retain(|(sid, _), _| sid != server_id);
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.tools.clear();
        self.resources.clear();
        self.templates.clear();
        self.prompts.clear();
    }

    /// Snapshot of all aggregated tools.
    pub fn tools(&self) -> Vec<AggregatedTool> {
        self.tools.values().cloned().collect()
    }

    /// Snapshot of all aggregated resources.
    pub fn resources(&self) -> Vec<AggregatedResource> {
        self.resources.values().cloned().collect()
    }

    /// Snapshot of all aggregated resource templates.
    pub fn templates(&self) -> Vec<AggregatedResourceTemplate> {
        self.templates.values().cloned().collect()
    }

    /// Snapshot of all aggregated prompts.
    pub fn prompts(&self) -> Vec<AggregatedPrompt> {
        self.prompts.values().cloned().collect()
    }

    /// Total entry count across all four maps.
    pub fn len(&self) -> usize {
        self.tools.len() + self.resources.len() + self.templates.len() + self.prompts.len()
    }

    /// Whether the index holds nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
