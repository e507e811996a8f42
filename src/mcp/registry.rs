//! Tool and resource registry.
//!
//! The registry owns the catalogue the Protocol Server exposes: tools keyed by
//! name and resources keyed by URI, both kept in registration order. Tools are
//! a closed set of [`ItemTool`] variants; arguments are checked against the
//! declared [`InputSchema`] before a handler is dispatched.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::app::{ItemStore, ItemTool, ToolError};
use crate::mcp::error::McpError;
use crate::mcp::schema::InputSchema;

/// Errors raised while building the registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A tool with this name is already registered.
    #[error("tool already registered: {0}")]
    DuplicateTool(String),

    /// A resource with this URI is already registered.
    #[error("resource already registered: {0}")]
    DuplicateResource(String),
}

/// Content item in a tool call response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
}

/// Result of a successful tool call.
///
/// Both the human-readable content and the structured payload are always
/// present; failures never produce a `ToolResult`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    /// Content shown to the agent.
    pub content: Vec<ToolContent>,
    /// Payload the widget renders.
    pub structured_content: Value,
}

impl ToolResult {
    /// Creates a result with one text block.
    #[must_use]
    pub fn text(text: impl Into<String>, structured_content: Value) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            structured_content,
        }
    }

    /// Returns the first text block, if any.
    #[must_use]
    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(|block| match block {
            ToolContent::Text { text } => Some(text.as_str()),
        })
    }
}

/// A registered tool.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    /// Unique tool name.
    pub name: String,
    /// Human-readable title.
    pub title: Option<String>,
    /// Description shown to the agent.
    pub description: Option<String>,
    /// Accepted arguments.
    pub input_schema: InputSchema,
    /// Host-specific output annotations, passed through as `_meta`.
    pub meta: Option<Value>,
    /// Handler variant.
    pub handler: ItemTool,
}

impl ToolDescriptor {
    /// Returns the public metadata listed by `tools/list`.
    #[must_use]
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema.to_json_schema(),
            meta: self.meta.clone(),
        }
    }
}

/// A tool definition for tools/list response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: Value,
    /// Output annotations.
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

/// Where a resource's content comes from.
#[derive(Debug, Clone)]
pub enum ResourceProvider {
    /// Text fixed for the lifetime of the process.
    Text(Arc<str>),
}

impl ResourceProvider {
    fn produce(&self) -> Result<String, &'static str> {
        match self {
            Self::Text(text) if text.is_empty() => Err("resource has no content"),
            Self::Text(text) => Ok(text.to_string()),
        }
    }
}

/// A registered resource.
#[derive(Debug, Clone)]
pub struct ResourceDescriptor {
    /// Unique URI.
    pub uri: String,
    /// Short name.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// MIME type of the content.
    pub mime_type: String,
    /// Presentation hints, passed through as `_meta`.
    pub meta: Option<Value>,
    /// Content source.
    pub provider: ResourceProvider,
}

/// A resource definition for resources/list response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDefinition {
    /// Unique URI.
    pub uri: String,
    /// Short name.
    pub name: String,
    /// Optional description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// MIME type of the content.
    pub mime_type: String,
    /// Presentation hints.
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

/// One content entry of a resources/read response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContents {
    /// URI that was read.
    pub uri: String,
    /// MIME type of the content.
    pub mime_type: String,
    /// The content.
    pub text: String,
    /// Presentation hints.
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

/// Tools and resources exposed to the agent host.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: IndexMap<String, ToolDescriptor>,
    resources: IndexMap<String, ResourceDescriptor>,
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateTool`] if the name is taken.
    pub fn register(&mut self, descriptor: ToolDescriptor) -> Result<(), RegistryError> {
        if self.tools.contains_key(&descriptor.name) {
            return Err(RegistryError::DuplicateTool(descriptor.name));
        }
        self.tools.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    /// Registers a resource.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateResource`] if the URI is taken.
    pub fn register_resource(
        &mut self,
        descriptor: ResourceDescriptor,
    ) -> Result<(), RegistryError> {
        if self.resources.contains_key(&descriptor.uri) {
            return Err(RegistryError::DuplicateResource(descriptor.uri));
        }
        self.resources.insert(descriptor.uri.clone(), descriptor);
        Ok(())
    }

    /// Lists every tool in registration order.
    #[must_use]
    pub fn list_tools(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(ToolDescriptor::definition).collect()
    }

    /// Lists every resource in registration order.
    #[must_use]
    pub fn list_resources(&self) -> Vec<ResourceDefinition> {
        self.resources
            .values()
            .map(|r| ResourceDefinition {
                uri: r.uri.clone(),
                name: r.name.clone(),
                description: r.description.clone(),
                mime_type: r.mime_type.clone(),
                meta: r.meta.clone(),
            })
            .collect()
    }

    /// Validates arguments and runs the named tool against the store.
    ///
    /// The handler runs on its own task: it completes even if the caller
    /// stops waiting, and a panic inside it is reported as a handler error.
    ///
    /// # Errors
    ///
    /// - [`McpError::UnknownTool`] if no tool has this name
    /// - [`McpError::Validation`] if the arguments fail the schema or the
    ///   handler rejects an argument
    /// - [`McpError::Handler`] if the handler fails or panics
    pub async fn invoke(
        &self,
        name: &str,
        args: &Value,
        store: &ItemStore,
    ) -> Result<ToolResult, McpError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| McpError::UnknownTool(name.to_string()))?;

        let args = tool
            .input_schema
            .validate(args)
            .map_err(|fields| McpError::Validation {
                tool: tool.name.clone(),
                fields,
            })?;

        let handler = tool.handler;
        let store = store.clone();
        let outcome = tokio::spawn(async move { handler.run(args, &store).await }).await;

        match outcome {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(ToolError::InvalidArgument(field))) => Err(McpError::Validation {
                tool: tool.name.clone(),
                fields: vec![field],
            }),
            Ok(Err(err)) => {
                tracing::warn!(tool = %tool.name, error = %err, "Tool handler failed");
                Err(McpError::handler(&tool.name, &err))
            }
            Err(join_err) => {
                tracing::error!(tool = %tool.name, error = %join_err, "Tool handler panicked");
                Err(McpError::handler(&tool.name, &join_err))
            }
        }
    }

    /// Produces fresh content for the resource at `uri`.
    ///
    /// # Errors
    ///
    /// - [`McpError::UnknownResource`] if the URI is not registered
    /// - [`McpError::Resource`] if the provider cannot produce content
    pub fn read_resource(&self, uri: &str) -> Result<ResourceContents, McpError> {
        let resource = self
            .resources
            .get(uri)
            .ok_or_else(|| McpError::UnknownResource(uri.to_string()))?;

        let text = resource.provider.produce().map_err(|message| McpError::Resource {
            uri: uri.to_string(),
            message: message.to_string(),
        })?;

        Ok(ResourceContents {
            uri: resource.uri.clone(),
            mime_type: resource.mime_type.clone(),
            text,
            meta: resource.meta.clone(),
        })
    }

    /// Number of registered tools.
    #[must_use]
    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    /// Number of registered resources.
    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }
}
