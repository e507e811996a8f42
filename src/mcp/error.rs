//! Error taxonomy at the protocol boundary.
//!
//! Every failure raised while serving a request ends up here and is converted
//! into a JSON-RPC error envelope. Nothing below the Protocol Server is
//! allowed to surface to the HTTP gateway as a raw fault.

use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::mcp::protocol::{ErrorCode, JsonRpcError, JsonRpcErrorData, RequestId};

/// A single argument that failed schema validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Argument name, or an empty string for the argument object itself.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl FieldError {
    /// Creates a field error.
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.field.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.field, self.message)
        }
    }
}

fn join_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors raised while serving a protocol request.
#[derive(Debug, Error)]
pub enum McpError {
    /// Tool arguments did not match the tool's input schema.
    #[error("Invalid arguments for tool {tool}: {}", join_fields(.fields))]
    Validation {
        /// Tool the arguments were meant for.
        tool: String,
        /// Per-field problems.
        fields: Vec<FieldError>,
    },

    /// No tool with this name is registered.
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// No resource with this URI is registered.
    #[error("Resource not found: {0}")]
    UnknownResource(String),

    /// The session id is unknown or has been torn down.
    #[error("Session not found: {0}")]
    UnknownSession(String),

    /// A request other than `initialize` arrived before initialisation.
    #[error("Server not initialised")]
    NotInitialized,

    /// The connection has been closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// A tool handler failed while running.
    #[error("Tool {tool} failed: {message}")]
    Handler {
        /// Tool whose handler failed.
        tool: String,
        /// Description of the underlying cause.
        message: String,
    },

    /// A resource provider failed while producing content.
    #[error("Failed to read resource {uri}: {message}")]
    Resource {
        /// URI of the resource.
        uri: String,
        /// Description of the underlying cause.
        message: String,
    },
}

impl McpError {
    /// Wraps a handler failure.
    #[must_use]
    pub fn handler(tool: impl Into<String>, cause: &impl std::fmt::Display) -> Self {
        Self::Handler {
            tool: tool.into(),
            message: cause.to_string(),
        }
    }

    /// Returns the stable JSON-RPC code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { .. } | Self::UnknownTool(_) => ErrorCode::InvalidParams,
            Self::UnknownResource(_) => ErrorCode::ResourceNotFound,
            Self::UnknownSession(_) => ErrorCode::SessionNotFound,
            Self::NotInitialized => ErrorCode::NotInitialized,
            Self::ConnectionClosed => ErrorCode::ConnectionClosed,
            Self::Handler { .. } | Self::Resource { .. } => ErrorCode::InternalError,
        }
    }

    /// Converts this error into the envelope answering request `id`.
    #[must_use]
    pub fn into_rpc_error(self, id: Option<RequestId>) -> JsonRpcError {
        let mut data = JsonRpcErrorData::with_message(self.code(), self.to_string());
        match &self {
            Self::Validation { fields, .. } => {
                data = data.with_data(json!({ "fields": fields }));
            }
            Self::UnknownResource(uri) => {
                data = data.with_data(json!({ "uri": uri }));
            }
            _ => {}
        }
        JsonRpcError::new(id, data)
    }
}
