//! MCP protocol server for one logical connection.
//!
//! This module implements the MCP server lifecycle:
//!
//! 1. **Initialisation**: Capability negotiation and version agreement
//! 2. **Operation**: Tool calls and resource reads against the shared context
//! 3. **Closure**: The session transport closes the server on teardown
//!
//! A server does no I/O of its own. The session transport hands it parsed
//! envelopes and writes back whatever it returns.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedSender;

use crate::app::ItemStore;
use crate::mcp::error::McpError;
use crate::mcp::protocol::{
    Envelope, ErrorCode, IncomingMessage, JsonRpcError, JsonRpcErrorData,
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, OutgoingMessage, OutgoingNotification,
    RequestId, MCP_PROTOCOL_VERSION, SUPPORTED_PROTOCOL_VERSIONS,
};
use crate::mcp::registry::ToolRegistry;

/// Channel on which a server emits notifications while a request runs.
pub type NotificationSink = UnboundedSender<OutgoingNotification>;

/// Server state in the MCP lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Waiting for initialize request.
    AwaitingInit,
    /// Ready for normal operation.
    Running,
    /// The owning session has been torn down.
    Closed,
}

/// Capability flags for one protocol primitive.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ListChangedCapability {
    /// Whether the list can change during the session.
    #[serde(rename = "listChanged")]
    pub list_changed: bool,
}

/// Server capabilities advertised during initialisation.
#[derive(Debug, Clone, Serialize)]
pub struct ServerCapabilities {
    /// Tool-related capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ListChangedCapability>,
    /// Resource-related capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ListChangedCapability>,
}

impl Default for ServerCapabilities {
    fn default() -> Self {
        Self {
            tools: Some(ListChangedCapability::default()),
            resources: Some(ListChangedCapability::default()),
        }
    }
}

/// Server information for initialisation response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

impl ServerInfo {
    /// Creates server information.
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

/// Client information received during initialisation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    /// Client name.
    pub name: String,
    /// Client version.
    #[serde(default)]
    pub version: Option<String>,
}

/// Parameters for the initialize request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol version requested by client.
    pub protocol_version: String,
    /// Client capabilities.
    #[serde(default)]
    pub capabilities: Value,
    /// Client information.
    #[serde(default)]
    pub client_info: Option<ClientInfo>,
}

/// Parameters for tools/call request.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallParams {
    /// Name of the tool to call.
    pub name: String,
    /// Arguments for the tool.
    #[serde(default)]
    pub arguments: Value,
}

/// Parameters for resources/read request.
#[derive(Debug, Clone, Deserialize)]
pub struct ReadResourceParams {
    /// URI of the resource to read.
    pub uri: String,
}

/// Everything a server needs that outlives a single connection.
///
/// One context is built at startup and shared by every session.
#[derive(Debug)]
pub struct ServerContext {
    /// Identity reported by `initialize`.
    pub info: ServerInfo,
    /// Tools and resources.
    pub registry: ToolRegistry,
    /// Process-wide item store.
    pub store: ItemStore,
}

impl ServerContext {
    /// Bundles the shared state.
    #[must_use]
    pub const fn new(info: ServerInfo, registry: ToolRegistry, store: ItemStore) -> Self {
        Self {
            info,
            registry,
            store,
        }
    }
}

/// The reply to one envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Reply {
    /// Answer to a single request.
    Single(OutgoingMessage),
    /// Answers to a batch, in request order.
    Batch(Vec<OutgoingMessage>),
}

impl Reply {
    /// Iterates over every message in the reply.
    pub fn messages(&self) -> impl Iterator<Item = &OutgoingMessage> {
        match self {
            Self::Single(msg) => std::slice::from_ref(msg).iter(),
            Self::Batch(msgs) => msgs.iter(),
        }
    }
}

/// The MCP server for one logical connection.
#[derive(Debug)]
pub struct McpServer {
    /// Current server state.
    state: ServerState,
    /// Shared registry, store, and identity.
    context: Arc<ServerContext>,
    /// Negotiated protocol version (set after initialisation).
    protocol_version: Option<String>,
}

impl McpServer {
    /// Creates a server awaiting `initialize`.
    #[must_use]
    pub const fn new(context: Arc<ServerContext>) -> Self {
        Self {
            state: ServerState::AwaitingInit,
            context,
            protocol_version: None,
        }
    }

    /// Returns the current server state.
    #[must_use]
    pub const fn state(&self) -> ServerState {
        self.state
    }

    /// Returns the protocol version agreed during initialisation.
    #[must_use]
    pub fn protocol_version(&self) -> Option<&str> {
        self.protocol_version.as_deref()
    }

    /// Moves the server to [`ServerState::Closed`]. Every later request fails.
    pub fn close(&mut self) {
        self.state = ServerState::Closed;
    }

    /// Handles every message of one envelope.
    ///
    /// Returns `None` when the envelope held no requests.
    pub async fn handle_envelope(
        &mut self,
        envelope: Envelope,
        notifications: Option<&NotificationSink>,
    ) -> Option<Reply> {
        match envelope {
            Envelope::Single(msg) => self.handle_message(msg, notifications).await.map(Reply::Single),
            Envelope::Batch(items) => {
                let mut replies = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Ok(msg) => {
                            if let Some(reply) = self.handle_message(msg, notifications).await {
                                replies.push(reply);
                            }
                        }
                        Err(error) => replies.push(OutgoingMessage::Error(error)),
                    }
                }
                if replies.is_empty() {
                    None
                } else {
                    Some(Reply::Batch(replies))
                }
            }
        }
    }

    /// Handles a parsed incoming message.
    pub async fn handle_message(
        &mut self,
        msg: IncomingMessage,
        notifications: Option<&NotificationSink>,
    ) -> Option<OutgoingMessage> {
        match msg {
            IncomingMessage::Request(req) => Some(self.handle_request(req, notifications).await),
            IncomingMessage::Notification(ref notif) => {
                self.handle_notification(notif);
                None
            }
            IncomingMessage::Response(_) => {
                tracing::debug!("Ignoring client response");
                None
            }
        }
    }

    /// Handles an incoming request.
    async fn handle_request(
        &mut self,
        req: JsonRpcRequest,
        notifications: Option<&NotificationSink>,
    ) -> OutgoingMessage {
        tracing::debug!(method = %req.method, id = %req.id, "Handling request");

        if self.state == ServerState::Closed {
            return OutgoingMessage::Error(McpError::ConnectionClosed.into_rpc_error(Some(req.id)));
        }

        let response = match req.method.as_str() {
            "initialize" => self.handle_initialize(&req),
            "ping" => Ok(Self::handle_ping(&req)),
            "tools/list" => self.handle_tools_list(&req),
            "tools/call" => self.handle_tools_call(&req, notifications).await,
            "resources/list" => self.handle_resources_list(&req),
            "resources/read" => self.handle_resources_read(&req),
            "resources/templates/list" => self.handle_resource_templates_list(&req),
            _ => Err(JsonRpcError::method_not_found(req.id.clone(), &req.method)),
        };

        response.into()
    }

    /// Handles an incoming notification.
    fn handle_notification(&self, notif: &JsonRpcNotification) {
        match notif.method.as_str() {
            "notifications/initialized" => {
                tracing::debug!(state = ?self.state, "Client finished initialisation");
            }
            other => tracing::debug!(method = other, "Ignoring notification"),
        }
    }

    /// Handles the initialize request.
    fn handle_initialize(&mut self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        if self.state != ServerState::AwaitingInit {
            return Err(JsonRpcError::new(
                Some(req.id.clone()),
                JsonRpcErrorData::with_message(
                    ErrorCode::InvalidRequest,
                    "Server already initialised",
                ),
            ));
        }

        let params: InitializeParams = Self::parse_params(req, "initialize")?;

        let negotiated_version = negotiate_version(&params.protocol_version);
        if let Some(client) = &params.client_info {
            tracing::info!(
                client = %client.name,
                client_version = client.version.as_deref().unwrap_or("unknown"),
                requested = %params.protocol_version,
                negotiated = negotiated_version,
                "Client initialised"
            );
        }

        self.protocol_version = Some(negotiated_version.to_string());
        self.state = ServerState::Running;

        let result = json!({
            "protocolVersion": negotiated_version,
            "capabilities": ServerCapabilities::default(),
            "serverInfo": self.context.info,
        });

        Ok(JsonRpcResponse::success(req.id.clone(), result))
    }

    /// Handles the tools/list request.
    fn handle_tools_list(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;

        let result = json!({
            "tools": self.context.registry.list_tools(),
        });

        Ok(JsonRpcResponse::success(req.id.clone(), result))
    }

    /// Handles the tools/call request.
    async fn handle_tools_call(
        &self,
        req: &JsonRpcRequest,
        notifications: Option<&NotificationSink>,
    ) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;

        let params: ToolCallParams = Self::parse_params(req, "tool call")?;

        let progress = notifications.zip(req.progress_token());
        if let Some((sink, token)) = progress {
            let message = format!("Calling {}", params.name);
            let _ = sink.send(OutgoingNotification::progress(token, 0, Some(1), Some(&message)));
        }

        let outcome = self
            .context
            .registry
            .invoke(&params.name, &params.arguments, &self.context.store)
            .await;

        if let Some((sink, token)) = progress {
            let _ = sink.send(OutgoingNotification::progress(token, 1, Some(1), None));
        }

        let result = outcome.map_err(|err| {
            tracing::debug!(tool = %params.name, error = %err, "Tool call failed");
            err.into_rpc_error(Some(req.id.clone()))
        })?;

        let result_value = serde_json::to_value(&result).map_err(|e| {
            tracing::error!(error = %e, "Failed to serialise tool call result");
            JsonRpcError::internal_error(req.id.clone(), "Internal error: failed to serialise result")
        })?;

        Ok(JsonRpcResponse::success(req.id.clone(), result_value))
    }

    /// Handles the resources/list request.
    fn handle_resources_list(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;

        let result = json!({
            "resources": self.context.registry.list_resources(),
        });

        Ok(JsonRpcResponse::success(req.id.clone(), result))
    }

    /// Handles the resources/read request.
    fn handle_resources_read(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;

        let params: ReadResourceParams = Self::parse_params(req, "resource read")?;

        let contents = self
            .context
            .registry
            .read_resource(&params.uri)
            .map_err(|err| {
                tracing::debug!(uri = %params.uri, error = %err, "Resource read failed");
                err.into_rpc_error(Some(req.id.clone()))
            })?;

        let result = json!({
            "contents": [contents],
        });

        Ok(JsonRpcResponse::success(req.id.clone(), result))
    }

    /// Handles the resources/templates/list request. No templates are registered.
    fn handle_resource_templates_list(
        &self,
        req: &JsonRpcRequest,
    ) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;
        Ok(JsonRpcResponse::success(
            req.id.clone(),
            json!({ "resourceTemplates": [] }),
        ))
    }

    /// Handles the ping request.
    fn handle_ping(req: &JsonRpcRequest) -> JsonRpcResponse {
        JsonRpcResponse::success(req.id.clone(), json!({}))
    }

    /// Ensures the server is in the Running state.
    fn require_running(&self, id: &RequestId) -> Result<(), JsonRpcError> {
        match self.state {
            ServerState::Running => Ok(()),
            ServerState::AwaitingInit => Err(McpError::NotInitialized.into_rpc_error(Some(id.clone()))),
            ServerState::Closed => Err(McpError::ConnectionClosed.into_rpc_error(Some(id.clone()))),
        }
    }

    /// Deserialises required request parameters.
    fn parse_params<T>(req: &JsonRpcRequest, what: &str) -> Result<T, JsonRpcError>
    where
        T: serde::de::DeserializeOwned,
    {
        req.params
            .as_ref()
            .map(|p| serde_json::from_value(p.clone()))
            .transpose()
            .map_err(|e| {
                JsonRpcError::invalid_params(req.id.clone(), format!("Invalid {what} params: {e}"))
            })?
            .ok_or_else(|| {
                JsonRpcError::invalid_params(req.id.clone(), format!("Missing {what} params"))
            })
    }
}

/// Echoes a supported requested version, otherwise offers the newest one.
#[must_use]
pub fn negotiate_version(requested: &str) -> &'static str {
    SUPPORTED_PROTOCOL_VERSIONS
        .iter()
        .find(|v| **v == requested)
        .copied()
        .unwrap_or(MCP_PROTOCOL_VERSION)
}
