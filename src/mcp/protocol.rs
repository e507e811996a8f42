//! JSON-RPC 2.0 envelopes as exchanged over the Streamable HTTP transport.
//!
//! One HTTP body decodes to an [`Envelope`]: either a lone message or a
//! batch. Each message is classified as follows:
//!
//! - carries `method` and `id`: a request, answered exactly once
//! - carries `method` only: a notification, never answered
//! - carries `id` with `result` or `error`: a client reply, ignored
//!
//! Request IDs are strings or integers. A `null` ID is rejected.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The newest MCP protocol version this implementation speaks.
pub const MCP_PROTOCOL_VERSION: &str = "2025-06-18";

/// Every protocol version accepted during negotiation, newest first.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26", "2024-11-05"];

/// Correlates a request with its reply. Echoed back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric request ID.
    Number(i64),
    /// String request ID.
    String(String),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

/// A call the server must answer.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    /// Must be "2.0".
    pub jsonrpc: String,

    /// Caller-chosen identifier.
    pub id: RequestId,

    /// The method to invoke.
    pub method: String,

    /// Method arguments, if the caller sent any.
    #[serde(default)]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Checks the version tag and method name.
    ///
    /// Returns the reason the request is malformed, or `None`.
    #[must_use]
    pub fn validate(&self) -> Option<&'static str> {
        if self.jsonrpc != "2.0" {
            return Some("jsonrpc field must be \"2.0\"");
        }
        if self.method.is_empty() {
            return Some("method field cannot be empty");
        }
        None
    }

    /// Returns the progress token the caller attached under `params._meta`, if any.
    #[must_use]
    pub fn progress_token(&self) -> Option<&Value> {
        self.params
            .as_ref()?
            .get("_meta")?
            .get("progressToken")
            .filter(|token| token.is_string() || token.is_number())
    }
}

/// A fire-and-forget message from the client.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcNotification {
    /// Must be "2.0".
    pub jsonrpc: String,

    /// Method name, e.g. `notifications/initialized`.
    pub method: String,

    /// Arguments, if any.
    #[serde(default)]
    pub params: Option<Value>,
}

/// A server-to-client notification, written as an SSE event ahead of the
/// reply it relates to.
#[derive(Debug, Clone, Serialize)]
pub struct OutgoingNotification {
    /// Always "2.0".
    pub jsonrpc: &'static str,

    /// Method name.
    pub method: String,

    /// Arguments, omitted when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl OutgoingNotification {
    /// Builds a notification for `method`.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.into(),
            params,
        }
    }

    /// Builds a `notifications/progress` message.
    ///
    /// The token is echoed exactly as the client supplied it (string or number).
    #[must_use]
    pub fn progress(
        progress_token: &Value,
        progress: u32,
        total: Option<u32>,
        message: Option<&str>,
    ) -> Self {
        let params = serde_json::json!({
            "progressToken": progress_token,
            "progress": progress,
            "total": total,
            "message": message,
        });
        Self::new("notifications/progress", Some(params))
    }
}

/// The `result` half of a reply.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    /// Always "2.0".
    pub jsonrpc: &'static str,

    /// ID of the answered request.
    pub id: RequestId,

    /// Method output.
    pub result: Value,
}

impl JsonRpcResponse {
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // not const with a Value field
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result,
        }
    }
}

/// JSON-RPC 2.0 error codes, standard and server-defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// The body is not JSON.
    ParseError,
    /// The JSON is not a well-formed message.
    InvalidRequest,
    /// No handler for the method.
    MethodNotFound,
    /// Arguments failed validation.
    InvalidParams,
    /// A handler failed while running.
    InternalError,
    /// A request other than `initialize` arrived before initialisation.
    NotInitialized,
    /// The session named by the request is unknown or has been torn down.
    SessionNotFound,
    /// The requested resource URI is not registered.
    ResourceNotFound,
    /// The connection has been closed.
    ConnectionClosed,
}

impl ErrorCode {
    /// Wire value of the code.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::NotInitialized => -32000,
            Self::SessionNotFound => -32001,
            Self::ResourceNotFound => -32002,
            Self::ConnectionClosed => -32003,
        }
    }

    /// Message used when no more specific one is given.
    #[must_use]
    pub const fn default_message(self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
            Self::NotInitialized => "Server not initialised",
            Self::SessionNotFound => "Session not found",
            Self::ResourceNotFound => "Resource not found",
            Self::ConnectionClosed => "Connection closed",
        }
    }
}

/// The `error` member of a failed reply.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcErrorData {
    /// The error code.
    pub code: i32,

    /// Human-readable summary.
    pub message: String,

    /// Structured detail, omitted when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcErrorData {
    /// Uses the code's default message.
    #[must_use]
    pub fn from_code(code: ErrorCode) -> Self {
        Self {
            code: code.code(),
            message: code.default_message().to_string(),
            data: None,
        }
    }

    /// Overrides the default message.
    #[must_use]
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    /// Attaches structured detail.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// The `error` half of a reply.
///
/// `id` is serialised as `null` when the request ID could not be determined,
/// as JSON-RPC 2.0 requires.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    /// Always "2.0".
    pub jsonrpc: &'static str,

    /// ID of the failed request, `None` if it could not be read.
    pub id: Option<RequestId>,

    /// The error details.
    pub error: JsonRpcErrorData,
}

impl JsonRpcError {
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // not const with a String field
    pub fn new(id: Option<RequestId>, error: JsonRpcErrorData) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            error,
        }
    }

    /// Reply to an undecodable body.
    #[must_use]
    pub fn parse_error() -> Self {
        Self::new(None, JsonRpcErrorData::from_code(ErrorCode::ParseError))
    }

    /// Reply to a structurally invalid message.
    #[must_use]
    pub fn invalid_request(id: Option<RequestId>) -> Self {
        Self::new(id, JsonRpcErrorData::from_code(ErrorCode::InvalidRequest))
    }

    /// Reply to an unknown method.
    #[must_use]
    pub fn method_not_found(id: RequestId, method: &str) -> Self {
        Self::new(
            Some(id),
            JsonRpcErrorData::with_message(
                ErrorCode::MethodNotFound,
                format!("Method not found: {method}"),
            ),
        )
    }

    /// Reply to arguments that do not fit the method.
    #[must_use]
    pub fn invalid_params(id: RequestId, message: impl Into<String>) -> Self {
        Self::new(
            Some(id),
            JsonRpcErrorData::with_message(ErrorCode::InvalidParams, message),
        )
    }

    /// Reply to a handler failure.
    #[must_use]
    pub fn internal_error(id: RequestId, message: impl Into<String>) -> Self {
        Self::new(
            Some(id),
            JsonRpcErrorData::with_message(ErrorCode::InternalError, message),
        )
    }
}

/// A message the server writes back for a single request.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum OutgoingMessage {
    /// The request succeeded.
    Response(JsonRpcResponse),
    /// The request failed.
    Error(JsonRpcError),
}

impl OutgoingMessage {
    /// Returns the ID of the request this message answers.
    #[must_use]
    pub const fn id(&self) -> Option<&RequestId> {
        match self {
            Self::Response(resp) => Some(&resp.id),
            Self::Error(err) => err.id.as_ref(),
        }
    }

    /// Returns the error payload if this is an error response.
    #[must_use]
    pub const fn error(&self) -> Option<&JsonRpcErrorData> {
        match self {
            Self::Response(_) => None,
            Self::Error(err) => Some(&err.error),
        }
    }

    /// Returns the result payload if this is a success response.
    #[must_use]
    pub const fn result(&self) -> Option<&Value> {
        match self {
            Self::Response(resp) => Some(&resp.result),
            Self::Error(_) => None,
        }
    }
}

impl From<Result<JsonRpcResponse, JsonRpcError>> for OutgoingMessage {
    fn from(result: Result<JsonRpcResponse, JsonRpcError>) -> Self {
        match result {
            Ok(resp) => Self::Response(resp),
            Err(err) => Self::Error(err),
        }
    }
}

/// An incoming message: a request, a notification, or a client's reply to a
/// server-initiated request.
#[derive(Debug, Clone)]
pub enum IncomingMessage {
    /// Has a method and an ID.
    Request(JsonRpcRequest),
    /// Has a method but no ID.
    Notification(JsonRpcNotification),
    /// A response sent by the client. The server issues no requests, so these
    /// are accepted and dropped.
    Response(Value),
}

impl IncomingMessage {
    /// The ID, for requests only.
    #[must_use]
    pub const fn id(&self) -> Option<&RequestId> {
        match self {
            Self::Request(req) => Some(&req.id),
            Self::Notification(_) | Self::Response(_) => None,
        }
    }

    /// Returns `true` if this message is an `initialize` request.
    #[must_use]
    pub fn is_initialize(&self) -> bool {
        matches!(self, Self::Request(req) if req.method == "initialize")
    }
}

/// The protocol envelope carried by one HTTP body.
#[derive(Debug, Clone)]
pub enum Envelope {
    /// A single JSON object.
    Single(IncomingMessage),
    /// A JSON array. Elements that failed to parse keep their error so it can
    /// be answered in place.
    Batch(Vec<Result<IncomingMessage, JsonRpcError>>),
}

impl Envelope {
    /// Iterates over every successfully parsed message.
    pub fn messages(&self) -> impl Iterator<Item = &IncomingMessage> {
        let items: Vec<&IncomingMessage> = match self {
            Self::Single(msg) => vec![msg],
            Self::Batch(items) => items.iter().filter_map(|item| item.as_ref().ok()).collect(),
        };
        items.into_iter()
    }

    /// Returns `true` if the envelope contains at least one request.
    pub fn has_requests(&self) -> bool {
        self.messages().any(|msg| msg.id().is_some())
    }

    /// Returns `true` if the envelope contains an `initialize` request.
    pub fn has_initialize(&self) -> bool {
        self.messages().any(IncomingMessage::is_initialize)
    }
}

/// Parses an HTTP body into a single message or a batch.
///
/// # Errors
///
/// Returns a parse error for malformed JSON, and an invalid request error for
/// an empty batch or a single object that is not a valid message.
pub fn parse_body(body: &[u8]) -> Result<Envelope, JsonRpcError> {
    let value: Value = serde_json::from_slice(body).map_err(|_| JsonRpcError::parse_error())?;

    match value {
        Value::Array(items) => {
            if items.is_empty() {
                return Err(JsonRpcError::invalid_request(None));
            }
            Ok(Envelope::Batch(items.into_iter().map(parse_value).collect()))
        }
        other => parse_value(other).map(Envelope::Single),
    }
}

/// Classifies an already-decoded JSON value as a message.
fn parse_value(value: Value) -> Result<IncomingMessage, JsonRpcError> {
    let obj = value.as_object().ok_or_else(|| JsonRpcError::invalid_request(None))?;

    if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
        return Err(JsonRpcError::invalid_request(None));
    }

    if !obj.contains_key("method") {
        // A client reply to a server-initiated request
        if obj.contains_key("id") && (obj.contains_key("result") || obj.contains_key("error")) {
            return Ok(IncomingMessage::Response(value));
        }
        return Err(JsonRpcError::invalid_request(None));
    }

    let malformed = |_| JsonRpcError::invalid_request(None);
    if !obj.contains_key("id") {
        return serde_json::from_value::<JsonRpcNotification>(value)
            .map(IncomingMessage::Notification)
            .map_err(malformed);
    }

    let request = serde_json::from_value::<JsonRpcRequest>(value).map_err(malformed)?;
    match request.validate() {
        Some(reason) => {
            tracing::debug!(id = %request.id, reason, "Rejected malformed request");
            Err(JsonRpcError::invalid_request(Some(request.id)))
        }
        None => Ok(IncomingMessage::Request(request)),
    }
}
