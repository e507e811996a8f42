//! Model Context Protocol (MCP) server implementation.
//!
//! This module implements the Model Context Protocol over the Streamable HTTP
//! transport using JSON-RPC 2.0 messages. Tools and resources come from the
//! [`registry`]; the [`crate::app`] module fills it.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                       HTTP gateway                            │
//! │                            │                                  │
//! │                            ▼                                  │
//! │   ┌─────────────┐    ┌─────────────┐    ┌─────────────┐       │
//! │   │  Transport  │───▶│  Sessions   │───▶│   Server    │       │
//! │   │ (JSON, SSE) │    │  (id table) │    │ (lifecycle) │       │
//! │   └─────────────┘    └─────────────┘    └─────────────┘       │
//! │                                                │              │
//! │                                                ▼              │
//! │                                         ┌─────────────┐       │
//! │                                         │  Registry   │       │
//! │                                         │(tools, res.)│       │
//! │                                         └─────────────┘       │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol Version
//!
//! This implementation targets MCP protocol version 2025-06-18 and accepts
//! 2025-03-26 and 2024-11-05 during negotiation.

pub mod error;
pub mod protocol;
pub mod registry;
pub mod schema;
pub mod server;
pub mod session;
pub mod transport;

pub use error::McpError;
pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, MCP_PROTOCOL_VERSION};
pub use registry::ToolRegistry;
pub use server::{McpServer, ServerContext, ServerInfo};
pub use session::SessionManager;
pub use transport::StreamableHttpTransport;
