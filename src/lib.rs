//! item-widget-mcp: Streamable-HTTP MCP server for an item list and its widget
//!
//! This library exposes a small in-memory application to AI agent hosts over
//! the Model Context Protocol, together with the HTML widget the host renders
//! next to tool results.
//!
//! # Architecture
//!
//! The core is the protocol layer. The item list is a placeholder domain:
//!
//! - **HTTP Gateway**: CORS preflight, liveness probe, MCP path routing
//! - **Session Transport**: `Mcp-Session-Id` sessions, JSON or SSE replies
//! - **Protocol Server**: Lifecycle and method dispatch per session
//! - **Tool Registry**: Schema-validated tools and URI-addressed resources
//!
//! The `get_items` and `add_item` tools read and append to one process-wide
//! store shared by every session.
//!
//! # Modules
//!
//! - [`app`]: Item store, tools, and widget asset
//! - [`config`]: Configuration loading and validation
//! - [`error`]: Startup error types
//! - [`http`]: HTTP gateway
//! - [`mcp`]: MCP protocol implementation

pub mod app;
pub mod config;
pub mod error;
pub mod http;
pub mod mcp;
