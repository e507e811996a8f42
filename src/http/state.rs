//! Shared state for the gateway handlers.

use std::sync::Arc;

use crate::mcp::transport::StreamableHttpTransport;

/// Shared state accessible to all route handlers.
#[derive(Debug, Clone)]
pub struct GatewayState {
    transport: StreamableHttpTransport,
    mcp_path: Arc<str>,
}

impl GatewayState {
    /// Creates gateway state serving MCP at `mcp_path`.
    #[must_use]
    pub fn new(transport: StreamableHttpTransport, mcp_path: &str) -> Self {
        Self {
            transport,
            mcp_path: Arc::from(mcp_path),
        }
    }

    /// The Streamable HTTP transport.
    #[must_use]
    pub const fn transport(&self) -> &StreamableHttpTransport {
        &self.transport
    }

    /// Returns `true` for the MCP path itself or anything below it.
    #[must_use]
    pub fn is_mcp_path(&self, path: &str) -> bool {
        path.strip_prefix(&*self.mcp_path)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    }
}
