//! HTTP gateway.
//!
//! The single network-facing listener. Routing, in priority order:
//!
//! 1. `OPTIONS` on any path: CORS preflight, 204
//! 2. `GET /`: liveness probe, `OK`
//! 3. `GET`/`POST`/`DELETE` on the MCP path or below it: Streamable HTTP transport
//! 4. Anything else: 404 `Not Found`

mod handlers;
mod routes;
mod state;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::mcp::server::ServerContext;
use crate::mcp::session::SessionManager;
use crate::mcp::transport::StreamableHttpTransport;

pub use routes::build_router;
pub use state::GatewayState;

/// A router together with the session table behind it.
#[derive(Debug)]
pub struct Gateway {
    router: Router,
    sessions: Arc<SessionManager>,
    sweep_interval: Duration,
}

impl Gateway {
    /// Builds the gateway for `config`, sharing `context` across sessions.
    #[must_use]
    pub fn new(config: &ServerConfig, context: Arc<ServerContext>) -> Self {
        let sessions = Arc::new(SessionManager::new(
            context,
            config.session_idle_timeout(),
        ));
        let state = GatewayState::new(
            StreamableHttpTransport::new(Arc::clone(&sessions)),
            &config.mcp_path,
        );
        Self {
            router: build_router(state, config.max_body_bytes),
            sessions,
            sweep_interval: config.session_sweep_interval(),
        }
    }

    /// The router, for serving or for driving in tests.
    #[must_use]
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// The session table.
    #[must_use]
    pub const fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Serves on `listener` until `shutdown` resolves, then closes every session.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails while accepting connections.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let sweeper = self.sessions.spawn_sweeper(self.sweep_interval);

        // Open SSE streams only end once their session closes
        let sessions = Arc::clone(&self.sessions);
        let shutdown = async move {
            shutdown.await;
            sessions.close_all().await;
        };

        let result = axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await;

        sweeper.abort();
        self.sessions.close_all().await;
        result
    }
}

/// Start the gateway with graceful shutdown on SIGTERM/SIGINT.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn serve(config: &ServerConfig, context: Arc<ServerContext>) -> std::io::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(
        "MCP endpoint listening on http://{}{}",
        listener.local_addr()?,
        config.mcp_path
    );

    Gateway::new(config, context)
        .serve(listener, shutdown_signal())
        .await?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("Received SIGINT, shutting down..."); }
        () = terminate => { tracing::info!("Received SIGTERM, shutting down..."); }
    }
}
