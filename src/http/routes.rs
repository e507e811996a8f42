//! Route definitions for the gateway.

use axum::middleware;
use axum::routing::get;
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::state::GatewayState;

/// Build the Axum router.
///
/// `OPTIONS` is answered before routing. `GET /` is the liveness probe; any
/// other method on `/` is a 404. Everything else lands in the fallback, which
/// hands the MCP path to the transport.
pub fn build_router(state: GatewayState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/", get(handlers::health).fallback(handlers::not_found))
        .fallback(handlers::mcp)
        .with_state(state)
        .layer(middleware::from_fn(handlers::preflight))
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
}
