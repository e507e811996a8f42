//! Request handlers for the gateway.

use axum::body::Bytes;
use axum::extract::{Request, State};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_EXPOSE_HEADERS,
};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::state::GatewayState;

const ALLOW_ORIGIN: &str = "*";
const ALLOW_METHODS: &str = "POST, GET, DELETE, OPTIONS";
const ALLOW_HEADERS: &str = "content-type, mcp-session-id";
const EXPOSE_HEADERS: &str = "Mcp-Session-Id";

/// Answers every `OPTIONS` request with a CORS preflight, whatever the path.
pub async fn preflight(req: Request, next: Next) -> Response {
    if req.method() != Method::OPTIONS {
        return next.run(req).await;
    }

    (
        StatusCode::NO_CONTENT,
        [
            (ACCESS_CONTROL_ALLOW_ORIGIN, ALLOW_ORIGIN),
            (ACCESS_CONTROL_ALLOW_METHODS, ALLOW_METHODS),
            (ACCESS_CONTROL_ALLOW_HEADERS, ALLOW_HEADERS),
            (ACCESS_CONTROL_EXPOSE_HEADERS, EXPOSE_HEADERS),
        ],
    )
        .into_response()
}

/// Liveness check.
///
/// Only `GET` is routed here. axum also dispatches `HEAD` to a `GET` route,
/// so that is turned away like any other unrouted method.
pub async fn health(method: Method) -> Response {
    if method == Method::HEAD {
        return not_found().await.into_response();
    }
    "OK".into_response()
}

/// Plain 404 for anything unrouted.
pub async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not Found")
}

/// Delegates the MCP path to the transport; everything else is a 404.
pub async fn mcp(
    State(state): State<GatewayState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !state.is_mcp_path(uri.path()) {
        return not_found().await.into_response();
    }

    let transport = state.transport();
    let result = match method {
        Method::POST => transport.handle_post(&headers, body).await,
        Method::GET => transport.handle_get(&headers).await,
        Method::DELETE => transport.handle_delete(&headers).await,
        _ => return not_found().await.into_response(),
    };

    let mut response = result.unwrap_or_else(IntoResponse::into_response);
    let headers = response.headers_mut();
    headers.insert(
        ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static(ALLOW_ORIGIN),
    );
    headers.insert(
        ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static(EXPOSE_HEADERS),
    );
    response
}
