//! Gateway integration tests.
//!
//! Drives the full router (preflight, tracing, body limit, transport) with
//! `tower::ServiceExt::oneshot`, without binding a socket.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use item_widget_mcp::app::{build_registry, ItemStore, WidgetAsset, WIDGET_URI};
use item_widget_mcp::config::ServerConfig;
use item_widget_mcp::http::Gateway;
use item_widget_mcp::mcp::protocol::ErrorCode;
use item_widget_mcp::mcp::server::{ServerContext, ServerInfo};

const SESSION: &str = "mcp-session-id";

fn gateway() -> Gateway {
    gateway_with_store(ItemStore::default())
}

fn gateway_with_store(store: ItemStore) -> Gateway {
    let context = Arc::new(ServerContext::new(
        ServerInfo::new("my-app", "0.1.0"),
        build_registry(&WidgetAsset::builtin()).unwrap(),
        store,
    ));
    Gateway::new(&ServerConfig::default(), context)
}

fn post(session: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/mcp")
        .header("content-type", "application/json")
        .header("accept", "application/json, text/event-stream");
    if let Some(id) = session {
        builder = builder.header(SESSION, id);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn initialize() -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": "2025-03-26",
            "capabilities": {},
            "clientInfo": {"name": "test-client", "version": "1.0.0"}
        }
    })
}

fn tool_call(id: i64, name: &str, arguments: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": {"name": name, "arguments": arguments}
    })
}

async fn send(app: &Router, req: Request<Body>) -> Response {
    app.clone().oneshot(req).await.unwrap()
}

async fn body_bytes(resp: Response) -> Vec<u8> {
    axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn json_body(resp: Response) -> Value {
    serde_json::from_slice(&body_bytes(resp).await).unwrap()
}

fn session_id(resp: &Response) -> String {
    resp.headers()[SESSION].to_str().unwrap().to_string()
}

/// Opens a session and returns its id.
async fn open_session(app: &Router) -> String {
    let resp = send(app, post(None, &initialize())).await;
    assert_eq!(resp.status(), StatusCode::OK);
    session_id(&resp)
}

// =============================================================================
// Routing Tests
// =============================================================================

#[tokio::test]
async fn test_preflight_on_any_path() {
    let app = gateway().router();
    for path in ["/", "/mcp", "/mcp/anything", "/favicon.ico"] {
        let resp = send(
            &app,
            Request::builder()
                .method("OPTIONS")
                .uri(path)
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(resp.status(), StatusCode::NO_CONTENT, "path {path}");
        let headers = resp.headers();
        assert_eq!(headers["access-control-allow-origin"], "*");
        assert_eq!(
            headers["access-control-allow-methods"],
            "POST, GET, DELETE, OPTIONS"
        );
        assert!(headers["access-control-allow-headers"]
            .to_str()
            .unwrap()
            .contains("mcp-session-id"));
        assert_eq!(headers["access-control-expose-headers"], "Mcp-Session-Id");
        assert!(body_bytes(resp).await.is_empty());
    }
}

#[tokio::test]
async fn test_liveness_probe() {
    let app = gateway().router();
    let resp = send(&app, Request::builder().uri("/").body(Body::empty()).unwrap()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_bytes(resp).await, b"OK");
}

#[tokio::test]
async fn test_head_to_root_is_not_found() {
    let app = gateway().router();
    let resp = send(
        &app,
        Request::builder()
            .method("HEAD")
            .uri("/")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unrouted_path_is_not_found() {
    let app = gateway().router();
    let resp = send(
        &app,
        Request::builder()
            .uri("/favicon.ico")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_bytes(resp).await, b"Not Found");
}

// =============================================================================
// Session Tests
// =============================================================================

#[tokio::test]
async fn test_initialize_creates_session() {
    let gateway = gateway();
    let app = gateway.router();

    let resp = send(&app, post(None, &initialize())).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["access-control-allow-origin"], "*");
    assert_eq!(
        resp.headers()["access-control-expose-headers"],
        "Mcp-Session-Id"
    );
    let id = session_id(&resp);
    assert!(!id.is_empty());

    let body = json_body(resp).await;
    assert_eq!(body["id"], 1);
    assert_eq!(body["result"]["protocolVersion"], "2025-03-26");
    assert_eq!(body["result"]["serverInfo"]["name"], "my-app");
    assert_eq!(gateway.sessions().len().await, 1);
}

#[tokio::test]
async fn test_session_keeps_initialised_state() {
    let app = gateway().router();
    let id = open_session(&app).await;

    let resp = send(&app, post(Some(&id), &tool_call(2, "get_items", json!({})))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(session_id(&resp), id);
    let body = json_body(resp).await;
    assert_eq!(body["result"]["content"][0]["text"], "0 items found.");
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let gateway = gateway();
    let app = gateway.router();

    let resp = send(
        &app,
        post(Some("no-such-session"), &tool_call(1, "get_items", json!({}))),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body = json_body(resp).await;
    assert_eq!(body["error"]["code"], ErrorCode::SessionNotFound.code());

    // No server is constructed for the unknown id
    assert!(gateway.sessions().is_empty().await);
}

#[tokio::test]
async fn test_malformed_session_header() {
    let app = gateway().router();
    let resp = send(&app, post(Some(""), &initialize())).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_and_delete_require_session() {
    let app = gateway().router();
    for method in ["GET", "DELETE"] {
        let resp = send(
            &app,
            Request::builder()
                .method(method)
                .uri("/mcp")
                .header("accept", "text/event-stream")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "method {method}");
    }
}

#[tokio::test]
async fn test_only_initialize_opens_a_session() {
    let gateway = gateway();
    let app = gateway.router();

    for n in 0..3 {
        let resp = send(
            &app,
            post(None, &json!({"jsonrpc": "2.0", "id": n, "method": "ping"})),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(resp.headers().get(SESSION).is_none());
    }

    let resp = send(&app, post(None, &tool_call(9, "add_item", json!({"name": "Milk"})))).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = send(
        &app,
        post(
            None,
            &json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(gateway.sessions().is_empty().await);

    // An initialize anywhere in a batch is enough
    let batch = json!([
        {"jsonrpc": "2.0", "id": "p", "method": "ping"},
        initialize()
    ]);
    let resp = send(&app, post(None, &batch)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(!session_id(&resp).is_empty());
    assert_eq!(gateway.sessions().len().await, 1);
}

#[tokio::test]
async fn test_malformed_body_creates_no_session() {
    let gateway = gateway();
    let app = gateway.router();

    let req = Request::builder()
        .method("POST")
        .uri("/mcp")
        .header("content-type", "application/json")
        .body(Body::from("{ not json"))
        .unwrap();
    let resp = send(&app, req).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = json_body(resp).await;
    assert_eq!(body["error"]["code"], ErrorCode::ParseError.code());
    assert!(body["id"].is_null());
    assert!(gateway.sessions().is_empty().await);
}

#[tokio::test]
async fn test_wrong_content_type() {
    let app = gateway().router();
    let req = Request::builder()
        .method("POST")
        .uri("/mcp")
        .header("content-type", "text/plain")
        .body(Body::from(initialize().to_string()))
        .unwrap();
    let resp = send(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn test_unacceptable_accept_header() {
    let app = gateway().router();
    let req = Request::builder()
        .method("POST")
        .uri("/mcp")
        .header("content-type", "application/json")
        .header("accept", "text/html")
        .body(Body::from(initialize().to_string()))
        .unwrap();
    let resp = send(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_ACCEPTABLE);
}

#[tokio::test]
async fn test_notification_only_body_is_accepted() {
    let app = gateway().router();
    let id = open_session(&app).await;

    let resp = send(
        &app,
        post(
            Some(&id),
            &json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    assert!(body_bytes(resp).await.is_empty());
}

#[tokio::test]
async fn test_delete_tears_session_down() {
    let gateway = gateway();
    let app = gateway.router();
    let id = open_session(&app).await;

    let resp = send(
        &app,
        Request::builder()
            .method("DELETE")
            .uri("/mcp")
            .header(SESSION, &id)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(gateway.sessions().is_empty().await);

    let resp = send(&app, post(Some(&id), &tool_call(2, "get_items", json!({})))).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// =============================================================================
// Streaming Tests
// =============================================================================

#[tokio::test]
async fn test_sse_reply_when_only_event_stream_accepted() {
    let app = gateway().router();
    let id = open_session(&app).await;

    let mut body = tool_call(2, "get_items", json!({}));
    body["params"]["_meta"] = json!({"progressToken": "tok"});
    let req = Request::builder()
        .method("POST")
        .uri("/mcp")
        .header("content-type", "application/json")
        .header("accept", "text/event-stream")
        .header(SESSION, &id)
        .body(Body::from(body.to_string()))
        .unwrap();

    let resp = send(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let text = String::from_utf8(body_bytes(resp).await).unwrap();
    let frames: Vec<Value> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(|data| serde_json::from_str(data).unwrap())
        .collect();

    assert!(text.contains("event: message"));
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[0]["method"], "notifications/progress");
    assert_eq!(frames[0]["params"]["progressToken"], "tok");
    assert_eq!(frames[1]["method"], "notifications/progress");
    assert_eq!(frames[2]["id"], 2);
    assert_eq!(frames[2]["result"]["content"][0]["text"], "0 items found.");
}

#[tokio::test]
async fn test_one_standalone_stream_per_session() {
    let app = gateway().router();
    let id = open_session(&app).await;

    let open_stream = || {
        Request::builder()
            .method("GET")
            .uri("/mcp")
            .header("accept", "text/event-stream")
            .header(SESSION, &id)
            .body(Body::empty())
            .unwrap()
    };

    let first = send(&app, open_stream()).await;
    assert_eq!(first.status(), StatusCode::OK);

    let second = send(&app, open_stream()).await;
    assert_eq!(second.status(), StatusCode::CONFLICT);

    // Tearing the session down ends the open stream
    let resp = send(
        &app,
        Request::builder()
            .method("DELETE")
            .uri("/mcp")
            .header(SESSION, &id)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_bytes(first).await.is_empty());
}

#[tokio::test]
async fn test_dropped_stream_tears_session_down() {
    let gateway = gateway();
    let app = gateway.router();
    let id = open_session(&app).await;

    let stream = send(
        &app,
        Request::builder()
            .method("GET")
            .uri("/mcp")
            .header("accept", "text/event-stream")
            .header(SESSION, &id)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(stream.status(), StatusCode::OK);
    drop(stream);

    for _ in 0..100 {
        if gateway.sessions().is_empty().await {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert!(gateway.sessions().is_empty().await);

    let resp = send(&app, post(Some(&id), &tool_call(2, "get_items", json!({})))).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// =============================================================================
// End-to-End Tests
// =============================================================================

#[tokio::test]
async fn test_add_milk_over_http() {
    let app = gateway().router();
    let id = open_session(&app).await;

    let resp = send(
        &app,
        post(Some(&id), &tool_call(2, "add_item", json!({"name": "Milk"}))),
    )
    .await;
    let body = json_body(resp).await;
    assert_eq!(body["result"]["content"][0]["text"], "Added \"Milk\".");

    let resp = send(&app, post(Some(&id), &tool_call(3, "get_items", json!({})))).await;
    let body = json_body(resp).await;
    let items = body["result"]["structuredContent"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["name"], "Milk");
}

#[tokio::test]
async fn test_batch_over_http() {
    let app = gateway().router();
    let id = open_session(&app).await;

    let batch = json!([
        {"jsonrpc": "2.0", "id": "a", "method": "ping"},
        {"jsonrpc": "2.0", "method": "notifications/initialized"},
        {"jsonrpc": "2.0", "id": "b", "method": "resources/read", "params": {"uri": WIDGET_URI}}
    ]);
    let resp = send(&app, post(Some(&id), &batch)).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body = json_body(resp).await;
    let replies = body.as_array().unwrap();
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[0]["id"], "a");
    assert_eq!(replies[1]["id"], "b");
    assert_eq!(
        replies[1]["result"]["contents"][0]["mimeType"],
        "text/html+skybridge"
    );
}

// =============================================================================
// Ordering Tests
// =============================================================================

#[tokio::test]
async fn test_same_session_posts_apply_in_arrival_order() {
    const POSTS: usize = 8;
    let store = ItemStore::default();
    let gateway = gateway_with_store(store.clone());
    let app = gateway.router();
    let id = open_session(&app).await;

    // Occupy the session as an in-flight exchange would, so every POST queues
    let session = gateway.sessions().get(&id).await.unwrap();
    let busy = session.server().lock().await;

    let mut handles = Vec::new();
    for n in 0..POSTS {
        let req = post(
            Some(&id),
            &tool_call(n as i64 + 2, "add_item", json!({"name": format!("n-{n}")})),
        );
        handles.push(tokio::spawn(app.clone().oneshot(req)));
        // Let this POST reach the session queue before the next one arrives
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }
    assert!(store.is_empty().await);
    drop(busy);

    for handle in handles {
        let resp = handle.await.unwrap().unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let names: Vec<String> = store.list().await.iter().map(|item| item.name.clone()).collect();
    let expected: Vec<String> = (0..POSTS).map(|n| format!("n-{n}")).collect();
    assert_eq!(names, expected);
}

#[tokio::test]
async fn test_dropped_post_still_applies() {
    let store = ItemStore::default();
    let gateway = gateway_with_store(store.clone());
    let app = gateway.router();
    let id = open_session(&app).await;

    let mut pending = Box::pin(send(
        &app,
        post(Some(&id), &tool_call(2, "add_item", json!({"name": "Milk"}))),
    ));
    // One poll gets the exchange accepted and handed off; the reply is still owed
    assert!(futures::poll!(pending.as_mut()).is_pending());
    drop(pending);

    for _ in 0..100 {
        if !store.is_empty().await {
            break;
        }
        tokio::task::yield_now().await;
    }
    let items = store.list().await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].name, "Milk");

    // The session is free again for the next exchange
    let resp = send(&app, post(Some(&id), &tool_call(3, "get_items", json!({})))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["result"]["content"][0]["text"], "1 items found.");
}
