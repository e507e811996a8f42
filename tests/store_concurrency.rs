//! Stress tests for the shared item store.
//!
//! These tests hammer the store from many tasks and sessions at once to
//! catch lost updates and ordering bugs.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::json;

use item_widget_mcp::app::{build_registry, ItemStore, StoreError, WidgetAsset};
use item_widget_mcp::mcp::protocol::{parse_body, OutgoingMessage};
use item_widget_mcp::mcp::server::{McpServer, Reply, ServerContext, ServerInfo};
use item_widget_mcp::mcp::ToolRegistry;

const TASKS: usize = 64;

fn registry() -> Arc<ToolRegistry> {
    Arc::new(build_registry(&WidgetAsset::builtin()).unwrap())
}

async fn exchange(server: &mut McpServer, json: &str) -> Option<OutgoingMessage> {
    match parse_body(json.as_bytes()) {
        Ok(envelope) => match server.handle_envelope(envelope, None).await? {
            Reply::Single(msg) => Some(msg),
            Reply::Batch(_) => panic!("expected a single reply"),
        },
        Err(error) => Some(OutgoingMessage::Error(error)),
    }
}

// =============================================================================
// Concurrent Append Tests
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_adds_lose_nothing() {
    let store = ItemStore::default();

    let handles: Vec<_> = (0..TASKS)
        .map(|i| {
            let store = store.clone();
            tokio::spawn(async move { store.add(&format!("item-{i}")).await })
        })
        .collect();

    let mut ids = HashSet::new();
    for handle in handles {
        let (item, _) = handle.await.unwrap().unwrap();
        assert!(ids.insert(item.id));
    }

    let items = store.list().await;
    assert_eq!(items.len(), TASKS);

    let names: HashSet<_> = items.iter().map(|item| item.name.as_str()).collect();
    assert_eq!(names.len(), TASKS);
    let listed: HashSet<_> = items.iter().map(|item| item.id.clone()).collect();
    assert_eq!(listed, ids);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_tool_calls_through_registry() {
    let registry = registry();
    let store = ItemStore::default();

    let handles: Vec<_> = (0..TASKS)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let store = store.clone();
            tokio::spawn(async move {
                registry
                    .invoke("add_item", &json!({"name": "Milk"}), &store)
                    .await
            })
        })
        .collect();

    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.first_text(), Some("Added \"Milk\"."));
    }

    let items = store.list().await;
    assert_eq!(items.len(), TASKS);
    let ids: HashSet<_> = items.iter().map(|item| item.id.as_str()).collect();
    assert_eq!(ids.len(), TASKS);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_sessions_share_one_list() {
    let store = ItemStore::default();
    let context = Arc::new(ServerContext::new(
        ServerInfo::new("my-app", "0.1.0"),
        build_registry(&WidgetAsset::builtin()).unwrap(),
        store.clone(),
    ));

    let handles: Vec<_> = (0..8)
        .map(|session| {
            let context = Arc::clone(&context);
            tokio::spawn(async move {
                let mut server = McpServer::new(context);
                exchange(
                    &mut server,
                    r#"{"jsonrpc":"2.0","id":0,"method":"initialize","params":{"protocolVersion":"2025-06-18","capabilities":{},"clientInfo":{"name":"load","version":"1"}}}"#,
                )
                .await;
                for n in 0..8 {
                    let line = json!({
                        "jsonrpc": "2.0",
                        "id": n + 1,
                        "method": "tools/call",
                        "params": {
                            "name": "add_item",
                            "arguments": {"name": format!("s{session}-{n}")}
                        }
                    })
                    .to_string();
                    let reply = exchange(&mut server, &line).await.unwrap();
                    assert!(reply.error().is_none());
                }
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap();
    }

    let items = store.list().await;
    assert_eq!(items.len(), 64);

    // Each session's own appends stay in the order it made them
    for session in 0..8 {
        let prefix = format!("s{session}-");
        let order: Vec<_> = items
            .iter()
            .filter_map(|item| item.name.strip_prefix(&prefix))
            .map(|n| n.parse::<usize>().unwrap())
            .collect();
        assert_eq!(order, (0..8).collect::<Vec<_>>());
    }
}

// =============================================================================
// Boundary Tests
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_capacity_never_overshoots_under_contention() {
    let store = ItemStore::new(10);

    let handles: Vec<_> = (0..TASKS)
        .map(|i| {
            let store = store.clone();
            tokio::spawn(async move { store.add(&format!("item-{i}")).await })
        })
        .collect();

    let mut accepted = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(StoreError::CapacityExceeded { limit }) => {
                assert_eq!(limit, 10);
                rejected += 1;
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(accepted, 10);
    assert_eq!(rejected, TASKS - 10);
    assert_eq!(store.len().await, 10);
}

#[tokio::test]
async fn test_snapshot_unaffected_by_later_adds() {
    let store = ItemStore::default();
    store.add("Milk").await.unwrap();

    let snapshot = store.list().await;
    store.add("Eggs").await.unwrap();

    assert_eq!(snapshot.len(), 1);
    assert_eq!(store.list().await.len(), 2);
}

#[tokio::test]
async fn test_long_and_unicode_names_kept_verbatim() {
    let store = ItemStore::default();
    let long = "x".repeat(10_000);

    let (item, _) = store.add(&long).await.unwrap();
    assert_eq!(item.name.len(), 10_000);

    let (item, _) = store.add("  Crème fraîche 🥛  ").await.unwrap();
    assert_eq!(item.name, "  Crème fraîche 🥛  ");
}
