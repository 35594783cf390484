use meshfs::{MeshFsNode, TcpServer};
use serde_json::{json, Value};

mod test_helpers;
use test_helpers::{setup_test_engine, test_node_config};

fn test_node() -> (MeshFsNode, tempfile::TempDir) {
    let (engine, dir) = setup_test_engine();
    drop(engine);
    let node = MeshFsNode::new(test_node_config(&dir)).expect("failed to create node");
    (node, dir)
}

async fn dispatch(node: &MeshFsNode, operation: &str, params: Value) -> Value {
    let request = json!({"operation": operation, "params": params});
    match TcpServer::process_request(&request, node).await {
        Ok(value) => value,
        Err(e) => json!({"error": true, "message": e.to_string()}),
    }
}

#[tokio::test]
async fn store_get_and_list_through_the_rpc_surface() {
    let (node, _dir) = test_node();

    let stored = dispatch(
        &node,
        "store",
        json!({
            "id": "file1",
            "path": "/files",
            "name": "file1",
            "payload": {"data": "file 1 data"},
        }),
    )
    .await;
    assert_eq!(stored["path"], json!("/files/file1"));
    assert!(stored["uuid"].is_string());

    let pointer = dispatch(&node, "get", json!({"path": "/files/file1"})).await;
    assert_eq!(pointer["name"], json!("file1"));
    assert_eq!(pointer["kind"], json!("file"));

    let listing = dispatch(&node, "list", json!({"path": "/"})).await;
    assert_eq!(listing, json!(["dir:/files"]));

    let listing = dispatch(&node, "list", json!({"path": "/files"})).await;
    assert_eq!(listing, json!(["/files/file1"]));
}

#[tokio::test]
async fn get_on_a_missing_path_returns_the_error_envelope() {
    let (node, _dir) = test_node();

    let response = dispatch(&node, "get", json!({"path": "/missing"})).await;
    assert_eq!(response["error"], json!(true));
    assert!(response["message"]
        .as_str()
        .expect("message should be a string")
        .contains("/missing"));
}

#[tokio::test]
async fn list_pages_with_offset_and_size() {
    let (node, _dir) = test_node();

    for i in 0..5 {
        dispatch(
            &node,
            "store",
            json!({"id": format!("f{}", i), "path": "/files", "name": format!("f{}", i)}),
        )
        .await;
    }

    let page = dispatch(
        &node,
        "list",
        json!({"path": "/files", "offset": 1, "size": 2}),
    )
    .await;
    assert_eq!(page, json!(["/files/f1", "/files/f2"]));

    let rest = dispatch(&node, "list", json!({"path": "/files", "offset": 4, "size": 10})).await;
    assert_eq!(rest, json!(["/files/f4"]));
}

#[tokio::test]
async fn getobject_raw_and_serialized_forms() {
    let (node, _dir) = test_node();

    dispatch(
        &node,
        "store",
        json!({"id": "f", "path": "/files", "name": "f", "payload": {"k": "v"}}),
    )
    .await;

    let raw = dispatch(&node, "getobject", json!({"path": "/files/f", "raw": true})).await;
    assert_eq!(raw["payload"], json!({"k": "v"}));

    let serialized = dispatch(&node, "getobject", json!({"path": "/files/f"})).await;
    let text = serialized.as_str().expect("expected the wire-serialized form");
    let decoded: Value = serde_json::from_str(text).expect("not valid JSON");
    assert_eq!(decoded["payload"], json!({"k": "v"}));
}

#[tokio::test]
async fn execute_and_query_through_the_rpc_surface() {
    let (node, _dir) = test_node();

    dispatch(
        &node,
        "store",
        json!({
            "id": "widget1",
            "path": "/inventory",
            "name": "widget1",
            "kind": "item",
            "payload": {"unit_price": 3.0, "quantity_on_hand": 10},
        }),
    )
    .await;
    dispatch(
        &node,
        "store",
        json!({
            "id": "query1",
            "path": "/queries",
            "name": "query1",
            "kind": "query",
            "payload": {"target": "/inventory", "field": "unit_price", "op": "lt", "value": 15},
        }),
    )
    .await;

    let total = dispatch(
        &node,
        "execute",
        json!({"path": "/inventory/widget1", "operation": "total_cost"}),
    )
    .await;
    assert_eq!(total, json!(30.0));

    let results = dispatch(&node, "query", json!({"path": "/queries/query1"})).await;
    assert_eq!(results.as_array().expect("expected an array").len(), 1);
}

#[tokio::test]
async fn search_returns_wire_serialized_records() {
    let (node, _dir) = test_node();

    for (name, value) in [("a", 1), ("b", 2), ("c", 2)] {
        dispatch(
            &node,
            "store",
            json!({"id": name, "path": "/customers", "name": name, "payload": {"value": value}}),
        )
        .await;
    }

    let matches = dispatch(&node, "search", json!({"field": "value", "op": "eq", "value": 2})).await;
    let matches = matches.as_array().expect("expected an array");
    assert_eq!(matches.len(), 2);
    for entry in matches {
        let decoded: Value =
            serde_json::from_str(entry.as_str().expect("expected a string")).expect("bad JSON");
        assert_eq!(decoded["payload"]["value"], json!(2));
    }
}

#[tokio::test]
async fn registry_snapshot_reports_entries_and_host() {
    let (node, _dir) = test_node();

    dispatch(
        &node,
        "store",
        json!({"id": "f", "path": "/files", "name": "f"}),
    )
    .await;

    let snapshot = dispatch(&node, "registry", json!({})).await;
    assert_eq!(
        snapshot["host"],
        json!(node.config().listen_address.clone())
    );
    let entries = snapshot["registry"].as_array().expect("expected an array");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["name"], json!("f"));
}

#[tokio::test]
async fn stats_and_reindex_round_trip() {
    let (node, _dir) = test_node();

    dispatch(
        &node,
        "store",
        json!({"id": "f", "path": "/files", "name": "f", "payload": {"value": 1}}),
    )
    .await;

    let stats = dispatch(&node, "stats", json!({})).await;
    assert_eq!(stats["pointers"], json!(1));
    assert!(stats["objects"].as_u64().expect("objects count") >= 2);

    let reindexed = dispatch(&node, "reindex", json!({})).await;
    assert!(reindexed["indexed"].as_u64().expect("indexed count") >= 1);
}

#[tokio::test]
async fn register_is_broker_only() {
    let (node, _dir) = test_node();

    let entry = json!({
        "path": "/remote",
        "name": "x",
        "uuid": uuid::Uuid::new_v4(),
        "kind": "reference",
        "size": 0,
        "version": 1,
        "date": chrono::Utc::now(),
        "node": "127.0.0.1:1",
    });
    let response = dispatch(&node, "register", json!({"entry": entry})).await;
    assert_eq!(response["error"], json!(true));
}

#[tokio::test]
async fn unknown_operation_is_rejected() {
    let (node, _dir) = test_node();
    let response = dispatch(&node, "frobnicate", json!({})).await;
    assert_eq!(response["error"], json!(true));
}
