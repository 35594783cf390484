use meshfs::execution::{OperationRegistry, StoreContext};
use meshfs::record::Record;
use meshfs::{MeshFs, MeshFsError, MeshFsResult};
use serde_json::{json, Value};

mod test_helpers;
use test_helpers::setup_test_engine;

#[test]
fn total_cost_scenario() {
    let (engine, _dir) = setup_test_engine();

    engine
        .store_record(
            "widget1",
            "/inventory",
            "widget1",
            "item",
            1,
            json!({"unit_price": 3.0, "quantity_on_hand": 10, "data": "A widget1 data"}),
        )
        .expect("store failed");

    let result = engine
        .execute("/inventory/widget1", "total_cost")
        .expect("execute failed");
    assert_eq!(result, json!(30.0));

    // no mutation between calls: same value again
    let again = engine
        .execute("/inventory/widget1", "total_cost")
        .expect("second execute failed");
    assert_eq!(again, json!(30.0));

    // the computed field was persisted back under the same uuid
    let record = engine.get_record("/inventory/widget1").expect("lookup failed");
    assert_eq!(record.payload["totalcost"], json!(30.0));
}

#[test]
fn execute_by_identity_matches_execute_by_path() {
    let (engine, _dir) = setup_test_engine();

    let record = engine
        .store_record(
            "widget1",
            "/inventory",
            "widget1",
            "item",
            1,
            json!({"unit_price": 2.0, "quantity_on_hand": 4}),
        )
        .expect("store failed");

    let by_uuid = engine
        .execute(&record.uuid.to_string(), "total_cost")
        .expect("execute by uuid failed");
    assert_eq!(by_uuid, json!(8.0));
}

#[test]
fn unknown_operation_fails_with_no_such_operation() {
    let (engine, _dir) = setup_test_engine();

    engine
        .store_record("f", "/files", "f", "file", 1, json!({}))
        .expect("store failed");

    let err = engine
        .execute("/files/f", "total_cost")
        .expect_err("execute should fail");
    assert!(matches!(err, MeshFsError::NoSuchOperation { .. }));
}

#[test]
fn execute_on_missing_path_fails_with_path_not_found() {
    let (engine, _dir) = setup_test_engine();
    let err = engine
        .execute("/nope/nothing", "total_cost")
        .expect_err("execute should fail");
    assert!(matches!(err, MeshFsError::PathNotFound(_)));
}

fn mutate_then_fail(record: &mut Record, _ctx: &dyn StoreContext) -> MeshFsResult<Value> {
    if let Some(fields) = record.payload.as_object_mut() {
        fields.insert("poisoned".to_string(), json!(true));
    }
    Err(MeshFsError::Operation {
        operation: "corrupt".to_string(),
        message: "boom".to_string(),
    })
}

#[test]
fn failed_operation_persists_nothing() {
    let (engine, dir) = setup_test_engine();
    drop(engine);

    let mut operations = OperationRegistry::with_builtins();
    operations.register("item", "corrupt", mutate_then_fail);
    let engine = MeshFs::new(dir.path().to_str().unwrap())
        .unwrap()
        .with_operations(operations);

    engine
        .store_record(
            "w",
            "/inventory",
            "w",
            "item",
            1,
            json!({"unit_price": 1.0, "quantity_on_hand": 1}),
        )
        .expect("store failed");

    let err = engine
        .execute("/inventory/w", "corrupt")
        .expect_err("operation should fail");
    assert!(matches!(err, MeshFsError::Operation { .. }));

    // persisted state equals the state before the call
    let record = engine.get_record("/inventory/w").expect("lookup failed");
    assert_eq!(
        record.payload,
        json!({"unit_price": 1.0, "quantity_on_hand": 1})
    );
}

#[test]
fn execute_on_directory_fans_out_to_children_that_define_it() {
    let (engine, _dir) = setup_test_engine();

    for (name, price, qty) in [("a", 1.0, 2), ("b", 2.0, 3), ("c", 3.0, 4)] {
        engine
            .store_record(
                name,
                "/inventory",
                name,
                "item",
                1,
                json!({"unit_price": price, "quantity_on_hand": qty}),
            )
            .expect("store failed");
    }
    // a plain file that does not define the operation is skipped
    engine
        .store_record("readme", "/inventory", "readme", "file", 1, json!({}))
        .expect("store failed");

    let result = engine
        .execute("/inventory", "total_cost")
        .expect("fan-out failed");
    let results = result.as_array().expect("expected an array");
    assert_eq!(results.len(), 3);
    let mut totals: Vec<f64> = results.iter().filter_map(Value::as_f64).collect();
    totals.sort_by(f64::total_cmp);
    assert_eq!(totals, vec![2.0, 6.0, 12.0]);
}

#[test]
fn query_record_scans_its_target_server_side() {
    let (engine, _dir) = setup_test_engine();

    for (name, price) in [("w1", 3.0), ("w2", 12.5), ("w3", 20.0)] {
        engine
            .store_record(
                name,
                "/inventory",
                name,
                "item",
                1,
                json!({"unit_price": price, "quantity_on_hand": 1}),
            )
            .expect("store failed");
    }
    engine
        .store_record(
            "query1",
            "/queries",
            "query1",
            "query",
            1,
            json!({"target": "/inventory", "field": "unit_price", "op": "lt", "value": 15}),
        )
        .expect("store failed");

    let result = engine.execute("/queries/query1", "query").expect("query failed");
    let results = result.as_array().expect("expected an array");
    assert_eq!(results.len(), 2);
    for matched in results {
        assert!(matched["payload"]["unit_price"].as_f64().unwrap() < 15.0);
    }
}
