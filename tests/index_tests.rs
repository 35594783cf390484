use meshfs::db_operations::{FieldPredicate, PredicateOp};
use serde_json::json;

mod test_helpers;
use test_helpers::setup_test_engine;

#[test]
fn search_counts_equality_matches() {
    let (engine, _dir) = setup_test_engine();

    for (i, value) in [1, 2, 2, 3, 5].iter().enumerate() {
        engine
            .store_record(
                &format!("c{}", i),
                "/customers",
                &format!("c{}", i),
                "file",
                1,
                json!({"value": value}),
            )
            .expect("store failed");
    }

    let predicate = FieldPredicate::new("value", PredicateOp::Eq, json!(2));
    let matches = engine.search(&predicate).expect("search failed");
    assert_eq!(matches.len(), 2);

    // float form of the same number matches through the index
    let predicate = FieldPredicate::new("value", PredicateOp::Eq, json!(2.0));
    assert_eq!(engine.search(&predicate).expect("search failed").len(), 2);
}

#[test]
fn search_supports_ordering_operators() {
    let (engine, _dir) = setup_test_engine();

    for (name, price) in [("a", 3.0), ("b", 12.5), ("c", 20.0)] {
        engine
            .store_record(name, "/inventory", name, "file", 1, json!({"unit_price": price}))
            .expect("store failed");
    }

    let under_15 = FieldPredicate::new("unit_price", PredicateOp::Lt, json!(15));
    assert_eq!(engine.search(&under_15).expect("search failed").len(), 2);

    let at_least_12_5 = FieldPredicate::new("unit_price", PredicateOp::Ge, json!(12.5));
    assert_eq!(engine.search(&at_least_12_5).expect("search failed").len(), 2);
}

#[test]
fn records_without_the_field_are_non_matches() {
    let (engine, _dir) = setup_test_engine();

    engine
        .store_record("a", "/x", "a", "file", 1, json!({"value": 2}))
        .expect("store failed");
    engine
        .store_record("b", "/x", "b", "file", 1, json!({"other": 2}))
        .expect("store failed");

    let predicate = FieldPredicate::new("value", PredicateOp::Eq, json!(2));
    let matches = engine.search(&predicate).expect("search failed");
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].id, "a");
}

#[test]
fn searchtext_matches_tokens_of_the_named_field() {
    let (engine, _dir) = setup_test_engine();

    engine
        .store_record("w1", "/files", "w1", "file", 1, json!({"data": "A widget1 data"}))
        .expect("store failed");
    engine
        .store_record("w2", "/files", "w2", "file", 1, json!({"data": "another widget2 here"}))
        .expect("store failed");
    engine
        .store_record("w3", "/files", "w3", "file", 1, json!({"note": "widget1 elsewhere"}))
        .expect("store failed");

    // token prefix match within the named field only
    let matches = engine.search_text("data", "widget").expect("searchtext failed");
    assert_eq!(matches.len(), 2);

    let matches = engine.search_text("data", "widget1").expect("searchtext failed");
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].id, "w1");

    // every query token must match
    let matches = engine.search_text("data", "widget1 data").expect("searchtext failed");
    assert_eq!(matches.len(), 1);
    let matches = engine.search_text("data", "widget1 missing").expect("searchtext failed");
    assert!(matches.is_empty());
}

#[test]
fn reindex_is_idempotent() {
    let (engine, _dir) = setup_test_engine();

    engine
        .store_record("a", "/x", "a", "file", 1, json!({"value": 1, "note": "first entry"}))
        .expect("store failed");
    engine
        .store_record("b", "/x", "b", "file", 1, json!({"value": 2.5}))
        .expect("store failed");

    let initial = engine.db_ops().index_entries().expect("index listing failed");
    assert!(!initial.is_empty());

    engine.reindex().expect("first reindex failed");
    let first = engine.db_ops().index_entries().expect("index listing failed");
    engine.reindex().expect("second reindex failed");
    let second = engine.db_ops().index_entries().expect("index listing failed");

    // rebuilt index equals both itself and the incrementally built one
    assert_eq!(first, second);
    assert_eq!(initial, first);
}

#[test]
fn rm_drops_index_entries_with_the_record() {
    let (engine, _dir) = setup_test_engine();

    engine
        .store_record("a", "/x", "a", "file", 1, json!({"value": 7}))
        .expect("store failed");
    engine.rm("/x/a").expect("rm failed");

    let predicate = FieldPredicate::new("value", PredicateOp::Eq, json!(7));
    assert!(engine.search(&predicate).expect("search failed").is_empty());
    assert!(engine.db_ops().index_entries().expect("index listing failed").is_empty());
}
