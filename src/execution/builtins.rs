//! Built-in record kinds.
//!
//! These cover the record behaviors the system ships with: inventory-style
//! items that compute a total cost, and query records that scan a target
//! path server-side and return a filtered result set.

use std::str::FromStr;

use log::debug;
use serde_json::{json, Value};

use super::{OperationRegistry, StoreContext};
use crate::constants::DIR_TAG;
use crate::db_operations::{FieldPredicate, PredicateOp};
use crate::error::{MeshFsError, MeshFsResult};
use crate::record::Record;

pub(crate) fn register_builtins(registry: &mut OperationRegistry) {
    registry.register("item", "total_cost", item_total_cost);
    registry.register("item", "run", item_run);
    registry.register("query", "query", query_scan);
}

fn op_error(operation: &str, message: String) -> MeshFsError {
    MeshFsError::Operation {
        operation: operation.to_string(),
        message,
    }
}

fn number_field(record: &Record, operation: &str, field: &str) -> MeshFsResult<f64> {
    record
        .payload
        .get(field)
        .and_then(Value::as_f64)
        .ok_or_else(|| op_error(operation, format!("missing numeric field '{}'", field)))
}

/// `unit_price * quantity_on_hand`, memoized into the payload as
/// `totalcost`.
fn item_total_cost(record: &mut Record, _ctx: &dyn StoreContext) -> MeshFsResult<Value> {
    let unit_price = number_field(record, "total_cost", "unit_price")?;
    let quantity = number_field(record, "total_cost", "quantity_on_hand")?;
    let total = unit_price * quantity;
    if let Some(fields) = record.payload.as_object_mut() {
        fields.insert("totalcost".to_string(), json!(total));
    }
    Ok(json!(total))
}

fn item_run(record: &mut Record, ctx: &dyn StoreContext) -> MeshFsResult<Value> {
    let total = item_total_cost(record, ctx)?;
    Ok(json!(format!(
        "total cost:{}",
        total.as_f64().unwrap_or_default()
    )))
}

/// Server-side scan: reads its filter from the record's own payload
/// (`target`, `field`, `op`, `value`) and walks the target path through
/// the store façade, returning the matching records as a JSON array.
fn query_scan(record: &mut Record, ctx: &dyn StoreContext) -> MeshFsResult<Value> {
    let target = record
        .payload
        .get("target")
        .and_then(Value::as_str)
        .unwrap_or("/")
        .to_string();
    let field = record
        .payload
        .get("field")
        .and_then(Value::as_str)
        .ok_or_else(|| op_error("query", "missing 'field' in query payload".to_string()))?
        .to_string();
    let op = match record.payload.get("op").and_then(Value::as_str) {
        Some(s) => PredicateOp::from_str(s)?,
        None => PredicateOp::Eq,
    };
    let value = record.payload.get("value").cloned().unwrap_or(Value::Null);
    let predicate = FieldPredicate::new(&field, op, value);

    let mut results = Vec::new();
    for entry in ctx.list(&target, true)? {
        if entry.starts_with(DIR_TAG) {
            continue;
        }
        match ctx.get_record(&entry) {
            Ok(candidate) => {
                if predicate.matches(&candidate.payload) {
                    results.push(serde_json::to_value(&candidate)?);
                }
            }
            Err(e) => {
                // unresolvable entries (e.g. remote references) are skipped
                debug!("query skipping {}: {}", entry, e);
            }
        }
    }
    Ok(Value::Array(results))
}
