use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};
use std::str::FromStr;

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sled::transaction::TransactionalTree;

use super::{DbOperations, TxError, IDX_SEP, KEY_FIELD_INDEX, KEY_TEXT_INDEX};
use crate::error::{MeshFsError, MeshFsResult};
use crate::record::Record;

/// Comparison operator of a field predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredicateOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl FromStr for PredicateOp {
    type Err = MeshFsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eq" | "==" => Ok(Self::Eq),
            "ne" | "!=" => Ok(Self::Ne),
            "lt" | "<" => Ok(Self::Lt),
            "le" | "<=" => Ok(Self::Le),
            "gt" | ">" => Ok(Self::Gt),
            "ge" | ">=" => Ok(Self::Ge),
            other => Err(MeshFsError::Config(format!(
                "unknown predicate operator: {}",
                other
            ))),
        }
    }
}

/// A predicate over one payload field.
///
/// Records that lack the field are non-matches, never errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldPredicate {
    pub field: String,
    pub op: PredicateOp,
    pub value: Value,
}

impl FieldPredicate {
    #[must_use]
    pub fn new(field: &str, op: PredicateOp, value: Value) -> Self {
        Self {
            field: field.to_string(),
            op,
            value,
        }
    }

    /// Evaluates the predicate against a payload object.
    #[must_use]
    pub fn matches(&self, payload: &Value) -> bool {
        let actual = match payload.get(&self.field) {
            Some(v) => v,
            None => return false,
        };
        match compare(actual, &self.value) {
            Some(ordering) => match self.op {
                PredicateOp::Eq => ordering == Ordering::Equal,
                PredicateOp::Ne => ordering != Ordering::Equal,
                PredicateOp::Lt => ordering == Ordering::Less,
                PredicateOp::Le => ordering != Ordering::Greater,
                PredicateOp::Gt => ordering == Ordering::Greater,
                PredicateOp::Ge => ordering != Ordering::Less,
            },
            None => false,
        }
    }
}

/// Compares two scalar JSON values; mixed or non-scalar types do not
/// compare.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.as_str().cmp(y.as_str())),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Canonical equality token of a scalar value, shared by the index writer
/// and the index scan so `3`, `3.0` and `"3"` behave predictably (the two
/// numeric forms collapse, the string stays distinct).
pub(crate) fn scalar_token(value: &Value) -> Option<String> {
    match value {
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else if let Some(u) = n.as_u64() {
                Some(u.to_string())
            } else {
                let f = n.as_f64()?;
                if !f.is_finite() {
                    return None;
                }
                if f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 {
                    Some(format!("{}", f as i64))
                } else {
                    Some(f.to_string())
                }
            }
        }
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

/// Lowercased alphanumeric tokens of a text value.
pub(crate) fn text_tokens(text: &str) -> Vec<String> {
    let mut tokens = BTreeSet::new();
    for token in text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        tokens.insert(token.to_string());
    }
    tokens.into_iter().collect()
}

fn field_index_key(field: &str, token: &str, uuid: &str) -> String {
    format!(
        "{}{}{}{}{}{}",
        KEY_FIELD_INDEX, field, IDX_SEP, token, IDX_SEP, uuid
    )
}

fn text_index_key(field: &str, token: &str, uuid: &str) -> String {
    format!(
        "{}{}{}{}{}{}",
        KEY_TEXT_INDEX, field, IDX_SEP, token, IDX_SEP, uuid
    )
}

/// Every index key a record contributes. Non-scalar fields are simply not
/// indexable; one odd field never blocks the record itself.
pub(crate) fn index_keys(record: &Record) -> Vec<String> {
    let mut keys = Vec::new();
    let uuid = record.uuid.to_string();
    let fields = match record.payload.as_object() {
        Some(fields) => fields,
        None => return keys,
    };
    for (field, value) in fields {
        if let Some(token) = scalar_token(value) {
            keys.push(field_index_key(field, &token, &uuid));
        }
        if let Value::String(text) = value {
            for token in text_tokens(text) {
                keys.push(text_index_key(field, &token, &uuid));
            }
        }
    }
    keys
}

/// Writes a record's index entries inside an open transaction scope.
pub(crate) fn index_record_tx(tx: &TransactionalTree, record: &Record) -> Result<(), TxError> {
    if !record.payload.is_object() && !record.payload.is_null() {
        debug!(
            "record {} has a non-object payload, skipping field indexing",
            record.uuid
        );
        return Ok(());
    }
    let uuid = record.uuid.to_string();
    for key in index_keys(record) {
        tx.insert(key.as_bytes(), uuid.as_bytes())?;
    }
    Ok(())
}

impl DbOperations {
    /// Evaluates a field predicate over the indexed records.
    ///
    /// Equality runs as a prefix scan over the equality index; the other
    /// operators scan the registry. Either way the predicate re-checks the
    /// loaded payload, so a stale index entry can widen the scan but never
    /// a result.
    pub fn search(&self, predicate: &FieldPredicate) -> MeshFsResult<Vec<Record>> {
        if predicate.op == PredicateOp::Eq {
            if let Some(token) = scalar_token(&predicate.value) {
                let prefix = format!(
                    "{}{}{}{}{}",
                    KEY_FIELD_INDEX, predicate.field, IDX_SEP, token, IDX_SEP
                );
                let mut out = Vec::new();
                for key in self.scan_keys(&prefix)? {
                    let uuid = &key[prefix.len()..];
                    if let Some(record) = self.get_record_by_uuid(uuid)? {
                        if predicate.matches(&record.payload) {
                            out.push(record);
                        }
                    }
                }
                return Ok(out);
            }
        }
        Ok(self
            .all_records()?
            .into_iter()
            .filter(|record| predicate.matches(&record.payload))
            .collect())
    }

    /// Token matching against the named field's text index. Every query
    /// token must match (as a token prefix) for a record to qualify.
    pub fn search_text(&self, field: &str, query: &str) -> MeshFsResult<Vec<Record>> {
        let tokens = text_tokens(query);
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let mut matched: Option<HashSet<String>> = None;
        for token in &tokens {
            let prefix = format!("{}{}{}{}", KEY_TEXT_INDEX, field, IDX_SEP, token);
            let mut uuids = HashSet::new();
            for key in self.scan_keys(&prefix)? {
                if let Some(idx) = key.rfind(IDX_SEP) {
                    uuids.insert(key[idx + 1..].to_string());
                }
            }
            matched = Some(match matched {
                Some(prev) => prev.intersection(&uuids).cloned().collect(),
                None => uuids,
            });
        }

        let mut out = Vec::new();
        let mut uuids: Vec<String> = matched.unwrap_or_default().into_iter().collect();
        uuids.sort();
        for uuid in uuids {
            if let Some(record) = self.get_record_by_uuid(&uuid)? {
                out.push(record);
            }
        }
        Ok(out)
    }

    /// Rebuilds every field/text index entry from the Object Registry.
    ///
    /// The old entries are dropped and the new ones written inside one
    /// transaction, so concurrent readers see either the old index or the
    /// fully rebuilt one. Running it twice with no intervening writes
    /// produces identical index contents.
    pub fn reindex(&self) -> MeshFsResult<u64> {
        let records = self.all_records()?;
        let mut old_keys = self.scan_keys(KEY_FIELD_INDEX)?;
        old_keys.extend(self.scan_keys(KEY_TEXT_INDEX)?);

        self.db()
            .transaction(|tx| {
                for key in &old_keys {
                    tx.remove(key.as_bytes())?;
                }
                for record in &records {
                    index_record_tx(tx, record)?;
                }
                Ok(())
            })
            .map_err(MeshFsError::from)?;
        self.db().flush()?;
        Ok(records.len() as u64)
    }

    /// All current index keys, sorted. Mostly useful for inspection and
    /// tests.
    pub fn index_entries(&self) -> MeshFsResult<Vec<String>> {
        let mut keys = self.scan_keys(KEY_FIELD_INDEX)?;
        keys.extend(self.scan_keys(KEY_TEXT_INDEX)?);
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_tokens_collapse_int_and_float_forms() {
        assert_eq!(scalar_token(&json!(3)), Some("3".to_string()));
        assert_eq!(scalar_token(&json!(3.0)), Some("3".to_string()));
        assert_eq!(scalar_token(&json!(3.5)), Some("3.5".to_string()));
        assert_eq!(scalar_token(&json!("3")), Some("3".to_string()));
        assert_eq!(scalar_token(&json!(null)), None);
        assert_eq!(scalar_token(&json!([1, 2])), None);
    }

    #[test]
    fn predicate_tolerates_missing_fields() {
        let predicate = FieldPredicate::new("value", PredicateOp::Eq, json!(2));
        assert!(predicate.matches(&json!({"value": 2})));
        assert!(predicate.matches(&json!({"value": 2.0})));
        assert!(!predicate.matches(&json!({"other": 2})));
        assert!(!predicate.matches(&json!({})));
    }

    #[test]
    fn predicate_orderings() {
        let lt = FieldPredicate::new("value", PredicateOp::Lt, json!(15));
        assert!(lt.matches(&json!({"value": 3.0})));
        assert!(!lt.matches(&json!({"value": 15})));
        let ge = FieldPredicate::new("name", PredicateOp::Ge, json!("m"));
        assert!(ge.matches(&json!({"name": "widget"})));
        assert!(!ge.matches(&json!({"name": "anvil"})));
    }

    #[test]
    fn text_tokens_lowercase_and_split() {
        assert_eq!(
            text_tokens("A widget, 1 data!"),
            vec!["1".to_string(), "a".to_string(), "data".to_string(), "widget".to_string()]
        );
    }
}
