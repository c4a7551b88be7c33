//! Deep merge of options mappings.

use serde_json::{Map, Value};

/// Merges `high` over `low`.
///
/// For a key present on both sides:
/// - two objects merge recursively
/// - two arrays concatenate, `low` first
/// - anything else takes the value from `high`
///
/// Keys present on one side only pass through unchanged.
#[must_use]
pub fn merge(low: Map<String, Value>, high: Map<String, Value>) -> Map<String, Value> {
    let mut merged = low;
    for (key, high_value) in high {
        let value = match merged.remove(&key) {
            Some(low_value) => merge_values(low_value, high_value),
            None => high_value,
        };
        merged.insert(key, value);
    }
    merged
}

fn merge_values(low: Value, high: Value) -> Value {
    match (low, high) {
        (Value::Object(low), Value::Object(high)) => Value::Object(merge(low, high)),
        (Value::Array(mut low), Value::Array(high)) => {
            low.extend(high);
            Value::Array(low)
        }
        (_, high) => high,
    }
}
