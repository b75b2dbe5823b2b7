//! Payload helpers shared across the shape components.

use rustc_hash::FxHashMap;
use serde_json::{Map, Value};

use crate::component::Payload;

/// Creates an empty payload with the crate's standard hasher.
pub fn new_payload() -> Payload {
    FxHashMap::default()
}

/// Python-style truthiness over JSON values.
///
/// Null, `false`, numeric zero, empty strings, and empty collections are
/// falsy; everything else is truthy. Branch selection depends on this.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Converts a payload into a JSON object value with keys sorted, so equal
/// payloads always produce identical values.
pub fn payload_to_value(payload: &Payload) -> Value {
    let mut map = Map::with_capacity(payload.len());
    let mut keys: Vec<&String> = payload.keys().collect();
    keys.sort();
    for key in keys {
        map.insert(key.clone(), payload[key].clone());
    }
    Value::Object(map)
}

/// Converts a JSON object value back into a payload. Non-objects yield `None`.
pub fn value_to_payload(value: &Value) -> Option<Payload> {
    match value {
        Value::Object(map) => {
            let mut payload = new_payload();
            for (k, v) in map {
                payload.insert(k.clone(), v.clone());
            }
            Some(payload)
        }
        _ => None,
    }
}

/// Shallow-merges `update` into `acc`: keys accumulate, later writers win,
/// unrelated keys are never dropped.
pub fn merge_into(acc: &mut Payload, update: Payload) {
    for (k, v) in update {
        acc.insert(k, v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn truthiness_follows_python_rules() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!(0.0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!([])));
        assert!(!is_truthy(&json!({})));
        assert!(is_truthy(&json!(true)));
        assert!(is_truthy(&json!(1)));
        assert!(is_truthy(&json!("no")));
        assert!(is_truthy(&json!([0])));
    }

    #[test]
    fn merge_overwrites_but_never_drops() {
        let mut acc = new_payload();
        acc.insert("a".into(), json!(1));
        acc.insert("b".into(), json!(2));
        let mut update = new_payload();
        update.insert("b".into(), json!(3));
        update.insert("c".into(), json!(4));
        merge_into(&mut acc, update);
        assert_eq!(acc["a"], json!(1));
        assert_eq!(acc["b"], json!(3));
        assert_eq!(acc["c"], json!(4));
    }

    #[test]
    fn payload_value_round_trip() {
        let mut payload = new_payload();
        payload.insert("x".into(), json!({"nested": true}));
        let value = payload_to_value(&payload);
        assert_eq!(value_to_payload(&value), Some(payload));
        assert_eq!(value_to_payload(&json!([1])), None);
    }
}
