//! Decoding of FeatureScript values returned by part-studio evaluation.
//!
//! Evaluation results come back as a tree of typed nodes, e.g.
//!
//! ```text
//! { "btType": "BTFSValueMap-2062", "value": [
//!     { "key":   { "btType": "BTFSValueString-1422", "value": "valid" },
//!       "value": { "btType": "BTFSValueBoolean-1195", "value": true } } ] }
//! ```
//!
//! which decodes to `{ "valid": true }`. The numeric suffix after the dash
//! is a serialization version and is ignored.

use matecraft_core::{MateError, Result};
use serde_json::{Map, Value};

fn kind(node: &Value) -> Result<&str> {
    let bt_type = node
        .get("btType")
        .or_else(|| node.get("type"))
        .and_then(Value::as_str)
        .ok_or_else(|| MateError::MalformedResponse("FeatureScript value without `btType`".to_string()))?;
    Ok(bt_type.split('-').next().unwrap_or(bt_type))
}

fn inner(node: &Value) -> &Value {
    node.get("value").unwrap_or(&Value::Null)
}

/// Convert a FeatureScript value tree into plain JSON.
pub fn decode(node: &Value) -> Result<Value> {
    match kind(node)? {
        "BTFSValueMap" => {
            let mut map = Map::new();
            for entry in inner(node).as_array().map(Vec::as_slice).unwrap_or_default() {
                let key = match entry.get("key").map(decode).transpose()? {
                    Some(Value::String(s)) => s,
                    Some(other) => other.to_string(),
                    None => return Err(MateError::MalformedResponse("map entry without `key`".to_string())),
                };
                let value = entry.get("value").map(decode).transpose()?.unwrap_or(Value::Null);
                map.insert(key, value);
            }
            Ok(Value::Object(map))
        }
        "BTFSValueArray" => inner(node)
            .as_array()
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .map(decode)
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        "BTFSValueString" | "BTFSValueBoolean" | "BTFSValueNumber" => Ok(inner(node).clone()),
        "BTFSValueUndefined" => Ok(Value::Null),
        other => Err(MateError::MalformedResponse(format!(
            "unsupported FeatureScript value `{other}`"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn string(s: &str) -> Value {
        json!({ "btType": "BTFSValueString-1422", "value": s })
    }

    fn entry(key: &str, value: Value) -> Value {
        json!({ "key": string(key), "value": value })
    }

    #[test]
    fn test_decode_nested_map() {
        let node = json!({
            "btType": "BTFSValueMap-2062",
            "value": [
                entry("valid", json!({ "btType": "BTFSValueBoolean-1195", "value": true })),
                entry("mirrors", json!({ "btType": "BTFSValueArray-1499", "value": [
                    { "btType": "BTFSValueMap-2062", "value": [
                        entry("endMateId", string("C2")),
                        entry("mateToOrigin", json!({ "btType": "BTFSValueBoolean-1195", "value": false })),
                        entry("startMateId", string("C1")),
                    ]}
                ]})),
                entry("count", json!({ "btType": "BTFSValueNumber-772", "value": 2.0 })),
                entry("missing", json!({ "btType": "BTFSValueUndefined-2003" })),
            ]
        });

        assert_eq!(
            decode(&node).unwrap(),
            json!({
                "valid": true,
                "mirrors": [{ "endMateId": "C2", "mateToOrigin": false, "startMateId": "C1" }],
                "count": 2.0,
                "missing": null,
            })
        );
    }

    #[test]
    fn test_unknown_type_is_malformed() {
        let err = decode(&json!({ "btType": "BTFSValueTooFancy-1" })).unwrap_err();
        assert!(matches!(err, MateError::MalformedResponse(_)));
    }

    #[test]
    fn test_missing_type_is_malformed() {
        assert!(decode(&json!({ "value": 1 })).is_err());
    }
}
