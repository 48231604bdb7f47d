use serde_json::{Map, Value};

/// Drops top-level keys whose value is `null`. The inference service treats an
/// absent field differently from an explicit null.
pub fn strip_nulls(payload: Map<String, Value>) -> Map<String, Value> {
    payload
        .into_iter()
        .filter(|(_, value)| !value.is_null())
        .collect()
}

pub fn map_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{map_object, strip_nulls};

    #[test]
    fn strip_nulls_removes_only_null_keys() {
        let stripped = strip_nulls(map_object(json!({
            "image": "data:image/png;base64,AAAA",
            "mask": null,
            "empty": "",
            "flag": false,
        })));
        assert_eq!(
            serde_json::Value::Object(stripped),
            json!({"image": "data:image/png;base64,AAAA", "empty": "", "flag": false})
        );
    }

    #[test]
    fn map_object_of_non_object_is_empty() {
        assert!(map_object(json!([1, 2])).is_empty());
    }
}
