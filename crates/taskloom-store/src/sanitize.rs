use serde_json::{Map, Value};

/// Scrub a point payload before upsert.
///
/// Drops empty-string fields, and drops `null` except for keys on the
/// allow-list (absent-parent markers must survive as explicit nulls).
/// Everything falsy-but-meaningful survives verbatim: `0`, `false`,
/// `"0"`, empty arrays, nested objects.
pub fn sanitize_payload(payload: Value, null_allow_list: &[&str]) -> Map<String, Value> {
    let Value::Object(fields) = payload else {
        return Map::new();
    };

    fields
        .into_iter()
        .filter(|(key, value)| match value {
            Value::Null => null_allow_list.contains(&key.as_str()),
            Value::String(s) => !s.is_empty(),
            _ => true,
        })
        .collect()
}

/// Default allow-list: hierarchy fields where null means "known to be
/// absent" rather than "unknown".
pub const NULL_ALLOWED_FIELDS: &[&str] = &["parent_task_id", "root_task_id"];

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn drops_empty_strings_and_stray_nulls() {
        let out = sanitize_payload(
            json!({
                "title": "",
                "mode": null,
                "workspace": "/w"
            }),
            NULL_ALLOWED_FIELDS,
        );
        assert!(!out.contains_key("title"));
        assert!(!out.contains_key("mode"));
        assert_eq!(out["workspace"], "/w");
    }

    #[test]
    fn preserves_falsy_but_meaningful_values() {
        let out = sanitize_payload(
            json!({
                "count": 0,
                "is_completed": false,
                "zero_string": "0",
                "tags": [],
                "nested": {"inner": null}
            }),
            NULL_ALLOWED_FIELDS,
        );
        assert_eq!(out["count"], 0);
        assert_eq!(out["is_completed"], false);
        assert_eq!(out["zero_string"], "0");
        assert_eq!(out["tags"], json!([]));
        // Nested objects pass through verbatim; only top level is scrubbed
        assert_eq!(out["nested"], json!({"inner": null}));
    }

    #[test]
    fn allow_listed_nulls_survive() {
        let out = sanitize_payload(
            json!({
                "parent_task_id": null,
                "root_task_id": null,
                "other": null
            }),
            NULL_ALLOWED_FIELDS,
        );
        assert_eq!(out["parent_task_id"], Value::Null);
        assert_eq!(out["root_task_id"], Value::Null);
        assert!(!out.contains_key("other"));
    }

    #[test]
    fn non_object_payload_yields_empty_map() {
        assert!(sanitize_payload(json!("scalar"), NULL_ALLOWED_FIELDS).is_empty());
    }
}
