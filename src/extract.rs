// src/extract.rs
//! Field extraction from enriched-profile JSON documents. Shared between the
//! lookup-table populators and the Excel export.

use serde_json::Value;

/// Extract a top-level field as text. Arrays are joined with ", ", absent or
/// null fields read as an empty string.
pub fn scalar(json: &Value, field: &str) -> String {
    match json.get(field) {
        None | Some(Value::Null) => String::new(),
        Some(value) => stringify(value),
    }
}

/// Extract a field that may sit at the top level or exactly one level below
/// `parent`. The profile schema nests date parts (day/month/year) one level
/// under starts_at/ends_at, so a single level of descent is all this ever
/// needs; it deliberately does not recurse deeper.
pub fn nested(json: &Value, field: &str, parent: &str) -> Option<String> {
    if let Some(value) = json.get(field) {
        if !value.is_null() {
            return Some(stringify(value));
        }
    }

    match json.get(parent).and_then(|p| p.get(field)) {
        Some(Value::Null) | None => None,
        Some(value) => Some(stringify(value)),
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => items
            .iter()
            .map(stringify)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_string_and_number() {
        let profile = json!({"city": "Porto", "connections": 500});
        assert_eq!(scalar(&profile, "city"), "Porto");
        assert_eq!(scalar(&profile, "connections"), "500");
    }

    #[test]
    fn test_scalar_absent_or_null_is_blank() {
        let profile = json!({"city": null});
        assert_eq!(scalar(&profile, "city"), "");
        assert_eq!(scalar(&profile, "country"), "");
    }

    #[test]
    fn test_scalar_joins_arrays() {
        let profile = json!({"languages": ["Portuguese", "English"]});
        assert_eq!(scalar(&profile, "languages"), "Portuguese, English");
    }

    #[test]
    fn test_nested_top_level_hit() {
        let json = json!({"year": 2019, "starts_at": {"year": 2020}});
        assert_eq!(nested(&json, "year", "starts_at"), Some("2019".to_string()));
    }

    #[test]
    fn test_nested_one_level_descent() {
        let json = json!({"starts_at": {"year": 2020}});
        assert_eq!(nested(&json, "year", "starts_at"), Some("2020".to_string()));
    }

    #[test]
    fn test_nested_never_descends_two_levels() {
        let json = json!({"x": {"starts_at": {"year": 2020}}});
        assert_eq!(nested(&json, "year", "starts_at"), None);

        let json = json!({"a": {"b": {"c": 1}}});
        assert_eq!(nested(&json, "c", "b"), None);
    }

    #[test]
    fn test_nested_absent_everywhere() {
        let json = json!({"ends_at": {"month": 6}});
        assert_eq!(nested(&json, "year", "ends_at"), None);
    }
}
