//! Helpers shared by the API-to-row converters.
//!
//! Converters map API payloads to rows field by field. Two rules apply everywhere: blank strings
//! become `None` for nullable columns, and ordered children get a 1-based position taken from the
//! order of the API array. The JSON bridge is reserved for payloads with dynamic maps.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{CoreError, CoreResult};

/// Returns `None` for empty and whitespace-only strings.
#[must_use]
pub fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

#[must_use]
pub fn non_blank_str(value: &str) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value.to_owned())
    }
}

/// ## Summary
/// Pairs each item with its 1-based position.
pub fn positions<T>(items: impl IntoIterator<Item = T>) -> impl Iterator<Item = (i32, T)> {
    (1..).zip(items)
}

/// ## Summary
/// Replaces blank strings with `null`, recursively.
pub fn strip_blank(value: &mut Value) {
    match value {
        Value::String(s) if s.trim().is_empty() => *value = Value::Null,
        Value::Array(items) => items.iter_mut().for_each(strip_blank),
        Value::Object(fields) => fields.values_mut().for_each(strip_blank),
        _ => {}
    }
}

/// ## Summary
/// Converts a dynamic JSON payload into a typed value after stripping blank strings.
///
/// ## Errors
/// Returns [`CoreError::ValidationError`] if the payload does not match `T`.
pub fn json_bridge<T: DeserializeOwned>(mut value: Value) -> CoreResult<T> {
    strip_blank(&mut value);
    serde_json::from_value(value).map_err(|e| CoreError::ValidationError(e.to_string()))
}

/// ## Summary
/// Flattens a dynamic map into `(dotted.name, value)` pairs, skipping nulls and blanks.
///
/// Nested objects contribute dotted names; arrays contribute their 1-based index.
#[must_use]
pub fn flatten_fields(value: &Value) -> Vec<(String, String)> {
    let mut out = Vec::new();
    flatten_into(&mut out, None, value);
    out
}

fn flatten_into(out: &mut Vec<(String, String)>, prefix: Option<&str>, value: &Value) {
    let join = |key: &str| match prefix {
        Some(prefix) => format!("{prefix}.{key}"),
        None => key.to_owned(),
    };

    match value {
        Value::Null => {}
        Value::String(s) => {
            if let (Some(name), Some(s)) = (prefix, non_blank_str(s)) {
                out.push((name.to_owned(), s));
            }
        }
        Value::Bool(_) | Value::Number(_) => {
            if let Some(name) = prefix {
                out.push((name.to_owned(), value.to_string()));
            }
        }
        Value::Array(items) => {
            for (position, item) in positions(items) {
                flatten_into(out, Some(&join(&position.to_string())), item);
            }
        }
        Value::Object(fields) => {
            for (key, item) in fields {
                flatten_into(out, Some(&join(key)), item);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Payee {
        name: Option<String>,
        inn: Option<String>,
    }

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(Some("  ".to_owned())), None);
        assert_eq!(non_blank(Some(String::new())), None);
        assert_eq!(non_blank(Some("x".to_owned())), Some("x".to_owned()));
        assert_eq!(non_blank_str("\t"), None);
    }

    #[test]
    fn test_positions_are_one_based() {
        let got: Vec<_> = positions(["a", "b", "c"]).collect();
        assert_eq!(got, vec![(1, "a"), (2, "b"), (3, "c")]);
    }

    #[test]
    fn test_json_bridge_nulls_blank_strings() {
        let payee: Payee = json_bridge(json!({"name": " ", "inn": "7710140679"})).unwrap();
        assert_eq!(
            payee,
            Payee {
                name: None,
                inn: Some("7710140679".to_owned())
            }
        );
    }

    #[test]
    fn test_strip_blank_is_idempotent() {
        let mut once = json!({"a": "", "b": ["", "x", {"c": "  "}]});
        strip_blank(&mut once);
        let mut twice = once.clone();
        strip_blank(&mut twice);
        assert_eq!(once, twice);
        assert_eq!(once, json!({"a": null, "b": [null, "x", {"c": null}]}));
    }

    #[test]
    fn test_flatten_fields() {
        let mut fields = flatten_fields(&json!({
            "bankContract": "40817810",
            "empty": "",
            "amount": 12.5,
            "addressee": {"name": "Ivan", "card": null},
            "tags": ["a", "b"],
        }));
        fields.sort();

        assert_eq!(
            fields,
            vec![
                ("addressee.name".to_owned(), "Ivan".to_owned()),
                ("amount".to_owned(), "12.5".to_owned()),
                ("bankContract".to_owned(), "40817810".to_owned()),
                ("tags.1".to_owned(), "a".to_owned()),
                ("tags.2".to_owned(), "b".to_owned()),
            ]
        );
    }
}
