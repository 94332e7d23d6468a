//! Loose readers for upstream JSON, which mixes numbers, numeric strings
//! and 0/1 flags freely.

use serde_json::Value;

/// Truthiness as the upstream API means it: `true`, non-zero numbers,
/// non-empty strings other than `"0"`, non-empty containers.
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty() && s != "0",
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}

/// Stringify an identifier that may arrive as a number or a string.
pub fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn truthiness_follows_upstream_flags() {
        assert!(is_truthy(Some(&json!(1))));
        assert!(is_truthy(Some(&json!(true))));
        assert!(is_truthy(Some(&json!("yes"))));
        assert!(!is_truthy(Some(&json!(0))));
        assert!(!is_truthy(Some(&json!("0"))));
        assert!(!is_truthy(Some(&json!(""))));
        assert!(!is_truthy(Some(&Value::Null)));
        assert!(!is_truthy(None));
    }

    #[test]
    fn identifiers_read_from_numbers_and_strings() {
        assert_eq!(value_to_string(&json!(123)), Some("123".to_string()));
        assert_eq!(value_to_string(&json!("abc")), Some("abc".to_string()));
        assert_eq!(value_to_string(&json!(null)), None);
        assert_eq!(value_as_i64(&json!("-100")), Some(-100));
        assert_eq!(value_as_i64(&json!(1.5)), None);
    }
}
