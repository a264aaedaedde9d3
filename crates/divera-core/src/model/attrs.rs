// Lenient accessors for vendor attribute bags.
//
// Divera mixes numbers, numeric strings and 0/1 flags for the same field
// depending on endpoint and account type.

use serde_json::{Map, Value};

/// Attribute bag of one record, exactly as delivered.
pub type Attributes = Map<String, Value>;

pub(crate) fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_u64().map(|v| v != 0),
        Value::String(s) => match s.trim() {
            "1" | "true" => Some(true),
            "0" | "false" | "" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Non-empty string value.
pub(crate) fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn u64_field(attrs: &Attributes, key: &str) -> Option<u64> {
    attrs.get(key).and_then(as_u64)
}

pub(crate) fn f64_field(attrs: &Attributes, key: &str) -> Option<f64> {
    attrs.get(key).and_then(as_f64)
}

pub(crate) fn bool_field(attrs: &Attributes, key: &str) -> Option<bool> {
    attrs.get(key).and_then(as_bool)
}

pub(crate) fn text_field(attrs: &Attributes, key: &str) -> Option<String> {
    attrs.get(key).and_then(as_text)
}

/// Coordinates, with Divera's `0/0` placeholder treated as absent.
pub(crate) fn coordinates(attrs: &Attributes) -> Option<(f64, f64)> {
    let lat = f64_field(attrs, "lat")?;
    let lng = f64_field(attrs, "lng")?;
    if lat.abs() < f64::EPSILON && lng.abs() < f64::EPSILON {
        None
    } else {
        Some((lat, lng))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lenient_scalars() {
        assert_eq!(as_u64(&json!("17")), Some(17));
        assert_eq!(as_u64(&json!(-1)), None);
        assert_eq!(as_f64(&json!("52.5")), Some(52.5));
        assert_eq!(as_bool(&json!(1)), Some(true));
        assert_eq!(as_bool(&json!("false")), Some(false));
        assert_eq!(as_text(&json!("  ")), None);
    }

    #[test]
    fn zero_coordinates_are_absent() {
        let attrs = json!({"lat": 0, "lng": 0}).as_object().cloned().unwrap_or_default();
        assert_eq!(coordinates(&attrs), None);
        let attrs = json!({"lat": "52.1", "lng": 13.4}).as_object().cloned().unwrap_or_default();
        assert_eq!(coordinates(&attrs), Some((52.1, 13.4)));
    }
}
