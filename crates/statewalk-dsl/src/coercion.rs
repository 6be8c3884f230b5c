// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Type coercion for values extracted from responses.
//!
//! Headers and regex captures always produce strings, while the parameter they
//! feed may be declared as an integer. Values are converted to the JSON type
//! declared by the target schema when the conversion is lossless.
//!
//! # Supported Coercions
//!
//! | From | To | Example |
//! |------|-----|---------|
//! | String | integer | `"42"` → `42` |
//! | String | number | `"3.5"` → `3.5` |
//! | String | boolean | `"true"` → `true` |
//! | Number | string | `42` → `"42"` |
//! | Bool | string | `true` → `"true"` |
//!
//! Anything else is returned unchanged.

use serde_json::{Number, Value};

/// The JSON type declared by a schema.
///
/// Looks at `type` (first non-null entry when it is an array), then at the
/// first `anyOf` / `oneOf` / `allOf` branch that declares one.
pub fn schema_type(schema: &Value) -> Option<&str> {
    match schema.get("type") {
        Some(Value::String(t)) => return Some(t.as_str()),
        Some(Value::Array(types)) => {
            if let Some(t) = types.iter().filter_map(Value::as_str).find(|t| *t != "null") {
                return Some(t);
            }
        }
        _ => {}
    }
    ["anyOf", "oneOf", "allOf"]
        .iter()
        .filter_map(|key| schema.get(*key).and_then(Value::as_array))
        .flatten()
        .find_map(schema_type)
}

/// Coerce a value to the type declared by `schema`.
pub fn coerce_to_schema(value: Value, schema: &Value) -> Value {
    match schema_type(schema) {
        Some(type_name) => coerce_to_type(value, type_name),
        None => value,
    }
}

/// Coerce a value to a JSON Schema type name (`integer`, `number`, `boolean`, `string`).
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use statewalk_dsl::coercion::coerce_to_type;
///
/// assert_eq!(coerce_to_type(json!("42"), "integer"), json!(42));
/// assert_eq!(coerce_to_type(json!("abc"), "integer"), json!("abc"));
/// ```
pub fn coerce_to_type(value: Value, type_name: &str) -> Value {
    match (type_name, &value) {
        ("integer", Value::String(s)) => {
            let s = s.trim();
            s.parse::<i64>()
                .map(Number::from)
                .or_else(|_| s.parse::<u64>().map(Number::from))
                .map(Value::Number)
                .unwrap_or(value)
        }

        ("number", Value::String(s)) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .map(Number::from)
                .or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite())
                        .and_then(Number::from_f64)
                })
                .map(Value::Number)
                .unwrap_or(value)
        }

        ("boolean", Value::String(s)) => match s.trim() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => value,
        },

        ("string", Value::Number(n)) => Value::String(n.to_string()),
        ("string", Value::Bool(b)) => Value::String(b.to_string()),

        _ => value,
    }
}

/// Render a scalar as it appears in a URL, header or query string.
///
/// Strings are used verbatim, `null` is empty and structured values are
/// serialized as JSON.
pub fn to_parameter_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
