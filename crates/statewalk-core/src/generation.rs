// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Generation primitive seam.
//!
//! The engine only needs a source of schema-shaped values: [`ValueGenerator`]
//! hands out a lazy, seeded sequence of candidates per schema. The same seed
//! always yields the same sequence, so a sequence can be restarted by asking
//! again.
//!
//! [`SchemaValueGenerator`] is a small built-in implementation covering the
//! common JSON Schema keywords.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::{Map, Value, json};
use statewalk_dsl::coercion::schema_type;

/// Whether generated values should satisfy the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    #[default]
    Positive,
    /// Values of the wrong type
    Negative,
}

/// Lazily produces candidate values for a schema.
pub trait ValueGenerator: Send + Sync {
    /// Seeded, endless sequence of candidates for `schema`.
    fn candidates<'a>(
        &'a self,
        schema: &'a Value,
        mode: GenerationMode,
        seed: u64,
    ) -> Box<dyn Iterator<Item = Value> + Send + 'a>;

    /// First candidate of the sequence.
    fn generate(&self, schema: &Value, mode: GenerationMode, seed: u64) -> Option<Value> {
        self.candidates(schema, mode, seed).next()
    }
}

/// Random values following `type`, `enum`, `const`, bounds and composition keywords.
#[derive(Debug, Clone)]
pub struct SchemaValueGenerator {
    /// Maximum array length
    pub max_items: usize,
    /// Maximum nesting depth of objects and arrays
    pub max_depth: usize,
}

impl Default for SchemaValueGenerator {
    fn default() -> Self {
        Self {
            max_items: 3,
            max_depth: 4,
        }
    }
}

impl ValueGenerator for SchemaValueGenerator {
    fn candidates<'a>(
        &'a self,
        schema: &'a Value,
        mode: GenerationMode,
        seed: u64,
    ) -> Box<dyn Iterator<Item = Value> + Send + 'a> {
        let mut rng = StdRng::seed_from_u64(seed);
        Box::new(std::iter::from_fn(move || {
            Some(match mode {
                GenerationMode::Positive => self.value(schema, &mut rng, 0),
                GenerationMode::Negative => self.invalid(schema, &mut rng),
            })
        }))
    }
}

impl SchemaValueGenerator {
    fn value(&self, schema: &Value, rng: &mut StdRng, depth: usize) -> Value {
        if let Some(constant) = schema.get("const") {
            return constant.clone();
        }
        if let Some(choices) = schema.get("enum").and_then(Value::as_array)
            && let Some(choice) = choices.choose(rng)
        {
            return choice.clone();
        }
        for keyword in ["anyOf", "oneOf"] {
            if let Some(branches) = schema.get(keyword).and_then(Value::as_array)
                && let Some(branch) = branches.choose(rng)
            {
                return self.value(branch, rng, depth);
            }
        }
        if let Some(branches) = schema.get("allOf").and_then(Value::as_array) {
            return self.value(&merge_all_of(branches), rng, depth);
        }

        match schema_type(schema).unwrap_or_else(|| guess_type(schema)) {
            "integer" => {
                let (min, max) = integer_bounds(schema);
                json!(rng.gen_range(min..=max))
            }
            "number" => {
                let min = schema.get("minimum").and_then(Value::as_f64).unwrap_or(0.0);
                let max = schema
                    .get("maximum")
                    .and_then(Value::as_f64)
                    .unwrap_or(min + 1000.0)
                    .max(min);
                json!(rng.gen_range(min..=max))
            }
            "boolean" => json!(rng.gen_bool(0.5)),
            "null" => Value::Null,
            "array" if depth < self.max_depth => {
                let items = schema.get("items").cloned().unwrap_or(json!({}));
                let min = schema.get("minItems").and_then(Value::as_u64).unwrap_or(0) as usize;
                let max = schema
                    .get("maxItems")
                    .and_then(Value::as_u64)
                    .map(|m| m as usize)
                    .unwrap_or(self.max_items)
                    .max(min);
                let len = rng.gen_range(min..=max.min(min.max(self.max_items)));
                Value::Array(
                    (0..len)
                        .map(|_| self.value(&items, rng, depth + 1))
                        .collect(),
                )
            }
            "object" if depth < self.max_depth => {
                let required: Vec<&str> = schema
                    .get("required")
                    .and_then(Value::as_array)
                    .map(|r| r.iter().filter_map(Value::as_str).collect())
                    .unwrap_or_default();
                let mut object = Map::new();
                if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
                    for (name, property) in properties {
                        if required.contains(&name.as_str()) || rng.gen_bool(0.5) {
                            object.insert(name.clone(), self.value(property, rng, depth + 1));
                        }
                    }
                }
                Value::Object(object)
            }
            "array" => json!([]),
            "object" => json!({}),
            _ => Value::String(string_value(schema, rng)),
        }
    }

    fn invalid(&self, schema: &Value, rng: &mut StdRng) -> Value {
        match schema_type(schema).unwrap_or_else(|| guess_type(schema)) {
            "integer" | "number" => json!(["not-a-number", "", "1e999"].choose(rng)),
            "boolean" => json!("maybe"),
            "array" => json!({"unexpected": true}),
            "object" => json!([rng.r#gen::<u8>()]),
            _ => json!(rng.r#gen::<i32>()),
        }
    }
}

fn guess_type(schema: &Value) -> &'static str {
    if schema.get("properties").is_some() {
        "object"
    } else if schema.get("items").is_some() {
        "array"
    } else {
        "string"
    }
}

fn integer_bounds(schema: &Value) -> (i64, i64) {
    let mut min = schema.get("minimum").and_then(Value::as_i64).unwrap_or(1);
    let mut max = schema
        .get("maximum")
        .and_then(Value::as_i64)
        .unwrap_or(min.saturating_add(10_000));
    if let Some(exclusive) = schema.get("exclusiveMinimum").and_then(Value::as_i64) {
        min = exclusive.saturating_add(1);
    }
    if let Some(exclusive) = schema.get("exclusiveMaximum").and_then(Value::as_i64) {
        max = exclusive.saturating_sub(1);
    }
    (min, max.max(min))
}

fn string_value(schema: &Value, rng: &mut StdRng) -> String {
    match schema.get("format").and_then(Value::as_str) {
        Some("uuid") => uuid::Builder::from_random_bytes(rng.r#gen()).into_uuid().to_string(),
        Some("date-time") => "2024-01-01T00:00:00Z".to_string(),
        Some("date") => "2024-01-01".to_string(),
        Some("email") => format!("user{}@example.com", rng.gen_range(0..10_000)),
        _ => {
            let min = schema.get("minLength").and_then(Value::as_u64).unwrap_or(1) as usize;
            let max = schema
                .get("maxLength")
                .and_then(Value::as_u64)
                .map(|m| m as usize)
                .unwrap_or(min + 8)
                .max(min);
            let len = rng.gen_range(min..=max.min(min + 32));
            (0..len)
                .map(|_| char::from(rng.gen_range(b'a'..=b'z')))
                .collect()
        }
    }
}

fn merge_all_of(branches: &[Value]) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for branch in branches {
        if let Some(props) = branch.get("properties").and_then(Value::as_object) {
            properties.extend(props.clone());
        }
        if let Some(r) = branch.get("required").and_then(Value::as_array) {
            required.extend(r.iter().cloned());
        }
    }
    if properties.is_empty() {
        return branches.first().cloned().unwrap_or(json!({}));
    }
    json!({"type": "object", "properties": properties, "required": required})
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generate(schema: Value, seed: u64) -> Value {
        SchemaValueGenerator::default()
            .generate(&schema, GenerationMode::Positive, seed)
            .unwrap()
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let generator = SchemaValueGenerator::default();
        let schema = json!({"type": "object", "properties": {"id": {"type": "integer"}, "name": {"type": "string"}}});
        let first: Vec<Value> = generator
            .candidates(&schema, GenerationMode::Positive, 7)
            .take(5)
            .collect();
        let second: Vec<Value> = generator
            .candidates(&schema, GenerationMode::Positive, 7)
            .take(5)
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_integer_bounds() {
        for seed in 0..50 {
            let value = generate(json!({"type": "integer", "minimum": 5, "maximum": 9}), seed);
            let n = value.as_i64().unwrap();
            assert!((5..=9).contains(&n));
        }
    }

    #[test]
    fn test_enum_const_and_required() {
        assert_eq!(generate(json!({"const": "fixed"}), 1), json!("fixed"));
        let value = generate(json!({"enum": ["a", "b"]}), 1);
        assert!(value == json!("a") || value == json!("b"));

        let object = generate(
            json!({
                "type": "object",
                "required": ["name"],
                "properties": {"name": {"type": "string", "minLength": 3, "maxLength": 3}}
            }),
            3,
        );
        assert_eq!(object["name"].as_str().unwrap().len(), 3);
    }

    #[test]
    fn test_all_of_is_merged() {
        let value = generate(
            json!({"allOf": [
                {"type": "object", "required": ["a"], "properties": {"a": {"type": "boolean"}}},
                {"type": "object", "required": ["b"], "properties": {"b": {"type": "integer"}}}
            ]}),
            11,
        );
        assert!(value["a"].is_boolean());
        assert!(value["b"].is_i64());
    }

    #[test]
    fn test_negative_mode_breaks_type() {
        let generator = SchemaValueGenerator::default();
        let value = generator
            .generate(&json!({"type": "integer"}), GenerationMode::Negative, 0)
            .unwrap();
        assert!(!value.is_i64());
    }

    #[test]
    fn test_uuid_format() {
        let value = generate(json!({"type": "string", "format": "uuid"}), 2);
        assert!(uuid::Uuid::parse_str(value.as_str().unwrap()).is_ok());
    }
}
