// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Link Schema Generation
//!
//! Generates JSON Schema for link definitions from the Rust type definitions.
//! The schema is derived from schema_types.rs using schemars.

use schemars::schema_for;
use serde_json::Value;

use crate::{DSL_VERSION, HttpMethod, Link, ParameterLocation};

/// Generate the schema of a list of links, with version metadata
pub fn generate_link_schema() -> Value {
    let schema = schema_for!(Vec<Link>);
    let mut schema_json = serde_json::to_value(&schema).unwrap_or(Value::Null);

    if let Value::Object(ref mut map) = schema_json {
        // Enumerations useful to consumers even where no link field references them
        if let Some(Value::Object(definitions)) = map.get_mut("definitions") {
            definitions.insert(
                "HttpMethod".to_string(),
                serde_json::to_value(&schema_for!(HttpMethod).schema).unwrap_or(Value::Null),
            );
            definitions
                .entry("ParameterLocation")
                .or_insert_with(|| {
                    serde_json::to_value(&schema_for!(ParameterLocation).schema)
                        .unwrap_or(Value::Null)
                });
        }
        map.insert(
            "x-dsl-version".to_string(),
            Value::String(DSL_VERSION.to_string()),
        );
    }

    schema_json
}
