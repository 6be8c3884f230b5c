// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Static dependency inference.
//!
//! Works purely on the catalog: every successful response is reduced to a
//! [`ResourceDescriptor`] (which resource it returns, where, and how many),
//! then each descriptor is matched against the parameters and body
//! properties of the other operations using the naming heuristics.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use statewalk_dsl::{
    Composite, Expression, Link, LinkOrigin, LinkParameter, Operation, OperationKey,
    ParameterLocation, StatusPattern, paths,
};
use tracing::{debug, info};

use super::naming::{self, FieldMatch};
use crate::catalog::Catalog;

/// Array fields that hold the payload of a paginated or wrapped response.
const COLLECTION_FIELDS: &[&str] = &[
    "data", "items", "results", "value", "content", "elements", "records", "list",
];

/// Fields that carry metadata next to the payload.
const METADATA_FIELDS: &[&str] = &["links", "errors", "meta", "_links"];

/// How many resources a response carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

/// The resource a successful response returns.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDescriptor {
    pub operation: OperationKey,
    pub status: StatusPattern,
    /// Resource type, e.g. `User`
    pub resource: String,
    /// Pointer to the resource (or the array of resources) inside the body; empty for the root
    pub pointer: String,
    pub cardinality: Cardinality,
    /// Field names of one resource
    pub fields: Vec<String>,
}

impl ResourceDescriptor {
    /// Pointer to `field` of the resource; for collections, of the first element.
    pub fn field_pointer(&self, field: &str) -> String {
        match self.cardinality {
            Cardinality::One => format!("{}/{}", self.pointer, escape_pointer_token(field)),
            Cardinality::Many => format!("{}/0/{}", self.pointer, escape_pointer_token(field)),
        }
    }
}

/// Encode `~` and `/` for use in a JSON pointer token.
pub fn escape_pointer_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

/// Descriptors of every successful response in the catalog.
pub fn resource_descriptors(catalog: &Catalog) -> Vec<ResourceDescriptor> {
    catalog
        .operations()
        .iter()
        .flat_map(|operation| {
            operation
                .successful_responses()
                .filter_map(move |response| {
                    describe_response(operation, &response.status, response.schema.as_ref()?)
                })
        })
        .collect()
}

/// Reduce one response schema to a descriptor.
///
/// A lone `data` property and pagination wrappers are unwrapped one level and
/// `allOf` / `oneOf` / `anyOf` branches are merged, so a field present in any
/// branch counts.
pub fn describe_response(
    operation: &Operation,
    status: &StatusPattern,
    schema: &Value,
) -> Option<ResourceDescriptor> {
    let mut pointer = String::new();
    let mut schema = flatten(schema);

    let properties = object_properties(&schema);
    if properties.len() == 1
        && let Some(data) = properties.get("data")
    {
        pointer.push_str("/data");
        schema = flatten(data);
    }

    let mut cardinality = Cardinality::One;
    if is_array(&schema) {
        cardinality = Cardinality::Many;
        schema = flatten(schema.get("items").unwrap_or(&Value::Null));
    } else if let Some((field, items)) = collection_field(&schema, &operation.path) {
        pointer.push('/');
        pointer.push_str(&field);
        cardinality = Cardinality::Many;
        schema = flatten(&items);
    }

    let fields: Vec<String> = object_properties(&schema).keys().cloned().collect();
    if fields.is_empty() {
        return None;
    }

    let resource = schema
        .get("title")
        .and_then(Value::as_str)
        .map(naming::to_pascal_case)
        .or_else(|| naming::from_path(&operation.path))?;

    Some(ResourceDescriptor {
        operation: operation.key.clone(),
        status: status.clone(),
        resource,
        pointer,
        cardinality,
        fields,
    })
}

/// Merge composition branches into one object schema.
fn flatten(schema: &Value) -> Value {
    let Some(object) = schema.as_object() else {
        return schema.clone();
    };
    let branches: Vec<&Value> = ["allOf", "oneOf", "anyOf"]
        .iter()
        .filter_map(|key| object.get(*key).and_then(Value::as_array))
        .flatten()
        .collect();
    if branches.is_empty() {
        return schema.clone();
    }

    let mut merged = object.clone();
    for key in ["allOf", "oneOf", "anyOf"] {
        merged.remove(key);
    }
    let mut properties = match merged.remove("properties") {
        Some(Value::Object(p)) => p,
        _ => Map::new(),
    };
    for branch in branches {
        let branch = flatten(branch);
        if let Some(Value::Object(branch_properties)) = branch.get("properties") {
            for (name, property) in branch_properties {
                properties
                    .entry(name.clone())
                    .or_insert_with(|| property.clone());
            }
        }
        for key in ["type", "items", "title"] {
            if !merged.contains_key(key)
                && let Some(value) = branch.get(key)
            {
                merged.insert(key.to_string(), value.clone());
            }
        }
    }
    if !properties.is_empty() {
        merged.insert("properties".to_string(), Value::Object(properties));
    }
    Value::Object(merged)
}

fn object_properties(schema: &Value) -> Map<String, Value> {
    schema
        .get("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

fn is_array(schema: &Value) -> bool {
    schema.get("type").and_then(Value::as_str) == Some("array")
        || (schema.get("items").is_some() && schema.get("properties").is_none())
}

/// Escaped pointer suffix of the array holding the payload, with its item schema.
fn collection_field(schema: &Value, path: &str) -> Option<(String, Value)> {
    let properties = object_properties(schema);

    // HAL: {"_embedded": {"users": [...]}}
    if let Some(embedded) = properties.get("_embedded").map(flatten) {
        let nested = object_properties(&embedded);
        if let Some((name, array)) = nested.iter().find(|(_, s)| is_array(&flatten(s))) {
            let items = flatten(array).get("items").cloned().unwrap_or(Value::Null);
            return Some((format!("_embedded/{}", escape_pointer_token(name)), items));
        }
    }

    let arrays: Vec<(&String, Value)> = properties
        .iter()
        .filter(|(name, _)| !METADATA_FIELDS.contains(&name.as_str()))
        .map(|(name, s)| (name, flatten(s)))
        .filter(|(_, s)| is_array(s))
        .collect();
    let [(name, array)] = arrays.as_slice() else {
        return None;
    };

    let lower = name.to_ascii_lowercase();
    let plural_of_path = naming::from_path(path).map(|r| naming::normalize(&r));
    let named_after_resource = plural_of_path
        .is_some_and(|resource| naming::normalize(&naming::to_singular(&lower)) == resource);
    if !COLLECTION_FIELDS.contains(&lower.as_str()) && !named_after_resource {
        return None;
    }
    let items = array.get("items").cloned().unwrap_or(Value::Null);
    Some((escape_pointer_token(name), items))
}

/// Infer links between operations from the catalog alone.
///
/// For every descriptor and every other operation, each parameter and each
/// top-level JSON body property is matched against the descriptor's fields.
/// Path parameters are accepted when they name the same resource, or when
/// the field matches exactly and is specific enough (`ownerId`, not `id`).
/// Query, header and cookie parameters and body properties must name their
/// resource themselves (`userId`, `user_id`). All inputs fed by the same
/// `(source, status, target)` are merged into one link named after the
/// target, e.g. `GetOrder`; body properties become an object template that
/// is merged into the generated body.
pub fn infer_static(catalog: &Catalog) -> Vec<Link> {
    let descriptors = resource_descriptors(catalog);
    let mut grouped: BTreeMap<(usize, usize), InferredInputs> = BTreeMap::new();

    for (d, descriptor) in descriptors.iter().enumerate() {
        for (c, consumer) in catalog.operations().iter().enumerate() {
            if consumer.key == descriptor.operation {
                continue;
            }
            for parameter in &consumer.parameters {
                let named = parameter.location != ParameterLocation::Path;
                let name = match parameter.location {
                    ParameterLocation::Header => strip_extension_prefix(&parameter.name),
                    _ => parameter.name.as_str(),
                };
                let Some(field) = match_input(descriptor, consumer, name, named) else {
                    continue;
                };
                grouped.entry((d, c)).or_default().parameters.push(LinkParameter {
                    location: parameter.location,
                    name: parameter.name.clone(),
                    expression: Expression::ResponseBodyPointer {
                        pointer: descriptor.field_pointer(field),
                    },
                });
            }
            for property in body_properties(consumer) {
                let Some(field) = match_input(descriptor, consumer, &property, true) else {
                    continue;
                };
                grouped.entry((d, c)).or_default().body.insert(
                    property,
                    Expression::ResponseBodyPointer {
                        pointer: descriptor.field_pointer(field),
                    },
                );
            }
        }
    }

    let links: Vec<Link> = grouped
        .into_iter()
        .map(|((d, c), inputs)| {
            let descriptor = &descriptors[d];
            let consumer = &catalog.operations()[c];
            Link {
                name: link_name(consumer, &descriptor.resource),
                source: descriptor.operation.clone(),
                status: descriptor.status.clone(),
                target: consumer.key.clone(),
                parameters: inputs.parameters,
                request_body: (!inputs.body.is_empty()).then(|| Expression::Composite {
                    value: Composite::Object(inputs.body),
                }),
                merge_body: true,
                origin: LinkOrigin::Inferred,
            }
        })
        .collect();

    for link in &links {
        debug!(link = %link.label(), "Inferred link");
    }
    info!(count = links.len(), "Static links inferred");
    links
}

/// `X-User-Id` -> `User-Id`.
fn strip_extension_prefix(header: &str) -> &str {
    header
        .strip_prefix("X-")
        .or_else(|| header.strip_prefix("x-"))
        .unwrap_or(header)
}

#[derive(Default)]
struct InferredInputs {
    parameters: Vec<LinkParameter>,
    body: BTreeMap<String, Expression>,
}

/// Top-level property names of the operation's JSON object body.
fn body_properties(operation: &Operation) -> Vec<String> {
    operation
        .json_body()
        .filter(|body| paths::is_json_media_type(&body.media_type))
        .map(|body| object_properties(&flatten(&body.schema)).keys().cloned().collect())
        .unwrap_or_default()
}

/// Field of `descriptor` able to feed the input `name` of `consumer`.
///
/// With `named` set the input has to carry its resource in its name.
fn match_input<'a>(
    descriptor: &'a ResourceDescriptor,
    consumer: &Operation,
    name: &str,
    named: bool,
) -> Option<&'a str> {
    if named {
        let (prefix, _) = naming::split_parameter_name(name);
        if prefix.is_empty() {
            return None;
        }
    }
    let (field, kind) = naming::find_matching_field(
        name,
        &descriptor.resource,
        descriptor.fields.iter().map(String::as_str),
    )?;
    let same_resource = naming::from_parameter(name, &consumer.path)
        .is_some_and(|r| naming::normalize(&r) == naming::normalize(&descriptor.resource));
    let specific = matches!(kind, FieldMatch::Exact | FieldMatch::Normalized)
        && naming::is_identifier(field)
        && !naming::is_generic(field);
    (same_resource || specific).then_some(field)
}

/// `GetOrder`, `DeleteOrder`, ...
pub fn link_name(target: &Operation, resource: &str) -> String {
    let resource = naming::from_path(&target.path).unwrap_or_else(|| resource.to_string());
    format!(
        "{}{}",
        naming::to_pascal_case(&target.method.to_string().to_ascii_lowercase()),
        resource
    )
}
