// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Operation Catalog.
//!
//! Normalized, immutable view of every operation declared in a resolved
//! OpenAPI document. Operations are addressed by [`OperationKey`]: the
//! declared `operationId` when present, `"METHOD /path"` otherwise.
//!
//! Other front ends (GraphQL, hand-written models) can feed the same catalog
//! through [`Catalog::from_operations`].

use std::collections::{BTreeMap, HashMap};

use serde_json::{Map, Value};
use statewalk_dsl::paths;
use statewalk_dsl::{
    HttpMethod, Operation, OperationKey, Parameter, ParameterLocation, RequestBody,
    ResponseDefinition, StatusPattern,
};
use tracing::{debug, info, warn};

use crate::error::SchemaError;

const METHODS: [(&str, HttpMethod); 8] = [
    ("get", HttpMethod::Get),
    ("put", HttpMethod::Put),
    ("post", HttpMethod::Post),
    ("delete", HttpMethod::Delete),
    ("options", HttpMethod::Options),
    ("head", HttpMethod::Head),
    ("patch", HttpMethod::Patch),
    ("trace", HttpMethod::Trace),
];

/// All operations of an API, indexed by key.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    operations: Vec<Operation>,
    index: HashMap<OperationKey, usize>,
}

impl Catalog {
    /// Build the catalog from a resolved OpenAPI document.
    ///
    /// Fails on the first structural problem: missing `paths`, malformed
    /// templates, undeclared path parameters or leftover `$ref`s.
    pub fn build(schema: &Value) -> Result<Self, SchemaError> {
        let paths = schema
            .get("paths")
            .and_then(Value::as_object)
            .ok_or(SchemaError::MissingPaths)?;

        let mut operations = Vec::new();
        for (path, item) in paths {
            let item = item.as_object().ok_or_else(|| SchemaError::InvalidPath {
                path: path.clone(),
                reason: "path item must be an object".to_string(),
            })?;
            if let Some(reference) = item.get("$ref").and_then(Value::as_str) {
                return Err(SchemaError::UnresolvedReference {
                    location: path.clone(),
                    reference: reference.to_string(),
                });
            }
            validate_template(path)?;

            let shared = item
                .get("parameters")
                .map(|p| parse_parameters(p, path))
                .transpose()?
                .unwrap_or_default();

            for (name, method) in METHODS {
                let Some(definition) = item.get(name) else {
                    continue;
                };
                operations.push(parse_operation(path, method, definition, &shared)?);
            }
        }

        let catalog = Self::from_operations(operations)?;
        info!(operations = catalog.len(), "Catalog built");
        Ok(catalog)
    }

    /// Build a catalog from already normalized operations.
    pub fn from_operations(operations: Vec<Operation>) -> Result<Self, SchemaError> {
        let mut catalog = Self::default();
        for mut operation in operations {
            validate_template(&operation.path)?;
            check_path_parameters(&operation)?;
            if catalog.index.contains_key(&operation.key) {
                let fallback = OperationKey::from_route(operation.method, &operation.path);
                warn!(
                    operation = %operation.key,
                    fallback = %fallback,
                    "Duplicate operation key, using route key"
                );
                if catalog.index.contains_key(&fallback) {
                    return Err(SchemaError::InvalidPath {
                        path: operation.path.clone(),
                        reason: format!("{} is declared twice", fallback),
                    });
                }
                operation.key = fallback;
            }
            catalog
                .index
                .insert(operation.key.clone(), catalog.operations.len());
            catalog.operations.push(operation);
        }
        Ok(catalog)
    }

    pub fn get(&self, key: &OperationKey) -> Option<&Operation> {
        self.index.get(key).map(|&i| &self.operations[i])
    }

    pub fn contains(&self, key: &OperationKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn keys(&self) -> impl Iterator<Item = &OperationKey> {
        self.operations.iter().map(|op| &op.key)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Operation declared for `method` on the exact path template.
    pub fn find_by_route(&self, method: HttpMethod, path: &str) -> Option<&Operation> {
        self.operations
            .iter()
            .find(|op| op.method == method && op.path == path)
    }

    /// Operation by its declared `operationId`.
    pub fn find_by_operation_id(&self, operation_id: &str) -> Option<&Operation> {
        self.operations
            .iter()
            .find(|op| op.operation_id.as_deref() == Some(operation_id))
    }

    /// Resolve a local `operationRef` such as `#/paths/~1users~1{id}/get`.
    pub fn find_by_operation_ref(&self, reference: &str) -> Option<&Operation> {
        let pointer = reference.strip_prefix('#')?;
        let tokens: Vec<String> = pointer
            .split('/')
            .skip(1)
            .map(unescape_pointer_token)
            .collect();
        match tokens.as_slice() {
            [root, path, method] if root == "paths" => {
                let method: HttpMethod = method.parse().ok()?;
                self.find_by_route(method, path)
            }
            _ => None,
        }
    }
}

/// Decode `~1` and `~0` in a JSON pointer token.
pub fn unescape_pointer_token(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

fn validate_template(path: &str) -> Result<(), SchemaError> {
    if !path.starts_with('/') {
        return Err(SchemaError::InvalidPath {
            path: path.to_string(),
            reason: "must start with '/'".to_string(),
        });
    }
    if !paths::is_well_formed(path) {
        return Err(SchemaError::InvalidPath {
            path: path.to_string(),
            reason: "unbalanced or nested braces".to_string(),
        });
    }
    Ok(())
}

fn check_path_parameters(operation: &Operation) -> Result<(), SchemaError> {
    for placeholder in paths::template_parameters(&operation.path) {
        if operation
            .parameter(ParameterLocation::Path, placeholder)
            .is_none()
        {
            return Err(SchemaError::UndeclaredPathParameter {
                operation: operation.label(),
                parameter: placeholder.to_string(),
            });
        }
    }
    let placeholders = paths::template_parameters(&operation.path);
    if let Some(extra) = operation
        .path_parameters()
        .find(|p| !placeholders.contains(&p.name.as_str()))
    {
        return Err(SchemaError::InvalidParameter {
            operation: operation.label(),
            reason: format!("path parameter `{}` is not in the template", extra.name),
        });
    }
    Ok(())
}

/// First `$ref` anywhere inside a value.
fn find_reference(value: &Value) -> Option<&str> {
    match value {
        Value::Object(map) => map
            .get("$ref")
            .and_then(Value::as_str)
            .or_else(|| map.values().find_map(find_reference)),
        Value::Array(items) => items.iter().find_map(find_reference),
        _ => None,
    }
}

fn ensure_resolved(value: &Value, location: impl FnOnce() -> String) -> Result<(), SchemaError> {
    match find_reference(value) {
        Some(reference) => Err(SchemaError::UnresolvedReference {
            location: location(),
            reference: reference.to_string(),
        }),
        None => Ok(()),
    }
}

fn parse_parameters(value: &Value, context: &str) -> Result<Vec<Parameter>, SchemaError> {
    let items = value
        .as_array()
        .ok_or_else(|| SchemaError::InvalidParameter {
            operation: context.to_string(),
            reason: "`parameters` must be an array".to_string(),
        })?;
    items
        .iter()
        .map(|item| parse_parameter(item, context))
        .collect()
}

fn parse_parameter(value: &Value, context: &str) -> Result<Parameter, SchemaError> {
    ensure_resolved(value, || format!("{} parameters", context))?;
    let invalid = |reason: &str| SchemaError::InvalidParameter {
        operation: context.to_string(),
        reason: reason.to_string(),
    };

    let object = value
        .as_object()
        .ok_or_else(|| invalid("parameter must be an object"))?;
    let name = object
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("parameter without a name"))?;
    let location: ParameterLocation = object
        .get("in")
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| SchemaError::InvalidParameter {
            operation: context.to_string(),
            reason: format!("parameter `{}` has an unknown location", name),
        })?;
    let required = location == ParameterLocation::Path
        || object
            .get("required")
            .and_then(Value::as_bool)
            .unwrap_or(false);
    let schema = object
        .get("schema")
        .cloned()
        .or_else(|| {
            object
                .get("content")
                .and_then(Value::as_object)
                .and_then(|content| content.values().next())
                .and_then(|media| media.get("schema"))
                .cloned()
        })
        .unwrap_or_else(|| Value::Object(Map::new()));

    Ok(Parameter {
        name: name.to_string(),
        location,
        required,
        schema,
    })
}

fn parse_operation(
    path: &str,
    method: HttpMethod,
    definition: &Value,
    shared: &[Parameter],
) -> Result<Operation, SchemaError> {
    let label = format!("{} {}", method, path);
    let object = definition
        .as_object()
        .ok_or_else(|| SchemaError::InvalidPath {
            path: path.to_string(),
            reason: format!("{} definition must be an object", method),
        })?;

    // Operation-level parameters override path-level ones with the same (name, in)
    let own = object
        .get("parameters")
        .map(|p| parse_parameters(p, &label))
        .transpose()?
        .unwrap_or_default();
    let mut parameters: Vec<Parameter> = shared
        .iter()
        .filter(|s| {
            !own.iter()
                .any(|o| o.name == s.name && o.location == s.location)
        })
        .cloned()
        .collect();
    parameters.extend(own);

    let request_bodies = match object.get("requestBody") {
        Some(body) => parse_request_body(body, &label)?,
        None => Vec::new(),
    };

    let responses = match object.get("responses").and_then(Value::as_object) {
        Some(responses) => parse_responses(responses, &label)?,
        None => Vec::new(),
    };

    let operation_id = object
        .get("operationId")
        .and_then(Value::as_str)
        .map(str::to_string);
    let key = match &operation_id {
        Some(id) => OperationKey::from_id(id.clone()),
        None => OperationKey::from_route(method, path),
    };

    debug!(operation = %key, parameters = parameters.len(), "Operation parsed");

    Ok(Operation {
        key,
        method,
        path: path.to_string(),
        operation_id,
        parameters,
        request_bodies,
        responses,
    })
}

fn parse_request_body(value: &Value, label: &str) -> Result<Vec<RequestBody>, SchemaError> {
    ensure_resolved(value, || format!("{} requestBody", label))?;
    let required = value
        .get("required")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let Some(content) = value.get("content").and_then(Value::as_object) else {
        return Ok(Vec::new());
    };
    Ok(content
        .iter()
        .map(|(media_type, media)| RequestBody {
            media_type: media_type.clone(),
            schema: media
                .get("schema")
                .cloned()
                .unwrap_or_else(|| Value::Object(Map::new())),
            required,
        })
        .collect())
}

fn parse_responses(
    responses: &Map<String, Value>,
    label: &str,
) -> Result<Vec<ResponseDefinition>, SchemaError> {
    let mut parsed = Vec::new();
    for (status, response) in responses {
        let status = StatusPattern(status.clone());
        if !status.is_valid() {
            warn!(operation = %label, status = %status, "Ignoring invalid response status key");
            continue;
        }
        ensure_resolved(response, || format!("{} response {}", label, status))?;

        let schema = response
            .get("content")
            .and_then(Value::as_object)
            .and_then(|content| {
                content
                    .iter()
                    .find(|(media_type, _)| paths::is_json_media_type(media_type))
                    .and_then(|(_, media)| media.get("schema"))
            })
            .cloned();

        let mut links = BTreeMap::new();
        for field in ["links", "x-links"] {
            if let Some(declared) = response.get(field).and_then(Value::as_object) {
                for (name, link) in declared {
                    links.insert(name.clone(), link.clone());
                }
            }
        }

        parsed.push(ResponseDefinition {
            status,
            schema,
            links,
        });
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn users_schema() -> Value {
        json!({
            "openapi": "3.0.0",
            "paths": {
                "/users": {
                    "post": {
                        "operationId": "createUser",
                        "requestBody": {
                            "required": true,
                            "content": {"application/json": {"schema": {"type": "object"}}}
                        },
                        "responses": {
                            "201": {
                                "content": {"application/json": {"schema": {
                                    "type": "object",
                                    "properties": {"id": {"type": "string"}}
                                }}},
                                "links": {"GetUser": {"operationId": "getUser"}}
                            }
                        }
                    }
                },
                "/users/{userId}": {
                    "parameters": [
                        {"name": "userId", "in": "path", "schema": {"type": "string"}}
                    ],
                    "get": {
                        "operationId": "getUser",
                        "parameters": [
                            {"name": "verbose", "in": "query", "schema": {"type": "boolean"}}
                        ],
                        "responses": {"200": {}, "404": {}, "default": {}}
                    },
                    "delete": {
                        "responses": {"204": {}}
                    }
                }
            }
        })
    }

    #[test]
    fn test_build_indexes_operations_by_stable_key() {
        let catalog = Catalog::build(&users_schema()).unwrap();
        assert_eq!(catalog.len(), 3);

        let get = catalog.get(&OperationKey::from_id("getUser")).unwrap();
        assert_eq!(get.method, HttpMethod::Get);
        assert_eq!(get.parameters.len(), 2);
        assert!(
            get.parameter(ParameterLocation::Path, "userId")
                .unwrap()
                .required
        );

        let delete = catalog.get(&"DELETE /users/{userId}".into()).unwrap();
        assert_eq!(delete.path, "/users/{userId}");

        let again = Catalog::build(&users_schema()).unwrap();
        let first: Vec<_> = catalog.keys().collect();
        let second: Vec<_> = again.keys().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_responses_and_links_are_kept() {
        let catalog = Catalog::build(&users_schema()).unwrap();
        let create = catalog.get(&"createUser".into()).unwrap();
        let created = create.response_for(201).unwrap();
        assert!(created.schema.is_some());
        assert!(created.links.contains_key("GetUser"));
        assert_eq!(create.request_bodies[0].media_type, "application/json");
        assert!(create.request_bodies[0].required);
    }

    #[test]
    fn test_missing_paths() {
        assert_eq!(
            Catalog::build(&json!({"openapi": "3.0.0"})).unwrap_err(),
            SchemaError::MissingPaths
        );
    }

    #[test]
    fn test_undeclared_path_parameter() {
        let schema = json!({"paths": {"/users/{id}": {"get": {"responses": {}}}}});
        assert!(matches!(
            Catalog::build(&schema),
            Err(SchemaError::UndeclaredPathParameter { parameter, .. }) if parameter == "id"
        ));
    }

    #[test]
    fn test_unresolved_reference() {
        let schema = json!({"paths": {"/users": {"get": {
            "parameters": [{"name": "q", "in": "query", "schema": {"$ref": "#/components/schemas/Q"}}],
            "responses": {}
        }}}});
        assert!(matches!(
            Catalog::build(&schema),
            Err(SchemaError::UnresolvedReference { reference, .. }) if reference == "#/components/schemas/Q"
        ));
    }

    #[test]
    fn test_invalid_path_template() {
        let schema = json!({"paths": {"/users/{id": {"get": {"responses": {}}}}});
        assert!(matches!(
            Catalog::build(&schema),
            Err(SchemaError::InvalidPath { .. })
        ));
    }

    #[test]
    fn test_parameter_with_unknown_location() {
        let schema = json!({"paths": {"/users": {"get": {
            "parameters": [{"name": "q", "in": "body"}],
            "responses": {}
        }}}});
        assert!(matches!(
            Catalog::build(&schema),
            Err(SchemaError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_operation_ref_lookup() {
        let catalog = Catalog::build(&users_schema()).unwrap();
        let op = catalog
            .find_by_operation_ref("#/paths/~1users~1{userId}/delete")
            .unwrap();
        assert_eq!(op.method, HttpMethod::Delete);
        assert!(catalog.find_by_operation_ref("#/paths/~1nope/get").is_none());
    }

    #[test]
    fn test_duplicate_operation_id_falls_back_to_route() {
        let schema = json!({"paths": {
            "/a": {"get": {"operationId": "same", "responses": {}}},
            "/b": {"get": {"operationId": "same", "responses": {}}}
        }});
        let catalog = Catalog::build(&schema).unwrap();
        assert!(catalog.contains(&"same".into()));
        assert!(catalog.contains(&"GET /b".into()));
    }
}
