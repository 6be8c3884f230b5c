// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Input resolution for one transition.
//!
//! Every parameter of the target operation is filled from, in order:
//! 1. the strongest link whose source has a matching response in the run's history
//! 2. the process-wide capture store, for parameters some link could feed
//! 3. the generation primitive, which for identifier parameters may also
//!    pick one of the values captured for the named resource
//!
//! A required parameter that some link targets but neither links nor
//! captures can supply makes the transition unusable for this step.

use std::borrow::Cow;

use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use statewalk_dsl::coercion::coerce_to_schema;
use statewalk_dsl::{Link, LinkOrigin, Operation, OperationKey, Parameter, ParameterLocation, StatusPattern};
use tracing::debug;

use crate::capture::CaptureStore;
use crate::catalog::Catalog;
use crate::evaluator::{EvaluationContext, evaluate};
use crate::generation::{GenerationMode, ValueGenerator};
use crate::links::LinkSet;
use crate::links::naming;
use crate::transport::{Request, Response};

/// How many generated candidates to try before giving up on a parameter.
const MAX_GENERATION_ATTEMPTS: usize = 10;

/// A request that was sent and the response it got.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    pub request: Request,
    pub response: Response,
}

impl Exchange {
    pub fn operation(&self) -> &OperationKey {
        &self.request.operation
    }
}

/// Where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ValueSource {
    Link { link: LinkUse },
    Captured { resource: String },
    Generated,
}

/// Identity of a link used to resolve a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkUse {
    pub source: OperationKey,
    pub status: StatusPattern,
    pub name: String,
    pub target: OperationKey,
    pub origin: LinkOrigin,
}

impl LinkUse {
    fn of(link: &Link) -> Self {
        Self {
            source: link.source.clone(),
            status: link.status.clone(),
            name: link.name.clone(),
            target: link.target.clone(),
            origin: link.origin,
        }
    }
}

/// One resolved input slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedInput {
    /// `None` for the request body
    pub location: Option<ParameterLocation>,
    pub name: String,
    pub value: Value,
    pub source: ValueSource,
}

/// A fully resolved request plus the origin of each value.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub request: Request,
    pub inputs: Vec<ResolvedInput>,
}

impl Resolution {
    /// Distinct links that supplied at least one value.
    pub fn links_used(&self) -> Vec<&LinkUse> {
        let mut used: Vec<&LinkUse> = self
            .inputs
            .iter()
            .filter_map(|input| match &input.source {
                ValueSource::Link { link } => Some(link),
                _ => None,
            })
            .collect();
        used.sort();
        used.dedup();
        used
    }
}

/// A required, link-fed parameter could not be resolved.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{operation}: no value for {location} parameter `{name}`")]
pub struct Unresolvable {
    pub operation: OperationKey,
    pub location: ParameterLocation,
    pub name: String,
}

/// Resolves inputs against one link snapshot.
pub struct InputResolver<'a> {
    pub catalog: &'a Catalog,
    pub links: &'a LinkSet,
    pub captures: &'a CaptureStore,
    pub generator: &'a dyn ValueGenerator,
    pub mode: GenerationMode,
}

impl<'a> InputResolver<'a> {
    /// Whether some link targets a required parameter of `operation`.
    pub fn needs_link(&self, operation: &Operation) -> bool {
        operation.required_parameters().any(|p| {
            !self
                .links
                .candidates(&operation.key, p.location, &p.name)
                .is_empty()
        })
    }

    /// Resolve every input of `operation` given the run's `history`.
    pub fn resolve(
        &self,
        operation: &Operation,
        history: &[Exchange],
        rng: &mut StdRng,
    ) -> Result<Resolution, Unresolvable> {
        let mut request = Request::new(operation.key.clone(), operation.method, &operation.path);
        let mut inputs = Vec::new();

        for parameter in &operation.parameters {
            let linked = self
                .links
                .candidates(&operation.key, parameter.location, &parameter.name);

            let mut resolved = linked.iter().find_map(|(link, mapping)| {
                let value = self.from_history(link, &mapping.expression, history)?;
                let value = coerce_to_schema(value, &parameter.schema);
                usable(parameter, &value).then(|| (value, ValueSource::Link { link: LinkUse::of(link) }))
            });

            if resolved.is_none() && !linked.is_empty() {
                resolved = self.from_captures(operation, parameter);
            }

            if resolved.is_none() {
                if !linked.is_empty() && parameter.required {
                    debug!(
                        operation = %operation.key,
                        parameter = %parameter.name,
                        "Linked parameter not resolvable yet"
                    );
                    return Err(Unresolvable {
                        operation: operation.key.clone(),
                        location: parameter.location,
                        name: parameter.name.clone(),
                    });
                }
                if parameter.required || rng.gen_bool(0.5) {
                    resolved = self
                        .generate(operation, parameter, rng)
                        .map(|value| (value, ValueSource::Generated));
                }
            }

            if let Some((value, source)) = resolved {
                request.set_parameter(parameter.location, parameter.name.clone(), value.clone());
                inputs.push(ResolvedInput {
                    location: Some(parameter.location),
                    name: parameter.name.clone(),
                    value,
                    source,
                });
            }
        }

        if let Some(body) = operation.json_body() {
            let generated = self
                .generator
                .generate(&body.schema, self.mode, rng.r#gen())
                .unwrap_or(Value::Null);
            let (value, source) = self
                .body_from_links(operation, history)
                .map(|(linked, link, merge)| {
                    let value = if merge { merge_body(generated.clone(), linked) } else { linked };
                    (value, ValueSource::Link { link: LinkUse::of(link) })
                })
                .unwrap_or((generated, ValueSource::Generated));
            request.body = Some(value.clone());
            request.media_type = Some(body.media_type.clone());
            inputs.push(ResolvedInput {
                location: None,
                name: "body".to_string(),
                value,
                source,
            });
        }

        Ok(Resolution { request, inputs })
    }

    /// Evaluate `expression` against the latest response of the link's source.
    fn from_history(
        &self,
        link: &Link,
        expression: &statewalk_dsl::Expression,
        history: &[Exchange],
    ) -> Option<Value> {
        let exchange = self.latest_match(link, history)?;
        let context = EvaluationContext::new(Some(&exchange.request), Some(&exchange.response));
        match evaluate(expression, &context) {
            Ok(value) => Some(value),
            Err(err) => {
                debug!(link = %link.label(), error = %err, kind = err.kind(), "Link not usable");
                None
            }
        }
    }

    fn latest_match<'h>(&self, link: &Link, history: &'h [Exchange]) -> Option<&'h Exchange> {
        let source = self.catalog.get(&link.source)?;
        history.iter().rev().find(|exchange| {
            exchange.operation() == &link.source
                && source.status_matches(&link.status, exchange.response.status)
        })
    }

    fn from_captures(
        &self,
        operation: &Operation,
        parameter: &Parameter,
    ) -> Option<(Value, ValueSource)> {
        let resource = naming::from_parameter(&parameter.name, &operation.path)?;
        let value = self.captures.sample_field(&resource, &parameter.name)?;
        let value = coerce_to_schema(value, &parameter.schema);
        usable(parameter, &value).then_some((value, ValueSource::Captured { resource }))
    }

    fn generate(&self, operation: &Operation, parameter: &Parameter, rng: &mut StdRng) -> Option<Value> {
        let schema = self.generation_schema(operation, parameter);
        self.generator
            .candidates(&schema, self.mode, rng.r#gen())
            .take(MAX_GENERATION_ATTEMPTS)
            .map(|value| coerce_to_schema(value, &parameter.schema))
            .find(|value| serializable(parameter.location, value))
    }

    /// Identifier parameters may also draw from values captured for their resource.
    fn generation_schema<'p>(&self, operation: &Operation, parameter: &'p Parameter) -> Cow<'p, Value> {
        if self.mode == GenerationMode::Positive
            && naming::is_identifier(&parameter.name)
            && let Some(resource) = naming::from_parameter(&parameter.name, &operation.path)
        {
            return Cow::Owned(
                self.captures
                    .augment_schema(&resource, &parameter.name, &parameter.schema),
            );
        }
        Cow::Borrowed(&parameter.schema)
    }

    fn body_from_links(
        &self,
        operation: &Operation,
        history: &[Exchange],
    ) -> Option<(Value, &'a Link, bool)> {
        self.links
            .body_candidates(&operation.key)
            .into_iter()
            .find_map(|link| {
                let expression = link.request_body.as_ref()?;
                let value = self.from_history(link, expression, history)?;
                Some((value, link, link.merge_body))
            })
    }
}

/// Path values must render to a non-empty segment.
fn usable(parameter: &Parameter, value: &Value) -> bool {
    match parameter.location {
        ParameterLocation::Path => !matches!(value, Value::Null)
            && value.as_str().is_none_or(|s| !s.is_empty()),
        _ => true,
    }
}

fn serializable(location: ParameterLocation, value: &Value) -> bool {
    match location {
        ParameterLocation::Query => !value.is_object(),
        _ => !value.is_object() && !value.is_array() && usable_scalar(value),
    }
}

fn usable_scalar(value: &Value) -> bool {
    value.as_str().is_none_or(|s| !s.is_empty() && !s.contains(['\r', '\n']))
}

/// Deep-merge `linked` into `generated`; linked values win.
pub fn merge_body(generated: Value, linked: Value) -> Value {
    match (generated, linked) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                let merged = match base.remove(&key) {
                    Some(existing) => merge_body(existing, value),
                    None => value,
                };
                base.insert(key, merged);
            }
            Value::Object(base)
        }
        (_, linked) => linked,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::SchemaValueGenerator;
    use crate::links::LinkRegistry;
    use rand::SeedableRng;
    use serde_json::json;

    fn catalog() -> Catalog {
        Catalog::build(&json!({
            "paths": {
                "/users": {
                    "post": {
                        "operationId": "createUser",
                        "requestBody": {"required": true, "content": {"application/json": {"schema": {
                            "type": "object", "required": ["name"],
                            "properties": {"name": {"type": "string"}}
                        }}}},
                        "responses": {"201": {
                            "content": {"application/json": {"schema": {
                                "type": "object", "properties": {"id": {"type": "integer"}, "name": {"type": "string"}}
                            }}},
                            "links": {
                                "UpdateUser": {
                                    "operationId": "updateUser",
                                    "parameters": {"userId": "$response.body#/id"},
                                    "requestBody": {"name": "$response.body#/name", "extra": {"from": "link"}}
                                }
                            }
                        }}
                    }
                },
                "/users/{userId}": {
                    "parameters": [{"name": "userId", "in": "path", "required": true, "schema": {"type": "integer"}}],
                    "get": {
                        "operationId": "getUser",
                        "parameters": [{"name": "verbose", "in": "query", "schema": {"type": "boolean"}}],
                        "responses": {"200": {}}
                    },
                    "put": {
                        "operationId": "updateUser",
                        "requestBody": {"content": {"application/json": {"schema": {
                            "type": "object", "required": ["name", "age"],
                            "properties": {"name": {"type": "string"}, "age": {"type": "integer"}}
                        }}}},
                        "responses": {"200": {}}
                    }
                },
                "/reports": {"get": {
                    "operationId": "listReports",
                    "parameters": [{"name": "customerId", "in": "query", "required": true, "schema": {"type": "integer"}}],
                    "responses": {"200": {}}
                }},
                "/ping": {"get": {"operationId": "ping", "responses": {"200": {}}}}
            }
        }))
        .unwrap()
    }

    fn created(id: i64) -> Exchange {
        Exchange {
            request: Request::new("createUser".into(), statewalk_dsl::HttpMethod::Post, "/users"),
            response: Response::new(201).with_json(json!({"id": id, "name": "alice"})),
        }
    }

    struct Fixture {
        catalog: Catalog,
        links: std::sync::Arc<LinkSet>,
        captures: CaptureStore,
        generator: SchemaValueGenerator,
    }

    impl Fixture {
        fn new() -> Self {
            let catalog = catalog();
            let links = LinkRegistry::from_catalog(&catalog).unwrap().snapshot();
            Self {
                catalog,
                links,
                captures: CaptureStore::default(),
                generator: SchemaValueGenerator::default(),
            }
        }

        fn resolver(&self) -> InputResolver<'_> {
            InputResolver {
                catalog: &self.catalog,
                links: &self.links,
                captures: &self.captures,
                generator: &self.generator,
                mode: GenerationMode::Positive,
            }
        }

        fn operation(&self, key: &str) -> &Operation {
            self.catalog.get(&key.into()).unwrap()
        }
    }

    #[test]
    fn test_linked_parameter_blocks_until_produced() {
        let fixture = Fixture::new();
        let mut rng = StdRng::seed_from_u64(1);
        let err = fixture
            .resolver()
            .resolve(fixture.operation("getUser"), &[], &mut rng)
            .unwrap_err();
        assert_eq!(err.name, "userId");
        assert!(fixture.resolver().needs_link(fixture.operation("getUser")));
        assert!(!fixture.resolver().needs_link(fixture.operation("createUser")));
    }

    #[test]
    fn test_uses_latest_matching_response() {
        let fixture = Fixture::new();
        let mut rng = StdRng::seed_from_u64(1);
        let resolution = fixture
            .resolver()
            .resolve(fixture.operation("getUser"), &[created(1), created(2)], &mut rng)
            .unwrap();
        assert_eq!(
            resolution.request.parameter(ParameterLocation::Path, "userId"),
            Some(&json!(2))
        );
        assert_eq!(resolution.links_used().len(), 1);
    }

    #[test]
    fn test_falls_back_to_captures() {
        let fixture = Fixture::new();
        fixture.captures.record(
            "User",
            [("id".to_string(), json!(99))],
            &statewalk_dsl::Provenance {
                operation: "createUser".into(),
                status: 201,
                run_id: None,
            },
        );
        let mut rng = StdRng::seed_from_u64(1);
        let resolution = fixture
            .resolver()
            .resolve(fixture.operation("getUser"), &[], &mut rng)
            .unwrap();
        let input = resolution.inputs.iter().find(|i| i.name == "userId").unwrap();
        assert_eq!(input.value, json!(99));
        assert_eq!(input.source, ValueSource::Captured { resource: "User".into() });
    }

    #[test]
    fn test_declared_body_is_merged() {
        let fixture = Fixture::new();
        let mut rng = StdRng::seed_from_u64(5);
        let resolution = fixture
            .resolver()
            .resolve(fixture.operation("updateUser"), &[created(3)], &mut rng)
            .unwrap();
        let body = resolution.request.body.clone().unwrap();
        assert_eq!(body["name"], json!("alice"));
        assert_eq!(body["extra"], json!({"from": "link"}));
        assert!(body["age"].is_i64());
        assert_eq!(
            resolution.request.parameter(ParameterLocation::Path, "userId"),
            Some(&json!(3))
        );
        assert_eq!(resolution.request.media_type.as_deref(), Some("application/json"));
    }

    #[test]
    fn test_unlinked_operations_are_generated() {
        let fixture = Fixture::new();
        let mut rng = StdRng::seed_from_u64(1);
        let resolution = fixture
            .resolver()
            .resolve(fixture.operation("createUser"), &[], &mut rng)
            .unwrap();
        assert!(resolution.request.body.unwrap()["name"].is_string());
        assert!(fixture
            .resolver()
            .resolve(fixture.operation("ping"), &[], &mut rng)
            .is_ok());
    }

    #[test]
    fn test_unlinked_identifier_draws_from_captures() {
        let fixture = Fixture::new();
        assert!(!fixture.resolver().needs_link(fixture.operation("listReports")));
        fixture.captures.record(
            "Customer",
            [("id".to_string(), json!(99))],
            &statewalk_dsl::Provenance {
                operation: "importCustomers".into(),
                status: 200,
                run_id: None,
            },
        );

        let values: Vec<Value> = (0..30)
            .map(|seed| {
                let mut rng = StdRng::seed_from_u64(seed);
                let resolution = fixture
                    .resolver()
                    .resolve(fixture.operation("listReports"), &[], &mut rng)
                    .unwrap();
                let input = resolution.inputs.iter().find(|i| i.name == "customerId").unwrap();
                assert_eq!(input.source, ValueSource::Generated);
                input.value.clone()
            })
            .collect();
        assert!(values.contains(&json!(99)));
        assert!(values.iter().all(Value::is_i64));
    }

    #[test]
    fn test_merge_body() {
        assert_eq!(
            merge_body(json!({"a": 1, "n": {"x": 1, "y": 2}}), json!({"n": {"y": 3}, "b": 2})),
            json!({"a": 1, "n": {"x": 1, "y": 3}, "b": 2})
        );
        assert_eq!(merge_body(json!("text"), json!({"a": 1})), json!({"a": 1}));
    }
}
