// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Links learned from `Location` headers at runtime.
//!
//! A successful response that points at `/users/42` tells us that whatever
//! operation created it produces ids consumed by every operation under
//! `/users/{id}`. Each such operation gets a link reading the id back from
//! the header through a `#regex:` expression.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use statewalk_dsl::paths;
use statewalk_dsl::{
    Expression, Link, LinkOrigin, LinkParameter, OperationKey, ParameterLocation, StatusPattern,
};
use tracing::debug;
use url::Url;

use super::inference::link_name;
use super::naming;
use crate::catalog::Catalog;
use crate::transport::Response;

pub const LOCATION_HEADER: &str = "Location";

/// Turns `Location` headers into learned links.
pub struct LocationLearner {
    catalog: Arc<Catalog>,
    base: Option<Url>,
    templates: Vec<String>,
    sequence: AtomicU64,
}

impl LocationLearner {
    /// `base_url` is used to accept absolute `Location` values; without it
    /// only the path of an absolute URL is considered.
    pub fn new(catalog: Arc<Catalog>, base_url: Option<&str>) -> Self {
        let templates: BTreeSet<String> = catalog
            .operations()
            .iter()
            .map(|op| op.path.clone())
            .collect();
        Self {
            base: base_url.and_then(|u| Url::parse(u).ok()),
            templates: templates.into_iter().collect(),
            catalog,
            sequence: AtomicU64::new(0),
        }
    }

    /// Links implied by `response` of `source`.
    ///
    /// Returns nothing for non-2xx responses, responses without a
    /// `Location` header, and locations that match no path template.
    pub fn learn(&self, response: &Response, source: &OperationKey) -> Vec<Link> {
        if !response.is_success() {
            return Vec::new();
        }
        let Some(location) = response.header(LOCATION_HEADER) else {
            return Vec::new();
        };
        let Some(path) = self.normalize(location) else {
            debug!(location, "Location outside of the API base URL");
            return Vec::new();
        };
        let Some(template) = self.match_template(&path) else {
            debug!(location, "Location matches no path template");
            return Vec::new();
        };

        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let placeholders = paths::template_parameters(template);
        let mut links = Vec::new();

        for target in self.catalog.operations() {
            if &target.key == source || !extends(&target.path, template) {
                continue;
            }
            let parameters: Vec<LinkParameter> = placeholders
                .iter()
                .filter(|name| target.parameter(ParameterLocation::Path, name).is_some())
                .map(|name| LinkParameter {
                    location: ParameterLocation::Path,
                    name: name.to_string(),
                    expression: Expression::ResponseHeaderRegex {
                        header: LOCATION_HEADER.to_string(),
                        pattern: capture_pattern(template, name),
                    },
                })
                .collect();
            if parameters.is_empty() {
                continue;
            }
            links.push(Link {
                name: link_name(target, &naming::from_path(template).unwrap_or_default()),
                source: source.clone(),
                status: StatusPattern::exact(response.status),
                target: target.key.clone(),
                parameters,
                request_body: None,
                merge_body: true,
                origin: LinkOrigin::Learned { sequence },
            });
        }
        debug!(
            source = %source,
            location,
            template,
            count = links.len(),
            "Links learned from Location header"
        );
        links
    }

    /// Path of `location` relative to the API base, without query or fragment.
    fn normalize(&self, location: &str) -> Option<String> {
        let base_path = self
            .base
            .as_ref()
            .map(|b| b.path().trim_end_matches('/').to_string())
            .unwrap_or_default();

        let path = match Url::parse(location) {
            Ok(absolute) => {
                if let Some(base) = &self.base
                    && (absolute.scheme() != base.scheme()
                        || absolute.host_str() != base.host_str()
                        || absolute.port_or_known_default() != base.port_or_known_default())
                {
                    return None;
                }
                let path = absolute.path();
                if !base_path.is_empty() && !has_segment_prefix(path, &base_path) {
                    return None;
                }
                path[base_path.len()..].to_string()
            }
            Err(_) => {
                let path = location
                    .split(['?', '#'])
                    .next()
                    .unwrap_or_default();
                if !base_path.is_empty() && has_segment_prefix(path, &base_path) {
                    path[base_path.len()..].to_string()
                } else {
                    path.to_string()
                }
            }
        };
        Some(if path.starts_with('/') {
            path
        } else {
            format!("/{}", path)
        })
    }

    /// Most specific template matching `path` segment by segment.
    fn match_template(&self, path: &str) -> Option<&str> {
        let segments = paths::segments(path);
        self.templates
            .iter()
            .filter_map(|template| {
                let template_segments = paths::segments(template);
                if template_segments.len() != segments.len() {
                    return None;
                }
                let mut fixed = 0;
                for (pattern, actual) in template_segments.iter().zip(&segments) {
                    if paths::placeholder(pattern).is_some() {
                        continue;
                    }
                    if pattern != actual {
                        return None;
                    }
                    fixed += 1;
                }
                Some((fixed, template.as_str()))
            })
            .filter(|(_, template)| !paths::template_parameters(template).is_empty())
            .max_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.cmp(a.1)))
            .map(|(_, template)| template)
    }
}

fn has_segment_prefix(path: &str, prefix: &str) -> bool {
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// Whether `path` is `template` or a template nested below it.
fn extends(path: &str, template: &str) -> bool {
    has_segment_prefix(path, template)
}

/// Regex over the location capturing the value of `parameter` in `template`.
///
/// Other placeholders match any single segment.
fn capture_pattern(template: &str, parameter: &str) -> String {
    let mut pattern = String::new();
    for segment in paths::segments(template) {
        pattern.push('/');
        match paths::placeholder(segment) {
            Some(name) if name == parameter => pattern.push_str("([^/?#]+)"),
            Some(_) => pattern.push_str("[^/?#]+"),
            None => pattern.push_str(&regex::escape(segment)),
        }
    }
    pattern.push_str("/?(?:[?#].*)?$");
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::{EvaluationContext, evaluate};
    use serde_json::json;

    fn catalog() -> Arc<Catalog> {
        let id = json!([{"name": "id", "in": "path", "schema": {"type": "integer"}}]);
        Arc::new(
            Catalog::build(&json!({
                "paths": {
                    "/users": {"post": {"operationId": "createUser", "responses": {"201": {}}}},
                    "/users/{id}": {
                        "get": {"operationId": "getUser", "parameters": id, "responses": {"200": {}}},
                        "delete": {"operationId": "deleteUser", "parameters": id, "responses": {"204": {}}}
                    },
                    "/users/{id}/posts": {
                        "get": {"operationId": "listPosts", "parameters": id, "responses": {"200": {}}}
                    },
                    "/orders/{orderId}": {
                        "get": {
                            "operationId": "getOrder",
                            "parameters": [{"name": "orderId", "in": "path", "schema": {"type": "string"}}],
                            "responses": {"200": {}}
                        }
                    }
                }
            }))
            .unwrap(),
        )
    }

    fn created(location: &str) -> Response {
        Response::new(201).with_header("Location", location)
    }

    fn targets(links: &[Link]) -> Vec<&str> {
        let mut targets: Vec<&str> = links.iter().map(|l| l.target.as_str()).collect();
        targets.sort();
        targets
    }

    #[test]
    fn test_learns_exact_and_prefix_templates() {
        let learner = LocationLearner::new(catalog(), None);
        let links = learner.learn(&created("/users/42"), &"createUser".into());

        assert_eq!(targets(&links), vec!["deleteUser", "getUser", "listPosts"]);
        assert!(links.iter().all(|l| l.status.as_str() == "201"));
        assert!(matches!(links[0].origin, LinkOrigin::Learned { sequence: 1 }));

        let get = links.iter().find(|l| l.target.as_str() == "getUser").unwrap();
        assert_eq!(get.name, "GetUser");
        let Expression::ResponseHeaderRegex { header, pattern } =
            &get.parameters[0].expression
        else {
            panic!("expected a header regex");
        };
        assert_eq!(header, "Location");
        assert!(statewalk_dsl::expression::validate_pattern(pattern).is_ok());
    }

    #[test]
    fn test_learned_expression_extracts_id() {
        let learner = LocationLearner::new(catalog(), None);
        let response = created("/users/42");
        let links = learner.learn(&response, &"createUser".into());
        let context = EvaluationContext::new(None, Some(&response));
        let value = evaluate(&links[0].parameters[0].expression, &context).unwrap();
        assert_eq!(value, json!("42"));
    }

    #[test]
    fn test_absolute_location_must_match_base() {
        let learner = LocationLearner::new(catalog(), Some("http://api.test/v2"));
        let links = learner.learn(
            &created("http://api.test/v2/orders/abc?expand=1"),
            &"createUser".into(),
        );
        assert_eq!(targets(&links), vec!["getOrder"]);

        let response = created("http://api.test/v2/orders/abc?expand=1");
        let context = EvaluationContext::new(None, Some(&response));
        let value = evaluate(&links[0].parameters[0].expression, &context).unwrap();
        assert_eq!(value, json!("abc"));

        assert!(learner
            .learn(&created("http://other.test/v2/orders/abc"), &"createUser".into())
            .is_empty());
        assert!(learner
            .learn(&created("http://api.test/v1/orders/abc"), &"createUser".into())
            .is_empty());
    }

    #[test]
    fn test_ignores_failures_and_unknown_paths() {
        let learner = LocationLearner::new(catalog(), None);
        let failed = Response::new(400).with_header("Location", "/users/1");
        assert!(learner.learn(&failed, &"createUser".into()).is_empty());
        assert!(learner.learn(&Response::new(201), &"createUser".into()).is_empty());
        assert!(learner.learn(&created("/teams/1"), &"createUser".into()).is_empty());
    }

    #[test]
    fn test_sequence_increases() {
        let learner = LocationLearner::new(catalog(), None);
        let first = learner.learn(&created("/users/1"), &"createUser".into());
        let second = learner.learn(&created("/users/2"), &"createUser".into());
        assert!(first[0].origin.precedence() < second[0].origin.precedence());
    }
}
