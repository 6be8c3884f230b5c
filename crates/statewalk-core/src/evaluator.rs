// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Expression evaluation.
//!
//! [`evaluate`] is a pure function of the expression and the request/response
//! pair it is evaluated against.

use std::sync::LazyLock;

use crossbeam_skiplist::SkipMap;
use regex::Regex;
use serde_json::Value;
use statewalk_dsl::coercion::to_parameter_string;
use statewalk_dsl::expression::validate_pattern;
use statewalk_dsl::{Composite, Expression};

use crate::error::EvaluationError;
use crate::transport::{Request, Response};

/// Result type for evaluation.
pub type Result<T> = std::result::Result<T, EvaluationError>;

/// Compiled `#regex:` patterns, shared by every evaluation.
static PATTERNS: LazyLock<SkipMap<String, Regex>> = LazyLock::new(SkipMap::new);

/// The exchange an expression reads from.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvaluationContext<'a> {
    pub request: Option<&'a Request>,
    pub response: Option<&'a Response>,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(request: Option<&'a Request>, response: Option<&'a Response>) -> Self {
        Self { request, response }
    }

    fn response(&self) -> Result<&'a Response> {
        self.response.ok_or(EvaluationError::MissingBody("response"))
    }

    fn request(&self) -> Result<&'a Request> {
        self.request.ok_or(EvaluationError::MissingBody("request"))
    }
}

/// Resolve an expression to a JSON value.
///
/// Composite expressions keep their shape; the first failing leaf fails the
/// whole expression.
pub fn evaluate(expression: &Expression, context: &EvaluationContext<'_>) -> Result<Value> {
    match expression {
        Expression::Literal { value } => Ok(value.clone()),

        Expression::ResponseBodyPointer { pointer } => {
            let body = context
                .response()?
                .body
                .as_ref()
                .ok_or(EvaluationError::MissingBody("response"))?;
            body.pointer(pointer)
                .cloned()
                .ok_or_else(|| EvaluationError::MissingField {
                    pointer: pointer.clone(),
                })
        }

        Expression::ResponseHeader { header } => {
            response_header(context, header).map(|v| Value::String(v.to_string()))
        }

        // A header that does not match yields an empty string
        Expression::ResponseHeaderRegex { header, pattern } => {
            let value = response_header(context, header)?;
            let captured = capture(pattern, value)?.unwrap_or_default();
            Ok(Value::String(captured))
        }

        Expression::RequestParameter {
            location,
            name,
            pattern,
        } => {
            let value = context
                .request()?
                .parameter(*location, name)
                .ok_or_else(|| EvaluationError::MissingRequestParameter {
                    location: *location,
                    name: name.clone(),
                })?;
            match pattern {
                None => Ok(value.clone()),
                Some(pattern) => {
                    let text = to_parameter_string(value);
                    capture(pattern, &text)?.map(Value::String).ok_or(
                        EvaluationError::PatternMismatch {
                            pattern: pattern.clone(),
                            value: text,
                        },
                    )
                }
            }
        }

        Expression::RequestBodyPointer { pointer } => {
            let body = context
                .request()?
                .body
                .as_ref()
                .ok_or(EvaluationError::MissingBody("request"))?;
            body.pointer(pointer)
                .cloned()
                .ok_or_else(|| EvaluationError::MissingField {
                    pointer: pointer.clone(),
                })
        }

        Expression::StatusCode => Ok(Value::String(context.response()?.status.to_string())),

        Expression::Method => Ok(Value::String(context.request()?.method.to_string())),

        Expression::Url => {
            if let Some(response) = context.response
                && !response.url.is_empty()
            {
                return Ok(Value::String(response.url.clone()));
            }
            Ok(Value::String(context.request()?.render_path()))
        }

        Expression::Template { parts } => {
            let mut text = String::new();
            for part in parts {
                text.push_str(&to_parameter_string(&evaluate(part, context)?));
            }
            Ok(Value::String(text))
        }

        Expression::Composite { value } => match value {
            Composite::Object(fields) => {
                let mut object = serde_json::Map::new();
                for (key, field) in fields {
                    object.insert(key.clone(), evaluate(field, context)?);
                }
                Ok(Value::Object(object))
            }
            Composite::Array(items) => items
                .iter()
                .map(|item| evaluate(item, context))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
        },
    }
}

fn response_header<'a>(context: &EvaluationContext<'a>, header: &str) -> Result<&'a str> {
    context
        .response()?
        .header(header)
        .ok_or_else(|| EvaluationError::MissingHeader {
            header: header.to_string(),
        })
}

/// First capture group of `pattern` in `value`, `None` when it does not match.
fn capture(pattern: &str, value: &str) -> Result<Option<String>> {
    let regex = compiled(pattern)?;
    Ok(regex
        .captures(value)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string()))
}

/// Invalid patterns are not cached and fail on every use.
fn compiled(pattern: &str) -> Result<Regex> {
    if let Some(entry) = PATTERNS.get(pattern) {
        return Ok(entry.value().clone());
    }
    let regex = validate_pattern(pattern)?;
    PATTERNS.insert(pattern.to_string(), regex.clone());
    Ok(regex)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use statewalk_dsl::expression::parse_value;
    use statewalk_dsl::{HttpMethod, ParameterLocation, parse_expression};

    fn eval(expression: &str, response: &Response) -> Result<Value> {
        let expression = parse_expression(expression).unwrap();
        evaluate(&expression, &EvaluationContext::new(None, Some(response)))
    }

    #[test]
    fn test_nested_composite_body() {
        let response = Response::new(201).with_json(json!({
            "id": 123, "author": "alice", "category": "blog"
        }));
        let template = parse_value(&json!({
            "user_id": "$response.body#/id",
            "metadata": {
                "created_by": "$response.body#/author",
                "tags": ["$response.body#/category", "static-value"]
            }
        }))
        .unwrap();

        let value = evaluate(&template, &EvaluationContext::new(None, Some(&response))).unwrap();

        assert_eq!(
            value,
            json!({
                "user_id": 123,
                "metadata": {"created_by": "alice", "tags": ["blog", "static-value"]}
            })
        );
    }

    #[test]
    fn test_composite_fails_fast() {
        let response = Response::new(200).with_json(json!({"id": 1}));
        let template = parse_value(&json!({"a": "$response.body#/id", "b": ["$response.body#/missing"]}))
            .unwrap();
        let err = evaluate(&template, &EvaluationContext::new(None, Some(&response))).unwrap_err();
        assert_eq!(
            err,
            EvaluationError::MissingField {
                pointer: "/missing".into()
            }
        );
    }

    #[test]
    fn test_header_regex() {
        let response = Response::new(201).with_header("Location", "/users/42");
        assert_eq!(
            eval("$response.header.Location#regex:/users/(.+)", &response).unwrap(),
            json!("42")
        );
        assert_eq!(
            eval("$response.header.Location#regex:/orders/(.+)", &response).unwrap(),
            json!("")
        );
        assert_eq!(
            eval("$response.header.ETag#regex:(.+)", &response).unwrap_err().kind(),
            "missing_header"
        );
    }

    #[test]
    fn test_plain_header_status_and_url() {
        let response = Response::new(201)
            .with_header("X-Request-Id", "abc")
            .with_url("http://api.test/users");
        assert_eq!(eval("$response.header.x-request-id", &response).unwrap(), json!("abc"));
        assert_eq!(eval("$statusCode", &response).unwrap(), json!("201"));
        assert_eq!(eval("$url", &response).unwrap(), json!("http://api.test/users"));
    }

    #[test]
    fn test_patterns_are_compiled_once() {
        let response = Response::new(201).with_header("Location", "/invoices/77");
        let pattern = "/invoices/(\\d+)";
        assert!(PATTERNS.get(pattern).is_none());

        for _ in 0..3 {
            assert_eq!(
                eval("$response.header.Location#regex:/invoices/(\\d+)", &response).unwrap(),
                json!("77")
            );
        }
        assert_eq!(PATTERNS.get(pattern).unwrap().value().as_str(), pattern);

        let two_groups = Expression::ResponseHeaderRegex {
            header: "Location".into(),
            pattern: "/(invoices)/(\\d+)".into(),
        };
        let context = EvaluationContext::new(None, Some(&response));
        assert!(evaluate(&two_groups, &context).is_err());
        assert!(PATTERNS.get("/(invoices)/(\\d+)").is_none());
    }

    #[test]
    fn test_missing_body() {
        let response = Response::new(204);
        assert_eq!(
            eval("$response.body#/id", &response).unwrap_err(),
            EvaluationError::MissingBody("response")
        );
    }

    #[test]
    fn test_request_expressions() {
        let mut request = Request::new("getFile".into(), HttpMethod::Get, "/files/{name}");
        request.set_parameter(ParameterLocation::Path, "name", json!("report-2024.pdf"));
        request.set_parameter(ParameterLocation::Query, "limit", json!(10));
        request.body = Some(json!({"owner": {"id": 7}}));
        let response = Response::new(200);
        let context = EvaluationContext::new(Some(&request), Some(&response));

        let eval = |e: &str| evaluate(&parse_expression(e).unwrap(), &context);

        assert_eq!(eval("$request.query.limit").unwrap(), json!(10));
        assert_eq!(eval("$request.path.name#regex:-(\\d+)\\.").unwrap(), json!("2024"));
        assert!(matches!(
            eval("$request.path.name#regex:^(\\d+)$"),
            Err(EvaluationError::PatternMismatch { .. })
        ));
        assert_eq!(eval("$request.body#/owner/id").unwrap(), json!(7));
        assert_eq!(eval("$method").unwrap(), json!("GET"));
        assert!(matches!(
            eval("$request.header.X-Missing"),
            Err(EvaluationError::MissingRequestParameter { .. })
        ));
    }

    #[test]
    fn test_template_interpolation() {
        let response = Response::new(200).with_json(json!({"id": 5, "slug": "x"}));
        assert_eq!(
            eval("item-{$response.body#/id}-{$response.body#/slug}", &response).unwrap(),
            json!("item-5-x")
        );
    }
}
