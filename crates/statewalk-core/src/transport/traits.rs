// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Transport trait definitions.
//!
//! Defines the abstract interface used to execute a fully resolved request.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use statewalk_dsl::coercion::to_parameter_string;
use statewalk_dsl::{HttpMethod, OperationKey, ParameterLocation};

pub use crate::error::TransportError;

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// A fully resolved request.
///
/// Parameter values are kept as JSON so that `$request.*` expressions can
/// read them back with their original types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Operation this request exercises
    pub operation: OperationKey,
    pub method: HttpMethod,
    /// Path template, e.g. `/users/{id}`
    pub path_template: String,
    pub path_parameters: BTreeMap<String, Value>,
    pub query: BTreeMap<String, Value>,
    pub headers: BTreeMap<String, Value>,
    pub cookies: BTreeMap<String, Value>,
    pub body: Option<Value>,
    /// Media type of `body`
    pub media_type: Option<String>,
}

impl Request {
    pub fn new(operation: OperationKey, method: HttpMethod, path_template: impl Into<String>) -> Self {
        Self {
            operation,
            method,
            path_template: path_template.into(),
            path_parameters: BTreeMap::new(),
            query: BTreeMap::new(),
            headers: BTreeMap::new(),
            cookies: BTreeMap::new(),
            body: None,
            media_type: None,
        }
    }

    /// Value of a parameter by location. Header names compare case-insensitively.
    pub fn parameter(&self, location: ParameterLocation, name: &str) -> Option<&Value> {
        match location {
            ParameterLocation::Path => self.path_parameters.get(name),
            ParameterLocation::Query => self.query.get(name),
            ParameterLocation::Cookie => self.cookies.get(name),
            ParameterLocation::Header => self
                .headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v),
        }
    }

    /// Set a parameter value by location.
    pub fn set_parameter(&mut self, location: ParameterLocation, name: impl Into<String>, value: Value) {
        let map = match location {
            ParameterLocation::Path => &mut self.path_parameters,
            ParameterLocation::Query => &mut self.query,
            ParameterLocation::Header => &mut self.headers,
            ParameterLocation::Cookie => &mut self.cookies,
        };
        map.insert(name.into(), value);
    }

    /// Path with every placeholder replaced by its percent-encoded value.
    ///
    /// Placeholders without a value are left as they are.
    pub fn render_path(&self) -> String {
        let mut path = self.path_template.clone();
        for (name, value) in &self.path_parameters {
            let encoded = urlencoding::encode(&to_parameter_string(value)).into_owned();
            path = path.replace(&format!("{{{}}}", name), &encoded);
        }
        path
    }

    /// Encoded query string without the leading `?`.
    pub fn query_string(&self) -> String {
        let mut pairs = Vec::new();
        for (name, value) in &self.query {
            let values: Vec<String> = match value {
                Value::Array(items) => items.iter().map(to_parameter_string).collect(),
                other => vec![to_parameter_string(other)],
            };
            for v in values {
                pairs.push(format!(
                    "{}={}",
                    urlencoding::encode(name),
                    urlencoding::encode(&v)
                ));
            }
        }
        pairs.join("&")
    }

    /// Full URL relative to `base_url`.
    pub fn url(&self, base_url: &str) -> String {
        let mut url = format!("{}{}", base_url.trim_end_matches('/'), self.render_path());
        let query = self.query_string();
        if !query.is_empty() {
            url.push('?');
            url.push_str(&query);
        }
        url
    }

    /// `Cookie` header value, if any cookies are set.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(k, v)| format!("{}={}", k, to_parameter_string(v)))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// A response as seen by the engine.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    /// Header pairs in received order; names keep their original case
    pub headers: Vec<(String, String)>,
    /// Parsed JSON body, when the payload is JSON
    pub body: Option<Value>,
    /// Raw payload
    pub text: String,
    /// URL the request was sent to
    pub url: String,
    pub elapsed: Duration,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_json(mut self, body: Value) -> Self {
        self.text = body.to_string();
        self.body = Some(body);
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// First value of a header, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Executes resolved requests.
///
/// Implementations must be safe to share between workers.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Get the transport type name.
    fn transport_type(&self) -> &'static str;

    /// Base URL requests are resolved against, if the transport has one.
    fn base_url(&self) -> Option<&str> {
        None
    }

    /// Send one request and wait for the response.
    async fn send(&self, request: &Request) -> Result<Response>;
}
