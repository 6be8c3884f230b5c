// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Model Type Definitions - Single Source of Truth
//!
//! This crate defines the types shared by every layer of statewalk:
//! - The normalized operation model produced by the catalog
//! - Links between operations (declared, inferred and learned)
//! - The runtime expression language used by links
//! - Captured values recorded from responses
//!
//! The JSON Schema for link definitions is generated from these types via schemars
//! (see [`spec::generate_link_schema`]).

// Provide imports needed by schema_types.rs
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// Include the schema types
include!("schema_types.rs");

// Path template utilities
pub mod paths;

// Runtime expression parsing and rendering
pub mod expression;

// Type coercion for values extracted from responses
pub mod coercion;

// Specification generation (link definition schema)
pub mod spec;

pub use expression::{ExpressionError, parse_expression, parse_template};

// ============================================================================
// OperationKey
// ============================================================================

impl OperationKey {
    /// Key for an operation that has a declared `operationId`.
    pub fn from_id(operation_id: impl Into<String>) -> Self {
        Self(operation_id.into())
    }

    /// Key for an operation identified by its route.
    pub fn from_route(method: HttpMethod, path: &str) -> Self {
        Self(format!("{} {}", method, path))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OperationKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

// ============================================================================
// StatusPattern
// ============================================================================

impl StatusPattern {
    /// Pattern matching exactly one status code.
    pub fn exact(code: u16) -> Self {
        Self(code.to_string())
    }

    /// The `default` response key.
    pub fn default_response() -> Self {
        Self("default".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the `default` key.
    pub fn is_default(&self) -> bool {
        self.0.eq_ignore_ascii_case("default")
    }

    /// Whether the pattern describes a 2xx response.
    pub fn is_success(&self) -> bool {
        self.0.starts_with('2')
    }

    /// Whether the pattern is well-formed: `default` or three characters of digits / `X`.
    pub fn is_valid(&self) -> bool {
        self.is_default()
            || (self.0.len() == 3
                && self
                    .0
                    .bytes()
                    .all(|b| b.is_ascii_digit() || b == b'X' || b == b'x'))
    }

    /// Match a concrete status code, treating `X` as any digit.
    ///
    /// `default` never matches here; use [`Operation::status_matches`] which knows
    /// the other declared responses.
    pub fn matches(&self, code: u16) -> bool {
        if self.is_default() || self.0.len() != 3 {
            return false;
        }
        let code = code.to_string();
        if code.len() != 3 {
            return false;
        }
        self.0
            .bytes()
            .zip(code.bytes())
            .all(|(p, c)| p == c || p == b'X' || p == b'x')
    }

    /// Number of wildcard positions; exact codes have zero.
    pub fn wildcards(&self) -> usize {
        self.0.bytes().filter(|b| *b == b'X' || *b == b'x').count()
    }
}

impl fmt::Display for StatusPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Operation Helpers
// ============================================================================

impl Operation {
    /// Human readable label, e.g. `GET /users/{id}`
    pub fn label(&self) -> String {
        format!("{} {}", self.method, self.path)
    }

    /// Parameter by location and name. Header names compare case-insensitively.
    pub fn parameter(&self, location: ParameterLocation, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| {
            p.location == location
                && if location == ParameterLocation::Header {
                    p.name.eq_ignore_ascii_case(name)
                } else {
                    p.name == name
                }
        })
    }

    /// First parameter with the given name in any location.
    pub fn find_parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn path_parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters
            .iter()
            .filter(|p| p.location == ParameterLocation::Path)
    }

    pub fn required_parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter().filter(|p| p.required)
    }

    /// Declared responses with a 2xx status key.
    pub fn successful_responses(&self) -> impl Iterator<Item = &ResponseDefinition> {
        self.responses.iter().filter(|r| r.status.is_success())
    }

    /// JSON request body, if the operation declares one.
    pub fn json_body(&self) -> Option<&RequestBody> {
        self.request_bodies
            .iter()
            .find(|b| paths::is_json_media_type(&b.media_type))
            .or_else(|| self.request_bodies.first())
    }

    /// Whether the status key of one of this operation's responses covers `code`.
    ///
    /// `default` covers every code not covered by another declared response.
    pub fn status_matches(&self, pattern: &StatusPattern, code: u16) -> bool {
        if pattern.is_default() {
            !self
                .responses
                .iter()
                .any(|r| !r.status.is_default() && r.status.matches(code))
        } else {
            pattern.matches(code)
        }
    }

    /// The declared response that documents `code`, preferring exact keys over wildcards.
    pub fn response_for(&self, code: u16) -> Option<&ResponseDefinition> {
        self.responses
            .iter()
            .filter(|r| !r.status.is_default() && r.status.matches(code))
            .min_by_key(|r| r.status.wildcards())
            .or_else(|| self.responses.iter().find(|r| r.status.is_default()))
    }
}

// ============================================================================
// Link Helpers
// ============================================================================

/// Deduplication key of a link: `(source, target, parameter-set)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkKey {
    pub source: OperationKey,
    pub target: OperationKey,
    pub slots: Vec<String>,
}

impl LinkOrigin {
    /// Ordering used when several links feed the same parameter; larger wins.
    ///
    /// Declared links beat every inferred link, and a learned link beats a
    /// statically inferred one, newer learned links first.
    pub fn precedence(&self) -> (u8, u64) {
        match self {
            LinkOrigin::Declared => (2, 0),
            LinkOrigin::Learned { sequence } => (1, *sequence),
            LinkOrigin::Inferred => (0, 0),
        }
    }

    pub fn is_inferred(&self) -> bool {
        !matches!(self, LinkOrigin::Declared)
    }
}

impl Link {
    /// Deduplication key. The body counts as a single `body` slot.
    pub fn key(&self) -> LinkKey {
        let mut slots: Vec<String> = self
            .parameters
            .iter()
            .map(|p| format!("{}.{}", p.location, p.name))
            .collect();
        if self.request_body.is_some() {
            slots.push("body".to_string());
        }
        slots.sort();
        slots.dedup();
        LinkKey {
            source: self.source.clone(),
            target: self.target.clone(),
            slots,
        }
    }

    /// Mapping for one target parameter.
    pub fn parameter(&self, location: ParameterLocation, name: &str) -> Option<&LinkParameter> {
        self.parameters
            .iter()
            .find(|p| p.location == location && p.name == name)
    }

    /// Label used in logs and statistics: `source -> [status] name -> target`
    pub fn label(&self) -> String {
        format!(
            "{} -> [{}] {} -> {}",
            self.source, self.status, self.name, self.target
        )
    }
}
