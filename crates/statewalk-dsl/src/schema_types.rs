// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
// Model Type Definitions - Single Source of Truth
//
// These types describe the operation model and the link graph and are used by:
// 1. Catalog - normalized view of every API operation
// 2. Link Registry - declared, inferred and learned edges between operations
// 3. spec::link_schema - JSON Schema generation via schemars
//
// NOTE: This file is included by lib.rs via include!() macro, so it cannot
// have `use` statements or `//!` doc comments. Imports are provided by the
// including module.

/// Model version - bump when making breaking changes to link definitions
pub const DSL_VERSION: &str = "1.0.0";

// ============================================================================
// Operations
// ============================================================================

/// HTTP method of an operation
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    JsonSchema,
    strum::Display,
    strum::EnumString,
    strum::VariantNames,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum HttpMethod {
    Get,
    Put,
    Post,
    Delete,
    Options,
    Head,
    Patch,
    Trace,
}

/// Where a parameter is carried in the request
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    JsonSchema,
    strum::Display,
    strum::EnumString,
    strum::VariantNames,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
    Cookie,
}

/// Stable identity of an operation.
///
/// The declared `operationId` when present, otherwise `"METHOD /path"`.
/// Links reference operations exclusively through this key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct OperationKey(pub String);

/// A single parameter definition with its schema fully resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    /// Parameter name as declared (case preserved)
    pub name: String,

    /// Request location
    #[serde(rename = "in")]
    pub location: ParameterLocation,

    /// Whether the parameter must be present. Path parameters are always required.
    #[serde(default)]
    pub required: bool,

    /// JSON Schema of the parameter value
    #[serde(default)]
    pub schema: serde_json::Value,
}

/// Request body schema for a single media type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RequestBody {
    /// Media type, e.g. `application/json`
    pub media_type: String,

    /// JSON Schema of the payload
    #[serde(default)]
    pub schema: serde_json::Value,

    /// Whether the body must be sent
    #[serde(default)]
    pub required: bool,
}

/// Response status key as written in the schema.
///
/// Accepts exact codes (`201`), wildcard classes (`2XX`, `20X`) and `default`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct StatusPattern(pub String);

/// A declared response of an operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResponseDefinition {
    /// Status key this definition is declared under
    pub status: StatusPattern,

    /// JSON Schema of the JSON payload, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<serde_json::Value>,

    /// Raw link objects (`links` and `x-links`), keyed by link name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub links: BTreeMap<String, serde_json::Value>,
}

/// Normalized view of one API operation.
///
/// Immutable once built; owned by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    /// Stable identity used by links
    pub key: OperationKey,

    /// HTTP method
    pub method: HttpMethod,

    /// Path template, e.g. `/users/{userId}`
    pub path: String,

    /// Declared `operationId`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,

    /// Ordered parameter definitions (path-level parameters merged in)
    #[serde(default)]
    pub parameters: Vec<Parameter>,

    /// Request bodies, one per media type
    #[serde(default)]
    pub request_bodies: Vec<RequestBody>,

    /// Declared responses in schema order
    #[serde(default)]
    pub responses: Vec<ResponseDefinition>,
}

// ============================================================================
// Runtime Expressions
// ============================================================================

/// A runtime expression describing how to derive a value from a previous step.
///
/// String forms (as written in link definitions):
/// - `$response.body#/id` - JSON pointer into the response body
/// - `$response.header.Location#regex:/users/(.+)` - single capture group over a header
/// - `$request.path.id`, `$request.query.limit`, `$request.body#/name`
/// - `$statusCode`, `$method`, `$url`
/// - `user-{$response.body#/id}` - embedded expressions interpolated into a string
///
/// Objects and arrays whose leaves are expressions form a `Composite`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Expression {
    /// A value used as-is
    Literal { value: serde_json::Value },

    /// JSON pointer into the response body; an empty pointer selects the whole body
    ResponseBodyPointer { pointer: String },

    /// Raw value of a response header
    ResponseHeader { header: String },

    /// Single-capture-group regex applied to a response header.
    /// A non-matching header evaluates to an empty string.
    ResponseHeaderRegex { header: String, pattern: String },

    /// Parameter of the request that produced the response
    RequestParameter {
        location: ParameterLocation,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pattern: Option<String>,
    },

    /// JSON pointer into the request body that produced the response
    RequestBodyPointer { pointer: String },

    /// Response status code as a string
    StatusCode,

    /// Request method in upper case
    Method,

    /// Full request URL
    Url,

    /// String interpolation of several parts
    Template { parts: Vec<Expression> },

    /// Object or array structure with expression leaves
    Composite { value: Composite },
}

/// Inner structure of a composite expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Composite {
    /// Each field maps to an expression
    Object(BTreeMap<String, Expression>),
    /// Each element is an expression
    Array(Vec<Expression>),
}

// ============================================================================
// Links
// ============================================================================

/// How a link entered the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LinkOrigin {
    /// Written in the schema (`links` / `x-links`)
    Declared,
    /// Produced by static analysis of the catalog
    Inferred,
    /// Learned from a `Location` header at runtime; larger sequence is newer
    Learned { sequence: u64 },
}

/// Target parameter of a link together with the expression that feeds it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LinkParameter {
    /// Location of the target parameter
    #[serde(rename = "in")]
    pub location: ParameterLocation,

    /// Name of the target parameter
    pub name: String,

    /// Expression evaluated against the source response
    pub expression: Expression,
}

/// Directed edge `(source, status) -> target`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    /// Link name (declared name or a generated one such as `GetUser`)
    pub name: String,

    /// Operation whose response feeds the link
    pub source: OperationKey,

    /// Response status key of the source this link hangs from
    pub status: StatusPattern,

    /// Operation that consumes the data
    pub target: OperationKey,

    /// Parameter mappings
    #[serde(default)]
    pub parameters: Vec<LinkParameter>,

    /// Request body template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<Expression>,

    /// Merge the evaluated body into a generated object body instead of replacing it
    #[serde(default = "default_merge_body")]
    pub merge_body: bool,

    /// Where the link came from
    pub origin: LinkOrigin,
}

fn default_merge_body() -> bool {
    true
}

// ============================================================================
// Captured Values
// ============================================================================

/// Where a captured value came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    /// Operation whose response carried the value
    pub operation: OperationKey,

    /// Response status code
    pub status: u16,

    /// Run that executed the operation, if it happened inside a state machine run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

/// A field value observed in a successful response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CapturedValue {
    /// Resource type, e.g. `User`
    pub resource: String,

    /// Field name within the resource, e.g. `id`
    pub field: String,

    /// Observed value
    pub value: serde_json::Value,

    /// Origin of the value
    pub provenance: Provenance,

    /// Store-assigned insertion order; larger is more recent
    #[serde(default)]
    pub sequence: u64,
}
