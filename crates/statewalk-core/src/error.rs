// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for statewalk-core.
//!
//! Only [`SchemaError`] and [`ConfigError`] stop a session. Evaluation and
//! transport errors are absorbed by the state machine: the first makes a
//! transition unusable for the current step, the second is recorded as a step
//! failure.

use statewalk_dsl::{ExpressionError, ParameterLocation};

pub use crate::config::ConfigError;

/// Result type using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Malformed or unresolvable schema input.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum SchemaError {
    /// The document has no `paths` object.
    #[error("schema has no `paths` object")]
    MissingPaths,

    /// A path template is malformed.
    #[error("invalid path template `{path}`: {reason}")]
    InvalidPath { path: String, reason: String },

    /// A `{placeholder}` has no matching path parameter.
    #[error("{operation}: path placeholder `{parameter}` has no declared parameter")]
    UndeclaredPathParameter { operation: String, parameter: String },

    /// A `$ref` is still present where a resolved schema was expected.
    #[error("{location}: unresolved reference `{reference}`")]
    UnresolvedReference { location: String, reference: String },

    /// A parameter definition is incomplete or inconsistent.
    #[error("{operation}: invalid parameter: {reason}")]
    InvalidParameter { operation: String, reason: String },

    /// A link points to an operation that is not in the catalog.
    #[error("unknown operation `{0}`")]
    UnknownOperation(String),

    /// A declared link cannot be interpreted.
    #[error("{operation}: invalid link `{name}`: {reason}")]
    InvalidLink {
        operation: String,
        name: String,
        reason: String,
    },
}

/// Failure to evaluate an expression against a step.
///
/// Never fatal: the transition that needed the value is skipped for this step.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum EvaluationError {
    #[error("response body has no value at `{pointer}`")]
    MissingField { pointer: String },

    #[error("response has no `{header}` header")]
    MissingHeader { header: String },

    #[error("`{value}` does not match `{pattern}`")]
    PatternMismatch { pattern: String, value: String },

    #[error("{0} has no JSON body")]
    MissingBody(&'static str),

    #[error("request has no {location} parameter `{name}`")]
    MissingRequestParameter {
        location: ParameterLocation,
        name: String,
    },

    #[error("invalid pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

impl EvaluationError {
    /// Short stable name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingField { .. } => "missing_field",
            Self::MissingHeader { .. } => "missing_header",
            Self::PatternMismatch { .. } => "pattern_mismatch",
            Self::MissingBody(_) => "missing_body",
            Self::MissingRequestParameter { .. } => "missing_request_parameter",
            Self::InvalidPattern { .. } => "invalid_pattern",
        }
    }
}

impl From<ExpressionError> for EvaluationError {
    fn from(err: ExpressionError) -> Self {
        match err {
            ExpressionError::InvalidRegex { pattern, reason } => {
                Self::InvalidPattern { pattern, reason }
            }
            other => Self::InvalidPattern {
                pattern: String::new(),
                reason: other.to_string(),
            },
        }
    }
}

/// Transport-level failure of a single request.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum TransportError {
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("request cancelled")]
    Cancelled,
}

/// Top-level engine error.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum EngineError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_error_messages() {
        let err = SchemaError::UndeclaredPathParameter {
            operation: "GET /users/{id}".into(),
            parameter: "id".into(),
        };
        assert_eq!(
            err.to_string(),
            "GET /users/{id}: path placeholder `id` has no declared parameter"
        );
    }

    #[test]
    fn test_evaluation_error_kind() {
        assert_eq!(
            EvaluationError::MissingHeader {
                header: "Location".into()
            }
            .kind(),
            "missing_header"
        );
        assert_eq!(EvaluationError::MissingBody("response").kind(), "missing_body");
    }

    #[test]
    fn test_engine_error_from_schema_error() {
        let err: EngineError = SchemaError::MissingPaths.into();
        assert!(matches!(err, EngineError::Schema(SchemaError::MissingPaths)));
        assert_eq!(err.to_string(), "schema has no `paths` object");
    }
}
