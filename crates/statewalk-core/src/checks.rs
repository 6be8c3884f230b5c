// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Response checks.
//!
//! The engine treats checks as opaque: a step succeeds when every check
//! returns no findings. A finding marked unrecoverable ends the run unless
//! the engine is configured to continue on failure.

use serde::{Deserialize, Serialize};
use statewalk_dsl::{HttpMethod, Operation};

use crate::resolver::Exchange;
use crate::transport::{Request, Response};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// One problem reported by a check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub check: String,
    pub title: String,
    pub message: String,
    pub severity: Severity,
    /// Whether the run should stop here
    pub unrecoverable: bool,
}

/// What a check gets to look at.
#[derive(Debug, Clone, Copy)]
pub struct CheckContext<'a> {
    pub operation: &'a Operation,
    pub request: &'a Request,
    pub response: &'a Response,
    /// Earlier steps of the same run
    pub history: &'a [Exchange],
}

pub trait Check: Send + Sync {
    fn name(&self) -> &'static str;

    fn check(&self, context: &CheckContext<'_>) -> Vec<Finding>;
}

/// Checks enabled by default.
pub fn default_checks() -> Vec<Box<dyn Check>> {
    vec![
        Box::new(NotAServerError),
        Box::new(UseAfterFree),
        Box::new(StatusCodeConformance),
    ]
}

/// 5xx responses.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotAServerError;

impl Check for NotAServerError {
    fn name(&self) -> &'static str {
        "not_a_server_error"
    }

    fn check(&self, context: &CheckContext<'_>) -> Vec<Finding> {
        if context.response.status < 500 {
            return Vec::new();
        }
        vec![Finding {
            check: self.name().to_string(),
            title: "Server error".to_string(),
            message: format!(
                "{} responded with {}",
                context.operation.label(),
                context.response.status
            ),
            severity: Severity::High,
            unrecoverable: true,
        }]
    }
}

/// A resource deleted earlier in the run is still served.
#[derive(Debug, Clone, Copy, Default)]
pub struct UseAfterFree;

impl Check for UseAfterFree {
    fn name(&self) -> &'static str {
        "use_after_free"
    }

    fn check(&self, context: &CheckContext<'_>) -> Vec<Finding> {
        if !context.response.is_success() || context.request.method == HttpMethod::Delete {
            return Vec::new();
        }
        let path = context.request.render_path();
        let deleted = context.history.iter().rev().find(|exchange| {
            exchange.request.method == HttpMethod::Delete
                && exchange.response.is_success()
                && is_within(&path, &exchange.request.render_path())
        });
        let Some(deleted) = deleted else {
            return Vec::new();
        };
        vec![Finding {
            check: self.name().to_string(),
            title: "Use after free".to_string(),
            message: format!(
                "{} {} responded with {} after {} {} deleted it",
                context.request.method,
                path,
                context.response.status,
                deleted.request.method,
                deleted.request.render_path()
            ),
            severity: Severity::Critical,
            unrecoverable: true,
        }]
    }
}

fn is_within(path: &str, resource: &str) -> bool {
    path.strip_prefix(resource)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// Status codes the operation does not document.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusCodeConformance;

impl Check for StatusCodeConformance {
    fn name(&self) -> &'static str {
        "status_code_conformance"
    }

    fn check(&self, context: &CheckContext<'_>) -> Vec<Finding> {
        let operation = context.operation;
        if operation.responses.is_empty() || operation.response_for(context.response.status).is_some() {
            return Vec::new();
        }
        let documented: Vec<&str> = operation.responses.iter().map(|r| r.status.as_str()).collect();
        vec![Finding {
            check: self.name().to_string(),
            title: "Undocumented status code".to_string(),
            message: format!(
                "{} responded with {}; documented: {}",
                operation.label(),
                context.response.status,
                documented.join(", ")
            ),
            severity: Severity::Low,
            unrecoverable: false,
        }]
    }
}
