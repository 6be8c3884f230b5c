// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Links declared in the schema (`links` and `x-links`).

use serde_json::Value;
use statewalk_dsl::expression::parse_value;
use statewalk_dsl::{
    Link, LinkOrigin, LinkParameter, Operation, ParameterLocation, StatusPattern,
};
use tracing::debug;

use crate::catalog::Catalog;
use crate::error::SchemaError;

/// Vendor extension holding link options.
pub const LINK_EXTENSION: &str = "x-statewalk";

/// Parse every declared link of every operation.
pub fn declared_links(catalog: &Catalog) -> Result<Vec<Link>, SchemaError> {
    let mut links = Vec::new();
    for operation in catalog.operations() {
        for response in &operation.responses {
            for (name, definition) in &response.links {
                links.push(parse_link(
                    catalog,
                    operation,
                    &response.status,
                    name,
                    definition,
                )?);
            }
        }
    }
    debug!(count = links.len(), "Declared links parsed");
    Ok(links)
}

/// Parse one link object hanging from `source`'s `status` response.
pub fn parse_link(
    catalog: &Catalog,
    source: &Operation,
    status: &StatusPattern,
    name: &str,
    definition: &Value,
) -> Result<Link, SchemaError> {
    let invalid = |reason: String| SchemaError::InvalidLink {
        operation: source.key.to_string(),
        name: name.to_string(),
        reason,
    };

    let definition = definition
        .as_object()
        .ok_or_else(|| invalid("link must be an object".to_string()))?;

    let target = if let Some(id) = definition.get("operationId").and_then(Value::as_str) {
        catalog
            .find_by_operation_id(id)
            .ok_or_else(|| invalid(format!("unknown operationId `{}`", id)))?
    } else if let Some(reference) = definition.get("operationRef").and_then(Value::as_str) {
        catalog
            .find_by_operation_ref(reference)
            .ok_or_else(|| invalid(format!("unknown operationRef `{}`", reference)))?
    } else {
        return Err(invalid(
            "either operationId or operationRef is required".to_string(),
        ));
    };

    let mut parameters = Vec::new();
    if let Some(declared) = definition.get("parameters") {
        let declared = declared
            .as_object()
            .ok_or_else(|| invalid("`parameters` must be an object".to_string()))?;
        for (key, value) in declared {
            let (location, parameter) = qualify_parameter(target, key).ok_or_else(|| {
                invalid(format!(
                    "{} has no parameter `{}`",
                    target.key, key
                ))
            })?;
            let expression = parse_value(value).map_err(|e| invalid(e.to_string()))?;
            parameters.push(LinkParameter {
                location,
                name: parameter,
                expression,
            });
        }
    }

    let request_body = definition
        .get("requestBody")
        .map(parse_value)
        .transpose()
        .map_err(|e| invalid(e.to_string()))?;

    let merge_body = match definition.get(LINK_EXTENSION) {
        Some(options) => options
            .get("merge_body")
            .map(|v| {
                v.as_bool()
                    .ok_or_else(|| invalid("`merge_body` must be a boolean".to_string()))
            })
            .transpose()?
            .unwrap_or(true),
        None => true,
    };

    Ok(Link {
        name: name.to_string(),
        source: source.key.clone(),
        status: status.clone(),
        target: target.key.clone(),
        parameters,
        request_body,
        merge_body,
        origin: LinkOrigin::Declared,
    })
}

/// Resolve a link parameter key (`id`, `path.id`, `header.X-Id`) against the target.
fn qualify_parameter(target: &Operation, key: &str) -> Option<(ParameterLocation, String)> {
    if let Some((prefix, name)) = key.split_once('.')
        && let Ok(location) = prefix.parse::<ParameterLocation>()
    {
        return target
            .parameter(location, name)
            .map(|p| (location, p.name.clone()));
    }
    target
        .find_parameter(key)
        .map(|p| (p.location, p.name.clone()))
}
