// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Resource Capture Store.
//!
//! Append-only record of values seen in successful responses, keyed by
//! resource type. Shared by every worker: each resource holds a lock-free
//! log ordered by a store-wide sequence number. A value is published under
//! its own sequence, so iteration order is always capture order and the
//! last visible entry is always the most recent one. Readers never wait and
//! appends never copy earlier values.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crossbeam_skiplist::{SkipMap, SkipSet};
use serde_json::{Value, json};
use statewalk_dsl::{CapturedValue, OperationKey, Provenance};
use tracing::trace;

use crate::links::naming;
use crate::links::{Cardinality, ResourceDescriptor};
use crate::transport::Response;

/// Upper bound on the number of captured values offered by [`CaptureStore::augment_schema`].
const MAX_ENUM_VALUES: usize = 16;

/// Values of one resource type.
#[derive(Default)]
struct ResourceLog {
    values: SkipMap<u64, Arc<CapturedValue>>,
    fields: SkipSet<String>,
}

impl ResourceLog {
    /// Field of this resource able to supply `parameter`.
    fn matching_field(&self, resource: &str, parameter: &str) -> Option<String> {
        let fields: Vec<String> = self.fields.iter().map(|e| e.value().clone()).collect();
        naming::find_matching_field(parameter, resource, fields.iter().map(String::as_str))
            .map(|(field, _)| field.to_string())
    }

    /// Values of `field`, newest first.
    fn newest_of<'a>(&'a self, field: &'a str) -> impl Iterator<Item = Arc<CapturedValue>> + 'a {
        self.values
            .iter()
            .rev()
            .filter(move |e| e.value().field == field)
            .map(|e| e.value().clone())
    }
}

#[derive(Default)]
pub struct CaptureStore {
    resources: SkipMap<String, Arc<ResourceLog>>,
    descriptors: HashMap<OperationKey, Vec<ResourceDescriptor>>,
    sequence: AtomicU64,
    count: AtomicUsize,
}

impl CaptureStore {
    /// Store that knows how to read the responses described by `descriptors`.
    pub fn new(descriptors: impl IntoIterator<Item = ResourceDescriptor>) -> Self {
        let mut by_operation: HashMap<OperationKey, Vec<ResourceDescriptor>> = HashMap::new();
        for descriptor in descriptors {
            by_operation
                .entry(descriptor.operation.clone())
                .or_default()
                .push(descriptor);
        }
        Self {
            descriptors: by_operation,
            ..Self::default()
        }
    }

    /// Append one batch of fields of `resource`. Returns the number recorded.
    pub fn record(
        &self,
        resource: &str,
        fields: impl IntoIterator<Item = (String, Value)>,
        provenance: &Provenance,
    ) -> usize {
        let log = self
            .resources
            .get_or_insert_with(resource.to_string(), || Arc::new(ResourceLog::default()))
            .value()
            .clone();

        let mut recorded = 0;
        for (field, value) in fields {
            let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
            log.fields.insert(field.clone());
            log.values.insert(
                sequence,
                Arc::new(CapturedValue {
                    resource: resource.to_string(),
                    field,
                    value,
                    provenance: provenance.clone(),
                    sequence,
                }),
            );
            recorded += 1;
        }
        if recorded > 0 {
            self.count.fetch_add(recorded, Ordering::Relaxed);
            trace!(resource, recorded, "Values captured");
        }
        recorded
    }

    /// Record the resources carried by a successful response of `operation`.
    ///
    /// Uses the descriptors given at construction; collections record every
    /// element. Only scalar fields are kept.
    pub fn record_response(
        &self,
        operation: &OperationKey,
        response: &Response,
        run_id: Option<&str>,
    ) -> usize {
        if !response.is_success() {
            return 0;
        }
        let (Some(descriptors), Some(body)) = (self.descriptors.get(operation), &response.body)
        else {
            return 0;
        };
        let Some(descriptor) = descriptors
            .iter()
            .find(|d| d.status.matches(response.status))
            .or_else(|| descriptors.iter().find(|d| d.status.is_default()))
        else {
            return 0;
        };
        let Some(payload) = body.pointer(&descriptor.pointer) else {
            return 0;
        };

        let provenance = Provenance {
            operation: operation.clone(),
            status: response.status,
            run_id: run_id.map(str::to_string),
        };
        let items: Vec<&Value> = match (descriptor.cardinality, payload) {
            (Cardinality::Many, Value::Array(items)) => items.iter().collect(),
            (Cardinality::One, item) => vec![item],
            _ => Vec::new(),
        };
        items
            .into_iter()
            .filter_map(Value::as_object)
            .map(|object| {
                let fields = object
                    .iter()
                    .filter(|(_, v)| is_scalar(v))
                    .map(|(k, v)| (k.clone(), v.clone()));
                self.record(&descriptor.resource, fields, &provenance)
            })
            .sum()
    }

    /// Most recently captured value of `resource`.
    pub fn sample(&self, resource: &str) -> Option<Arc<CapturedValue>> {
        let log = self.resources.get(resource)?;
        let newest = log.value().values.back()?;
        Some(newest.value().clone())
    }

    /// Most recent value of `resource` able to fill `parameter`.
    ///
    /// The parameter is matched against captured field names with the same
    /// heuristics as static inference (`userId` ~ `User.id`).
    pub fn sample_field(&self, resource: &str, parameter: &str) -> Option<Value> {
        let log = self.resources.get(resource)?;
        let log = log.value();
        let field = log.matching_field(resource, parameter)?;
        let newest = log.newest_of(&field).next()?;
        Some(newest.value.clone())
    }

    /// Every value captured for `resource`, oldest first.
    pub fn values(&self, resource: &str) -> Vec<Arc<CapturedValue>> {
        self.resources
            .get(resource)
            .map(|log| log.value().values.iter().map(|e| e.value().clone()).collect())
            .unwrap_or_default()
    }

    /// Widen a parameter schema so generation may also pick captured values.
    ///
    /// Returns the schema unchanged when nothing matching was captured.
    pub fn augment_schema(&self, resource: &str, parameter: &str, schema: &Value) -> Value {
        let Some(log) = self.resources.get(resource) else {
            return schema.clone();
        };
        let log = log.value();
        let Some(field) = log.matching_field(resource, parameter) else {
            return schema.clone();
        };

        let mut known: Vec<Value> = Vec::new();
        for value in log.newest_of(&field) {
            if !known.contains(&value.value) {
                known.push(value.value.clone());
            }
            if known.len() == MAX_ENUM_VALUES {
                break;
            }
        }
        json!({"anyOf": [schema, {"enum": known}]})
    }

    /// Resource types with at least one captured value.
    pub fn resources(&self) -> Vec<String> {
        self.resources
            .iter()
            .filter(|e| !e.value().values.is_empty())
            .map(|e| e.key().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_))
}
