// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Link usage statistics.
//!
//! Counts, per `source -> status -> target`, the response codes seen when a
//! link supplied a request's inputs.

use std::collections::BTreeMap;
use std::fmt::Write;

use serde::Serialize;
use statewalk_dsl::{OperationKey, StatusPattern};

use crate::resolver::LinkUse;

/// Response codes observed for one link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetStatistic {
    pub link: String,
    pub target: OperationKey,
    pub responses: BTreeMap<u16, u64>,
}

impl TargetStatistic {
    pub fn total(&self) -> u64 {
        self.responses.values().sum()
    }
}

/// `source -> status -> "target:link"` tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct LinkStatistics {
    tree: BTreeMap<OperationKey, BTreeMap<StatusPattern, BTreeMap<String, TargetStatistic>>>,
}

impl LinkStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one response obtained through `link`.
    pub fn record(&mut self, link: &LinkUse, status: u16) {
        *self
            .entry(&link.source, &link.status, &link.target, &link.name)
            .responses
            .entry(status)
            .or_default() += 1;
    }

    /// Add every count of `other`.
    pub fn merge(&mut self, other: &LinkStatistics) {
        for (source, statuses) in &other.tree {
            for (status, targets) in statuses {
                for stat in targets.values() {
                    let entry = self.entry(source, status, &stat.target, &stat.link);
                    for (code, count) in &stat.responses {
                        *entry.responses.entry(*code).or_default() += count;
                    }
                }
            }
        }
    }

    pub fn get(
        &self,
        source: &OperationKey,
        status: &StatusPattern,
        target: &OperationKey,
        link: &str,
    ) -> Option<&TargetStatistic> {
        self.tree
            .get(source)?
            .get(status)?
            .get(&format!("{}:{}", target, link))
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Render as an indented tree.
    ///
    /// ```text
    /// createOrder
    /// └── 201
    ///     └── GetOrder -> getOrder
    ///         └── 200: 3
    /// ```
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (source, statuses) in &self.tree {
            let _ = writeln!(out, "{}", source);
            let status_count = statuses.len();
            for (i, (status, targets)) in statuses.iter().enumerate() {
                let last_status = i + 1 == status_count;
                let status_indent = if last_status { "    " } else { "│   " };
                let _ = writeln!(out, "{}{}", branch(last_status), status);
                let target_count = targets.len();
                for (j, stat) in targets.values().enumerate() {
                    let last_target = j + 1 == target_count;
                    let _ = writeln!(
                        out,
                        "{}{}{} -> {}",
                        status_indent,
                        branch(last_target),
                        stat.link,
                        stat.target
                    );
                    let target_indent = if last_target { "    " } else { "│   " };
                    let code_count = stat.responses.len();
                    for (k, (code, count)) in stat.responses.iter().enumerate() {
                        let _ = writeln!(
                            out,
                            "{}{}{}{}: {}",
                            status_indent,
                            target_indent,
                            branch(k + 1 == code_count),
                            code,
                            count
                        );
                    }
                }
            }
        }
        out
    }

    fn entry(
        &mut self,
        source: &OperationKey,
        status: &StatusPattern,
        target: &OperationKey,
        link: &str,
    ) -> &mut TargetStatistic {
        self.tree
            .entry(source.clone())
            .or_default()
            .entry(status.clone())
            .or_default()
            .entry(format!("{}:{}", target, link))
            .or_insert_with(|| TargetStatistic {
                link: link.to_string(),
                target: target.clone(),
                responses: BTreeMap::new(),
            })
    }
}

fn branch(last: bool) -> &'static str {
    if last { "└── " } else { "├── " }
}
