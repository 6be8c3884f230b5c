// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Session scheduler.
//!
//! A fixed pool of workers pulls run indices from a shared counter and
//! executes one state machine run at a time. Finished runs are aggregated
//! into a [`SessionReport`] by the scheduler task, which also enforces
//! `exit_first` and `max_failures` through a shared cancellation token.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use governor::RateLimiter;
use serde::Serialize;
use statewalk_dsl::OperationKey;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::capture::CaptureStore;
use crate::catalog::Catalog;
use crate::checks::Severity;
use crate::config::EngineConfig;
use crate::error::SchemaError;
use crate::links::{LinkRegistry, resource_descriptors};
use crate::state_machine::{RunSettings, StateMachine, StateMachineRun, TerminationReason};
use crate::statistic::LinkStatistics;
use crate::transport::Transport;

/// Check name used for transport failures in the report.
pub const TRANSPORT_FAILURE: &str = "transport_error";

/// Session-level limits.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub max_runs: u64,
    pub workers: usize,
    pub exit_first: bool,
    pub max_failures: Option<usize>,
    pub seed: Option<u64>,
}

impl From<&EngineConfig> for SessionSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_runs: config.max_runs,
            workers: config.workers.max(1),
            exit_first: config.exit_first,
            max_failures: config.max_failures,
            seed: config.seed,
        }
    }
}

/// A distinct failure, kept once however often it was seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    pub check: String,
    pub operation: OperationKey,
    pub title: String,
    /// Message of the first occurrence
    pub message: String,
    pub severity: Severity,
    pub occurrences: u64,
    pub first_run: String,
}

/// Outline of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub id: String,
    pub seed: u64,
    pub operations: Vec<OperationKey>,
    pub termination: TerminationReason,
    pub failed: bool,
}

/// Result of a session.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionReport {
    pub seed: u64,
    pub runs: Vec<RunSummary>,
    pub steps: usize,
    pub failures: Vec<FailureRecord>,
    pub terminations: BTreeMap<String, usize>,
    pub link_statistics: LinkStatistics,
    pub captured_values: usize,
    pub links: usize,
    pub cancelled: bool,
}

impl SessionReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Add a finished run, merging its failures into the distinct set.
    pub fn add_run(&mut self, run: &StateMachineRun) {
        self.steps += run.steps.len();
        *self
            .terminations
            .entry(run.termination.to_string())
            .or_default() += 1;

        for step in &run.steps {
            if let Some(response) = &step.response {
                for link in &step.links {
                    self.link_statistics.record(link, response.status);
                }
            }
            if let Some(error) = &step.transport_error {
                self.add_failure(
                    TRANSPORT_FAILURE,
                    &step.operation,
                    "Transport error",
                    error,
                    Severity::High,
                    &run.id,
                );
            }
            for finding in &step.findings {
                self.add_failure(
                    &finding.check,
                    &step.operation,
                    &finding.title,
                    &finding.message,
                    finding.severity,
                    &run.id,
                );
            }
        }

        self.runs.push(RunSummary {
            id: run.id.clone(),
            seed: run.seed,
            operations: run.steps.iter().map(|s| s.operation.clone()).collect(),
            termination: run.termination,
            failed: run.is_failure(),
        });
    }

    fn add_failure(
        &mut self,
        check: &str,
        operation: &OperationKey,
        title: &str,
        message: &str,
        severity: Severity,
        run_id: &str,
    ) {
        if let Some(existing) = self
            .failures
            .iter_mut()
            .find(|f| f.check == check && &f.operation == operation && f.title == title)
        {
            existing.occurrences += 1;
            return;
        }
        self.failures.push(FailureRecord {
            check: check.to_string(),
            operation: operation.clone(),
            title: title.to_string(),
            message: message.to_string(),
            severity,
            occurrences: 1,
            first_run: run_id.to_string(),
        });
    }
}

pub struct Scheduler {
    machine: StateMachine,
    settings: SessionSettings,
    token: CancellationToken,
}

impl Scheduler {
    pub fn new(machine: StateMachine, settings: SessionSettings) -> Self {
        Self {
            machine,
            settings,
            token: CancellationToken::new(),
        }
    }

    /// Wire up the whole engine for `catalog` from configuration.
    ///
    /// Seeds the link registry with declared and inferred links and installs
    /// the shared rate limiter when one is configured.
    pub fn from_config(
        catalog: Catalog,
        transport: Arc<dyn Transport>,
        config: &EngineConfig,
    ) -> Result<Self, SchemaError> {
        let registry = Arc::new(LinkRegistry::from_catalog(&catalog)?);
        let captures = Arc::new(CaptureStore::new(resource_descriptors(&catalog)));
        let mut machine = StateMachine::new(Arc::new(catalog), registry, captures, transport)
            .with_settings(RunSettings::from(config));
        if let Some(rate) = &config.rate_limit {
            machine = machine.with_rate_limiter(Arc::new(RateLimiter::direct(rate.quota())));
        }
        Ok(Self::new(machine, SessionSettings::from(config)))
    }

    /// Token that stops the session; cancelling it ends every run at its next step.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn machine(&self) -> &StateMachine {
        &self.machine
    }

    /// Run the session to completion or cancellation.
    pub async fn run(&self) -> SessionReport {
        let seed = self.settings.seed.unwrap_or_else(StateMachine::random_seed);
        let workers = self.settings.workers.max(1);
        info!(
            seed,
            workers,
            max_runs = self.settings.max_runs,
            operations = self.machine.catalog().len(),
            links = self.machine.registry().len(),
            "Session started"
        );

        let next = Arc::new(AtomicU64::new(0));
        let (tx, mut rx) = mpsc::unbounded_channel::<StateMachineRun>();
        let mut handles = Vec::with_capacity(workers);

        for worker in 0..workers {
            let machine = self.machine.clone();
            let token = self.token.clone();
            let next = next.clone();
            let tx = tx.clone();
            let max_runs = self.settings.max_runs;

            handles.push(tokio::spawn(async move {
                loop {
                    if token.is_cancelled() {
                        break;
                    }
                    let index = next.fetch_add(1, Ordering::SeqCst);
                    if index >= max_runs {
                        break;
                    }
                    let run = machine.run(StateMachine::run_seed(seed, index), &token).await;
                    if tx.send(run).is_err() {
                        break;
                    }
                }
                tracing::debug!(worker, "Worker finished");
            }));
        }
        drop(tx);

        let mut report = SessionReport {
            seed,
            ..SessionReport::default()
        };
        while let Some(run) = rx.recv().await {
            report.add_run(&run);
            if self.token.is_cancelled() {
                continue;
            }
            if self.settings.exit_first && run.is_failure() {
                warn!(run_id = %run.id, "Failure found, stopping session");
                self.token.cancel();
            } else if let Some(max) = self.settings.max_failures
                && report.failures.len() >= max
            {
                warn!(failures = report.failures.len(), max, "Failure budget exhausted, stopping session");
                self.token.cancel();
            }
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker task failed");
            }
        }

        report.cancelled = self.token.is_cancelled();
        report.captured_values = self.machine.captures().len();
        report.links = self.machine.registry().len();
        info!(
            runs = report.runs.len(),
            steps = report.steps,
            failures = report.failures.len(),
            cancelled = report.cancelled,
            "Session finished"
        );
        report
    }
}
