// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Stateful sequence generation and execution.
//!
//! Transitions are operations. A run starts from a seeded swarm selection of
//! candidate transitions, then repeatedly picks a candidate whose inputs can
//! be resolved from the run's own history (or the shared capture store),
//! sends it and records what came back. Runs are bounded by `max_steps`.

use std::sync::Arc;
use std::time::Duration;

use governor::DefaultDirectRateLimiter;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use statewalk_dsl::{Operation, OperationKey};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capture::CaptureStore;
use crate::catalog::Catalog;
use crate::checks::{Check, CheckContext, Finding, default_checks};
use crate::config::EngineConfig;
use crate::generation::{GenerationMode, SchemaValueGenerator, ValueGenerator};
use crate::links::{LinkRegistry, LinkSet, LocationLearner};
use crate::resolver::{Exchange, InputResolver, LinkUse, Resolution, ResolvedInput};
use crate::transport::{Request, Response, Transport, TransportError};

/// Mixed into the run seed for swarm selection so it does not mirror step choices.
const SWARM_SEED_SALT: u64 = 0x5157_4152_4d00_0001;

/// Per-run limits and switches.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub max_steps: usize,
    pub swarm_fraction: f64,
    pub continue_on_failure: bool,
    pub request_timeout: Duration,
    pub mode: GenerationMode,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for RunSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_steps: config.max_steps,
            swarm_fraction: config.swarm_fraction,
            continue_on_failure: config.continue_on_failure,
            request_timeout: config.request_timeout,
            mode: GenerationMode::Positive,
        }
    }
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TerminationReason {
    MaxSteps,
    /// An unrecoverable failure
    Failure,
    /// No candidate transition could be resolved
    Exhausted,
    Cancelled,
}

/// One executed transition.
#[derive(Debug, Clone, Serialize)]
pub struct Step {
    pub index: usize,
    pub operation: OperationKey,
    pub inputs: Vec<ResolvedInput>,
    pub request: Request,
    /// `None` when the transport failed
    pub response: Option<Response>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport_error: Option<String>,
    pub findings: Vec<Finding>,
    pub links: Vec<LinkUse>,
}

impl Step {
    pub fn is_failure(&self) -> bool {
        self.transport_error.is_some() || !self.findings.is_empty()
    }

    /// Transport failures and unrecoverable findings end the run.
    pub fn is_unrecoverable(&self) -> bool {
        self.transport_error.is_some() || self.findings.iter().any(|f| f.unrecoverable)
    }
}

/// A finished run.
#[derive(Debug, Clone, Serialize)]
pub struct StateMachineRun {
    pub id: String,
    pub seed: u64,
    pub candidates: Vec<OperationKey>,
    pub steps: Vec<Step>,
    pub termination: TerminationReason,
}

impl StateMachineRun {
    pub fn is_failure(&self) -> bool {
        self.steps.iter().any(Step::is_failure)
    }

    pub fn operations(&self) -> Vec<&OperationKey> {
        self.steps.iter().map(|s| &s.operation).collect()
    }
}

/// Deterministic subset of `transitions` for one run.
///
/// Keeps `ceil(fraction * n)` transitions (at least one), in their original order.
pub fn swarm_select(transitions: &[OperationKey], fraction: f64, seed: u64) -> Vec<OperationKey> {
    if transitions.is_empty() {
        return Vec::new();
    }
    let fraction = if fraction.is_finite() { fraction.clamp(0.0, 1.0) } else { 1.0 };
    let keep = ((transitions.len() as f64 * fraction).ceil() as usize).clamp(1, transitions.len());

    let mut rng = StdRng::seed_from_u64(seed ^ SWARM_SEED_SALT);
    let mut indices: Vec<usize> = (0..transitions.len()).collect();
    indices.shuffle(&mut rng);
    indices.truncate(keep);
    indices.sort_unstable();
    indices.into_iter().map(|i| transitions[i].clone()).collect()
}

/// Runs state machine sequences against one API.
///
/// Cheap to clone; every clone shares the catalog, registry and capture store.
#[derive(Clone)]
pub struct StateMachine {
    catalog: Arc<Catalog>,
    registry: Arc<LinkRegistry>,
    learner: Arc<LocationLearner>,
    captures: Arc<CaptureStore>,
    transport: Arc<dyn Transport>,
    generator: Arc<dyn ValueGenerator>,
    checks: Arc<Vec<Box<dyn Check>>>,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
    settings: RunSettings,
}

impl StateMachine {
    pub fn new(
        catalog: Arc<Catalog>,
        registry: Arc<LinkRegistry>,
        captures: Arc<CaptureStore>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let learner = Arc::new(LocationLearner::new(catalog.clone(), transport.base_url()));
        Self {
            catalog,
            registry,
            learner,
            captures,
            transport,
            generator: Arc::new(SchemaValueGenerator::default()),
            checks: Arc::new(default_checks()),
            limiter: None,
            settings: RunSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: RunSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_generator(mut self, generator: Arc<dyn ValueGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_checks(mut self, checks: Vec<Box<dyn Check>>) -> Self {
        self.checks = Arc::new(checks);
        self
    }

    /// Share a rate limiter; every request waits for a permit.
    pub fn with_rate_limiter(mut self, limiter: Arc<DefaultDirectRateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn registry(&self) -> &Arc<LinkRegistry> {
        &self.registry
    }

    pub fn captures(&self) -> &Arc<CaptureStore> {
        &self.captures
    }

    /// Execute one run.
    ///
    /// The token is checked before every step; a step interrupted by
    /// cancellation is dropped without being recorded.
    pub async fn run(&self, seed: u64, token: &CancellationToken) -> StateMachineRun {
        let id = uuid::Uuid::new_v4().to_string();
        let mut rng = StdRng::seed_from_u64(seed);
        let transitions: Vec<OperationKey> = self.catalog.keys().cloned().collect();
        let candidates = swarm_select(&transitions, self.settings.swarm_fraction, seed);
        let links = self.registry.snapshot();

        info!(run_id = %id, seed, candidates = candidates.len(), "Run started");

        let mut history: Vec<Exchange> = Vec::new();
        let mut steps: Vec<Step> = Vec::new();

        let termination = loop {
            if token.is_cancelled() {
                break TerminationReason::Cancelled;
            }
            if steps.len() >= self.settings.max_steps {
                break TerminationReason::MaxSteps;
            }

            let Some((operation, resolution)) =
                self.choose(&links, &candidates, &history, steps.is_empty(), &mut rng)
            else {
                break TerminationReason::Exhausted;
            };

            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                result = self.send(&resolution.request) => Some(result),
            };
            let Some(result) = outcome else {
                break TerminationReason::Cancelled;
            };

            let step = self.record(steps.len(), &id, operation, resolution, result, &mut history);
            debug!(
                run_id = %id,
                step = step.index,
                operation = %step.operation,
                status = step.response.as_ref().map(|r| r.status),
                findings = step.findings.len(),
                "Step executed"
            );
            let stop = step.is_unrecoverable() && !self.settings.continue_on_failure;
            steps.push(step);
            if stop {
                break TerminationReason::Failure;
            }
        };

        info!(run_id = %id, steps = steps.len(), reason = %termination, "Run finished");
        StateMachineRun {
            id,
            seed,
            candidates,
            steps,
            termination,
        }
    }

    /// Pick the next transition and resolve its inputs.
    ///
    /// The first step prefers transitions that need no link. Otherwise
    /// candidates are tried in a random order and the first resolvable one
    /// wins, which is a uniform pick among the resolvable ones.
    fn choose<'c>(
        &'c self,
        links: &LinkSet,
        candidates: &[OperationKey],
        history: &[Exchange],
        first: bool,
        rng: &mut StdRng,
    ) -> Option<(&'c Operation, Resolution)> {
        let resolver = InputResolver {
            catalog: &self.catalog,
            links,
            captures: &self.captures,
            generator: self.generator.as_ref(),
            mode: self.settings.mode,
        };
        let mut pool: Vec<&Operation> = candidates
            .iter()
            .filter_map(|key| self.catalog.get(key))
            .collect();

        if first {
            let bootstrap: Vec<&Operation> = pool
                .iter()
                .copied()
                .filter(|op| !resolver.needs_link(op))
                .collect();
            if !bootstrap.is_empty() {
                pool = bootstrap;
            }
        }

        pool.shuffle(rng);
        pool.into_iter().find_map(|operation| {
            match resolver.resolve(operation, history, rng) {
                Ok(resolution) => Some((operation, resolution)),
                Err(reason) => {
                    debug!(%reason, "Transition not enabled");
                    None
                }
            }
        })
    }

    async fn send(&self, request: &Request) -> Result<Response, TransportError> {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
        match tokio::time::timeout(self.settings.request_timeout, self.transport.send(request)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(
                self.settings.request_timeout.as_millis() as u64,
            )),
        }
    }

    fn record(
        &self,
        index: usize,
        run_id: &str,
        operation: &Operation,
        resolution: Resolution,
        result: Result<Response, TransportError>,
        history: &mut Vec<Exchange>,
    ) -> Step {
        let links: Vec<LinkUse> = resolution.links_used().into_iter().cloned().collect();
        let Resolution { request, inputs } = resolution;

        let response = match result {
            Ok(response) => response,
            Err(err) => {
                warn!(run_id, operation = %operation.key, error = %err, "Request failed");
                return Step {
                    index,
                    operation: operation.key.clone(),
                    inputs,
                    request,
                    response: None,
                    transport_error: Some(err.to_string()),
                    findings: Vec::new(),
                    links,
                };
            }
        };

        let findings: Vec<Finding> = self
            .checks
            .iter()
            .flat_map(|check| {
                check.check(&CheckContext {
                    operation,
                    request: &request,
                    response: &response,
                    history: history.as_slice(),
                })
            })
            .collect();

        self.captures
            .record_response(&operation.key, &response, Some(run_id));
        let learned = self.learner.learn(&response, &operation.key);
        if !learned.is_empty() {
            self.registry.learn(learned);
        }

        history.push(Exchange {
            request: request.clone(),
            response: response.clone(),
        });

        Step {
            index,
            operation: operation.key.clone(),
            inputs,
            request,
            response: Some(response),
            transport_error: None,
            findings,
            links,
        }
    }

    /// Seed for run `index` of a session started with `base`.
    pub fn run_seed(base: u64, index: u64) -> u64 {
        base.wrapping_add(index)
    }

    /// A random base seed.
    pub fn random_seed() -> u64 {
        rand::thread_rng().r#gen()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use serde_json::json;

    fn keys(names: &[&str]) -> Vec<OperationKey> {
        names.iter().map(|n| OperationKey::from(*n)).collect()
    }

    #[test]
    fn test_swarm_select_is_deterministic() {
        let transitions = keys(&["a", "b", "c", "d", "e", "f", "g", "h"]);
        let first = swarm_select(&transitions, 0.5, 42);
        assert_eq!(first.len(), 4);
        assert_eq!(first, swarm_select(&transitions, 0.5, 42));
        let differs = (0..20).any(|seed| swarm_select(&transitions, 0.5, seed) != first);
        assert!(differs);
    }

    #[test]
    fn test_swarm_select_bounds() {
        let transitions = keys(&["a", "b", "c"]);
        assert_eq!(swarm_select(&transitions, 1.0, 1), transitions);
        assert_eq!(swarm_select(&transitions, 0.01, 1).len(), 1);
        assert!(swarm_select(&[], 0.5, 1).is_empty());
    }

    fn machine(transport: MockTransport, max_steps: usize) -> StateMachine {
        let catalog = Arc::new(
            Catalog::build(&json!({
                "paths": {
                    "/ping": {"get": {"operationId": "ping", "responses": {"200": {}}}},
                    "/items": {"post": {
                        "operationId": "createItem",
                        "responses": {"200": {"content": {"application/json": {"schema": {
                            "type": "object", "properties": {"id": {"type": "integer"}}
                        }}}}}
                    }},
                    "/items/{itemId}": {"get": {
                        "operationId": "getItem",
                        "parameters": [{"name": "itemId", "in": "path", "required": true, "schema": {"type": "integer"}}],
                        "responses": {"200": {}}
                    }}
                }
            }))
            .unwrap(),
        );
        let registry = Arc::new(LinkRegistry::from_catalog(&catalog).unwrap());
        StateMachine::new(catalog, registry, Arc::new(CaptureStore::default()), Arc::new(transport))
            .with_settings(RunSettings {
                max_steps,
                swarm_fraction: 1.0,
                ..RunSettings::default()
            })
    }

    #[tokio::test]
    async fn test_run_is_bounded_by_max_steps() {
        let machine = machine(MockTransport::with_status(200), 4);
        let run = machine.run(7, &CancellationToken::new()).await;
        assert_eq!(run.steps.len(), 4);
        assert_eq!(run.termination, TerminationReason::MaxSteps);
    }

    #[tokio::test]
    async fn test_server_error_ends_run() {
        let machine = machine(MockTransport::with_status(500), 4);
        let run = machine.run(7, &CancellationToken::new()).await;
        assert_eq!(run.steps.len(), 1);
        assert_eq!(run.termination, TerminationReason::Failure);
        assert!(run.is_failure());
    }

    #[tokio::test]
    async fn test_continue_on_failure() {
        let machine = machine(MockTransport::with_status(500), 3);
        let settings = RunSettings {
            continue_on_failure: true,
            ..machine.settings().clone()
        };
        let run = machine.with_settings(settings).run(7, &CancellationToken::new()).await;
        assert_eq!(run.steps.len(), 3);
        assert_eq!(run.termination, TerminationReason::MaxSteps);
    }

    #[tokio::test]
    async fn test_transport_failure_is_a_step_failure() {
        let machine = machine(MockTransport::failing(), 3);
        let run = machine.run(1, &CancellationToken::new()).await;
        assert_eq!(run.steps.len(), 1);
        assert!(run.steps[0].transport_error.is_some());
        assert_eq!(run.termination, TerminationReason::Failure);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let machine = machine(MockTransport::with_status(200), 3);
        let token = CancellationToken::new();
        token.cancel();
        let run = machine.run(1, &token).await;
        assert!(run.steps.is_empty());
        assert_eq!(run.termination, TerminationReason::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_drops_in_flight_step() {
        let machine = machine(MockTransport::never_completing(), 3);
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });
        let settings = RunSettings {
            request_timeout: Duration::from_secs(3_600 * 24),
            ..machine.settings().clone()
        };
        let run = machine.with_settings(settings).run(1, &token).await;
        assert!(run.steps.is_empty());
        assert_eq!(run.termination, TerminationReason::Cancelled);
    }

    #[tokio::test]
    async fn test_first_step_prefers_unlinked_operations() {
        let machine = machine(MockTransport::with_status(200), 1);
        for seed in 0..10 {
            let run = machine.run(seed, &CancellationToken::new()).await;
            assert_ne!(run.steps[0].operation.as_str(), "getItem");
        }
    }
}
