// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Statewalk Core - Dependency Inference & Stateful Execution Engine
//!
//! Builds a model of which API operations produce data that other operations
//! consume, then drives multi-step request sequences that reuse real data
//! from earlier responses.
//!
//! # Architecture
//!
//! ```text
//!   resolved schema
//!         │
//!         ▼
//! ┌───────────────────┐   declared + static   ┌───────────────────┐
//! │ Operation Catalog │──────────────────────►│   Link Registry   │◄──┐
//! └───────────────────┘                       └─────────┬─────────┘   │
//!                                                       │ snapshot    │ Location
//!                                                       ▼             │ learning
//! ┌───────────────────┐   sample / augment    ┌───────────────────┐   │
//! │   Capture Store   │──────────────────────►│   State Machine   │───┘
//! └───────────────────┘                       └─────────┬─────────┘
//!           ▲                                           │ requests
//!           │ record responses                          ▼
//!           └───────────────────────────────────── Transport
//! ```
//!
//! # Data Flow
//!
//! 1. [`catalog::Catalog::build`] normalizes every operation of the schema
//! 2. [`links::LinkRegistry::from_catalog`] seeds declared and inferred links
//! 3. [`scheduler::Scheduler`] starts a fixed pool of workers, each executing
//!    one [`state_machine::StateMachine`] run at a time
//! 4. Every response feeds the [`capture::CaptureStore`] and the
//!    [`links::LocationLearner`]; later runs see what earlier runs found
//!
//! # Link Precedence
//!
//! | Origin | Rank |
//! |--------|------|
//! | Declared (`links`, `x-links`) | always wins |
//! | Learned from `Location` | newer beats older |
//! | Static inference | used last |
//!
//! # Configuration
//!
//! See [`config::EngineConfig::from_env`] for the `STATEWALK_*` variables.
//!
//! # Modules
//!
//! - [`catalog`]: Operation Catalog
//! - [`links`]: Link Registry, static inference and `Location` learning
//! - [`evaluator`]: runtime expression evaluation
//! - [`capture`]: Resource Capture Store
//! - [`resolver`]: input resolution for one transition
//! - [`generation`]: generation primitive seam
//! - [`checks`]: response checks
//! - [`transport`]: request execution seam
//! - [`state_machine`]: swarm selection and run execution
//! - [`scheduler`]: worker pool, session limits and reporting
//! - [`statistic`]: link usage statistics

/// Operation Catalog built from a resolved schema.
pub mod catalog;

/// Configuration loaded from environment variables.
pub mod config;

/// Error types for every engine layer.
pub mod error;

/// Runtime expression evaluation.
pub mod evaluator;

/// Resource Capture Store shared by all workers.
pub mod capture;

/// Declared, inferred and learned links.
pub mod links;

/// Input resolution for a single transition.
pub mod resolver;

/// Schema-shaped value generation.
pub mod generation;

/// Response checks.
pub mod checks;

/// Request execution.
pub mod transport;

/// State machine runs.
pub mod state_machine;

/// Worker pool and session report.
pub mod scheduler;

/// Link usage statistics.
pub mod statistic;

/// Tracing subscriber setup.
pub mod telemetry;

pub use capture::CaptureStore;
pub use catalog::Catalog;
pub use config::EngineConfig;
pub use error::{EngineError, EvaluationError, Result, SchemaError, TransportError};
pub use evaluator::{EvaluationContext, evaluate};
pub use links::{LinkRegistry, LinkSet, LocationLearner, declared_links, infer_static};
pub use scheduler::{Scheduler, SessionReport};
pub use state_machine::{StateMachine, StateMachineRun, TerminationReason, swarm_select};
