// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Statewalk command line runner.
//!
//! Loads a resolved schema, runs a stateful session against `STATEWALK_BASE_URL`
//! and prints the session report as JSON on stdout.
//!
//! `statewalk link-schema` prints the JSON Schema of exported links instead.

use std::sync::Arc;

use anyhow::Context;
use statewalk_core::config::ConfigError;
use statewalk_core::transport::HttpTransport;
use statewalk_core::{Catalog, EngineConfig, Scheduler, telemetry};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_subscriber();

    if std::env::args().nth(1).as_deref() == Some("link-schema") {
        println!("{}", serde_json::to_string_pretty(&statewalk_dsl::spec::generate_link_schema())?);
        return Ok(());
    }

    info!("Starting statewalk");

    let config = EngineConfig::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;
    let schema_path = config
        .schema_path
        .clone()
        .ok_or(ConfigError::Missing("STATEWALK_SCHEMA"))?;
    let base_url = config
        .base_url
        .clone()
        .ok_or(ConfigError::Missing("STATEWALK_BASE_URL"))?;

    info!(
        schema = %schema_path.display(),
        base_url = %base_url,
        max_runs = config.max_runs,
        max_steps = config.max_steps,
        workers = config.workers,
        "Configuration loaded"
    );

    let raw = std::fs::read_to_string(&schema_path)
        .with_context(|| format!("reading {}", schema_path.display()))?;
    let schema: serde_json::Value =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", schema_path.display()))?;
    let catalog = Catalog::build(&schema)?;

    let transport = Arc::new(HttpTransport::new(base_url, config.request_timeout)?);
    let scheduler = Scheduler::from_config(catalog, transport, &config)?;

    let token = scheduler.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing in-flight runs");
            token.cancel();
        }
    });

    let report = scheduler.run().await;

    if !report.link_statistics.is_empty() {
        eprintln!("{}", report.link_statistics.render());
    }
    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.is_success() {
        error!(failures = report.failures.len(), "Session found failures");
        std::process::exit(1);
    }
    Ok(())
}
