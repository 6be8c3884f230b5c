// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Session-level behavior: limits, cancellation and rate limiting.

mod common;

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::*;
use statewalk_core::config::{RateLimit, RatePeriod};
use statewalk_core::transport::MockTransport;
use statewalk_core::{EngineConfig, Scheduler};

fn config() -> EngineConfig {
    EngineConfig {
        max_steps: 4,
        swarm_fraction: 1.0,
        max_runs: 40,
        workers: 4,
        seed: Some(11),
        ..EngineConfig::default()
    }
}

#[tokio::test]
async fn test_session_runs_every_run_within_bounds() {
    let api = OrdersApi::new();
    let scheduler =
        Scheduler::from_config(orders_catalog(), Arc::new(api.transport()), &config()).unwrap();

    let report = scheduler.run().await;

    assert_eq!(report.seed, 11);
    assert_eq!(report.runs.len(), 40);
    assert!(report.runs.iter().all(|run| run.operations.len() <= 4));
    assert_eq!(report.steps, report.runs.iter().map(|r| r.operations.len()).sum::<usize>());
    assert!(report.is_success(), "unexpected failures: {:?}", report.failures);
    assert!(!report.cancelled);
    assert!(report.captured_values > 0);
    assert!(!report.link_statistics.is_empty());
}

#[tokio::test]
async fn test_same_seed_same_operations_with_one_worker() {
    let settings = EngineConfig {
        workers: 1,
        max_runs: 10,
        ..config()
    };
    let first = Scheduler::from_config(orders_catalog(), Arc::new(OrdersApi::new().transport()), &settings)
        .unwrap()
        .run()
        .await;
    let second = Scheduler::from_config(orders_catalog(), Arc::new(OrdersApi::new().transport()), &settings)
        .unwrap()
        .run()
        .await;

    let operations = |report: &statewalk_core::SessionReport| {
        report.runs.iter().map(|r| r.operations.clone()).collect::<Vec<_>>()
    };
    assert_eq!(operations(&first), operations(&second));
}

#[tokio::test]
async fn test_exit_first_stops_session() {
    let api = OrdersApi::forgetful();
    let settings = EngineConfig {
        max_runs: 1_000,
        exit_first: true,
        ..config()
    };
    let scheduler = Scheduler::from_config(orders_catalog(), Arc::new(api.transport()), &settings).unwrap();

    let report = scheduler.run().await;

    assert!(report.cancelled);
    assert!(report.runs.len() < 1_000);
    assert!(report.failures.iter().any(|f| f.check == "use_after_free"));
}

#[tokio::test]
async fn test_max_failures_stops_session() {
    let settings = EngineConfig {
        max_runs: 1_000,
        max_failures: Some(1),
        ..config()
    };
    let scheduler =
        Scheduler::from_config(orders_catalog(), Arc::new(MockTransport::with_status(500)), &settings).unwrap();

    let report = scheduler.run().await;

    assert!(report.cancelled);
    assert!(report.runs.len() < 1_000);
    assert_eq!(report.failures[0].check, "not_a_server_error");
    assert!(report.failures[0].occurrences >= 1);
}

#[tokio::test]
async fn test_cancelled_session_runs_nothing() {
    let scheduler =
        Scheduler::from_config(orders_catalog(), Arc::new(OrdersApi::new().transport()), &config()).unwrap();
    scheduler.cancellation_token().cancel();

    let report = scheduler.run().await;

    assert!(report.cancelled);
    assert!(report.runs.is_empty());
    assert_eq!(report.steps, 0);
}

#[tokio::test]
async fn test_cancellation_mid_session() {
    let transport = OrdersApi::new().transport().with_latency(Duration::from_millis(20));
    let settings = EngineConfig {
        max_runs: 10_000,
        ..config()
    };
    let scheduler = Scheduler::from_config(orders_catalog(), Arc::new(transport), &settings).unwrap();
    let token = scheduler.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        token.cancel();
    });

    let report = tokio::time::timeout(Duration::from_secs(10), scheduler.run())
        .await
        .expect("session stops after cancellation");

    assert!(report.cancelled);
    assert!(report.runs.len() < 10_000);
}

#[tokio::test]
async fn test_rate_limit_is_shared_by_workers() {
    let settings = EngineConfig {
        max_steps: 1,
        max_runs: 12,
        rate_limit: Some(RateLimit {
            limit: NonZeroU32::new(5).unwrap(),
            period: RatePeriod::Second,
        }),
        ..config()
    };
    let scheduler =
        Scheduler::from_config(orders_catalog(), Arc::new(OrdersApi::new().transport()), &settings).unwrap();

    let start = Instant::now();
    let report = scheduler.run().await;

    assert_eq!(report.steps, 12);
    // A burst of 5, then one request every 200ms
    assert!(start.elapsed() >= Duration::from_millis(1_200));
}
