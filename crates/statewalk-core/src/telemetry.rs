// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tracing subscriber initialization.
//!
//! # Usage
//!
//! ```rust,ignore
//! statewalk_core::telemetry::init_subscriber();
//! // ... build catalog, run scheduler ...
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: filter directives (default: `statewalk_core=info`)

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Default filter when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "statewalk_core=info";

/// Initialize the global tracing subscriber.
///
/// Sets up a fmt layer writing to stderr and an EnvFilter that respects
/// `RUST_LOG`. Returns `false` when a global subscriber was already installed,
/// in which case nothing changes.
pub fn init_subscriber() -> bool {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_FILTER));
    let fmt = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(true);

    tracing_subscriber::Registry::default()
        .with(fmt)
        .with(filter)
        .try_init()
        .is_ok()
}
