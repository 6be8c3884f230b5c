// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::num::NonZeroU32;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use governor::Quota;

/// Engine configuration
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Base URL requests are sent to; also used to normalize `Location` headers
    pub base_url: Option<String>,
    /// Path of a resolved schema document (used by the `statewalk` binary)
    pub schema_path: Option<PathBuf>,
    /// Maximum number of steps in one state machine run
    pub max_steps: usize,
    /// Fraction of transitions kept as candidates for each run
    pub swarm_fraction: f64,
    /// Number of state machine runs in a session
    pub max_runs: u64,
    /// Number of concurrent workers
    pub workers: usize,
    /// Keep running a sequence after an unrecoverable failure
    pub continue_on_failure: bool,
    /// Stop the session after the first failing run
    pub exit_first: bool,
    /// Stop the session after this many distinct failures
    pub max_failures: Option<usize>,
    /// Aggregate request rate across all workers
    pub rate_limit: Option<RateLimit>,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Base seed; run `i` uses `seed + i`
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            schema_path: None,
            max_steps: 6,
            swarm_fraction: 0.5,
            max_runs: 100,
            workers: 1,
            continue_on_failure: false,
            exit_first: false,
            max_failures: None,
            rate_limit: None,
            request_timeout: Duration::from_millis(10_000),
            seed: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional (with defaults):
    /// - `STATEWALK_BASE_URL`: base URL of the API under test
    /// - `STATEWALK_SCHEMA`: path of the resolved schema document
    /// - `STATEWALK_MAX_STEPS`: steps per run (default: 6)
    /// - `STATEWALK_SWARM_FRACTION`: candidate fraction in (0, 1] (default: 0.5)
    /// - `STATEWALK_MAX_RUNS`: runs per session (default: 100)
    /// - `STATEWALK_WORKERS`: concurrent workers (default: 1)
    /// - `STATEWALK_CONTINUE_ON_FAILURE`: keep going after failures (default: false)
    /// - `STATEWALK_EXIT_FIRST`: stop after the first failure (default: false)
    /// - `STATEWALK_MAX_FAILURES`: stop after N failures (default: unlimited)
    /// - `STATEWALK_RATE_LIMIT`: e.g. `100/s`, `500/m` (default: unlimited)
    /// - `STATEWALK_REQUEST_TIMEOUT_MS`: per-request timeout (default: 10000)
    /// - `STATEWALK_SEED`: base seed (default: random)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let max_steps: usize = parse_var(
            "STATEWALK_MAX_STEPS",
            defaults.max_steps,
            "must be a positive integer",
        )?;
        if max_steps == 0 {
            return Err(ConfigError::Invalid(
                "STATEWALK_MAX_STEPS",
                "must be a positive integer",
            ));
        }

        let swarm_fraction: f64 = parse_var(
            "STATEWALK_SWARM_FRACTION",
            defaults.swarm_fraction,
            "must be a number in (0, 1]",
        )?;
        if !(swarm_fraction > 0.0 && swarm_fraction <= 1.0) {
            return Err(ConfigError::Invalid(
                "STATEWALK_SWARM_FRACTION",
                "must be a number in (0, 1]",
            ));
        }

        let workers: usize = parse_var(
            "STATEWALK_WORKERS",
            defaults.workers,
            "must be a positive integer",
        )?;
        if workers == 0 {
            return Err(ConfigError::Invalid(
                "STATEWALK_WORKERS",
                "must be a positive integer",
            ));
        }

        let rate_limit = match std::env::var("STATEWALK_RATE_LIMIT") {
            Ok(value) => Some(RateLimit::parse(&value).map_err(|_| {
                ConfigError::Invalid(
                    "STATEWALK_RATE_LIMIT",
                    "must look like `<n>/<s|m|h|d>`",
                )
            })?),
            Err(_) => None,
        };

        let timeout_ms: u64 = parse_var(
            "STATEWALK_REQUEST_TIMEOUT_MS",
            defaults.request_timeout.as_millis() as u64,
            "must be a positive integer",
        )?;

        Ok(Self {
            base_url: std::env::var("STATEWALK_BASE_URL").ok(),
            schema_path: std::env::var("STATEWALK_SCHEMA").ok().map(PathBuf::from),
            max_steps,
            swarm_fraction,
            max_runs: parse_var(
                "STATEWALK_MAX_RUNS",
                defaults.max_runs,
                "must be a positive integer",
            )?,
            workers,
            continue_on_failure: parse_flag(
                "STATEWALK_CONTINUE_ON_FAILURE",
                defaults.continue_on_failure,
            )?,
            exit_first: parse_flag("STATEWALK_EXIT_FIRST", defaults.exit_first)?,
            max_failures: parse_optional("STATEWALK_MAX_FAILURES", "must be a positive integer")?,
            rate_limit,
            request_timeout: Duration::from_millis(timeout_ms),
            seed: parse_optional("STATEWALK_SEED", "must be an unsigned integer")?,
        })
    }
}

fn parse_var<T: FromStr>(
    name: &'static str,
    default: T,
    message: &'static str,
) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, message)),
        Err(_) => Ok(default),
    }
}

fn parse_optional<T: FromStr>(
    name: &'static str,
    message: &'static str,
) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(name, message)),
        Err(_) => Ok(None),
    }
}

fn parse_flag(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            _ => Err(ConfigError::Invalid(name, "must be true or false")),
        },
        Err(_) => Ok(default),
    }
}

/// Time window of a rate limit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatePeriod {
    Second,
    Minute,
    Hour,
    Day,
}

impl RatePeriod {
    pub fn duration(self) -> Duration {
        match self {
            RatePeriod::Second => Duration::from_secs(1),
            RatePeriod::Minute => Duration::from_secs(60),
            RatePeriod::Hour => Duration::from_secs(3_600),
            RatePeriod::Day => Duration::from_secs(86_400),
        }
    }
}

/// Aggregate request budget: `limit` requests per `period`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub limit: NonZeroU32,
    pub period: RatePeriod,
}

impl RateLimit {
    /// Parse `"<n>/<s|m|h|d>"`, e.g. `"100/s"`.
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        const MESSAGE: &str = "must look like `<n>/<s|m|h|d>`";
        let (limit, period) = value
            .trim()
            .split_once('/')
            .ok_or(ConfigError::Invalid("rate limit", MESSAGE))?;
        let limit = limit
            .trim()
            .parse::<NonZeroU32>()
            .map_err(|_| ConfigError::Invalid("rate limit", MESSAGE))?;
        let period = match period.trim() {
            "s" => RatePeriod::Second,
            "m" => RatePeriod::Minute,
            "h" => RatePeriod::Hour,
            "d" => RatePeriod::Day,
            _ => return Err(ConfigError::Invalid("rate limit", MESSAGE)),
        };
        Ok(Self { limit, period })
    }

    /// Governor quota; bursts of up to `limit` requests are allowed.
    pub fn quota(&self) -> Quota {
        match self.period {
            RatePeriod::Second => Quota::per_second(self.limit),
            RatePeriod::Minute => Quota::per_minute(self.limit),
            RatePeriod::Hour => Quota::per_hour(self.limit),
            RatePeriod::Day => Quota::with_period(self.period.duration() / self.limit.get())
                .map(|quota| quota.allow_burst(self.limit))
                .unwrap_or_else(|| Quota::per_hour(self.limit)),
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
