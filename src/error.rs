//! Error types shared across the monitor, the collaborators and the HTTP layer.

// Copyright (c) 2025 Jak Bracegirdle
//
// This file is part of the speedwatch crate.
//
// Licensed under the Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::time::Duration;

use thiserror::Error;

/// A schedule descriptor that cannot be accepted by [`crate::Monitor::start`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("cron expression is empty")]
    EmptyCron,

    #[error("cron expression must have exactly 5 fields, found {found}")]
    CronFieldCount { found: usize },

    #[error("invalid cron {field} field `{value}`: {reason}")]
    CronField {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("interval must be between {min} and {max} minutes, got {minutes}")]
    IntervalOutOfRange { minutes: u32, min: u32, max: u32 },
}

/// State machine violations reported by the monitor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MonitorError {
    #[error("speed monitor is already running")]
    AlreadyRunning,

    #[error("speed monitor is not running")]
    NotRunning,

    #[error("invalid schedule: {0}")]
    Invalid(#[from] ValidationError),
}

/// Failure of the throughput probe. Always recovered into an error result.
#[derive(Debug, Error)]
pub enum MeasurementError {
    #[error("speedtest timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("failed to parse speedtest output: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("speedtest reported an invalid download value: {0}")]
    InvalidValue(f64),
}

/// Failure of one of the auxiliary lookups. Degrades a field, never a test.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("command failed: {0}")]
    Command(#[from] std::io::Error),

    #[error("lookup returned no data")]
    Empty,
}

/// Failure to persist or load results.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("storage timed out after {0:?}")]
    Timeout(Duration),
}

/// Invalid configuration read from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} has invalid value `{value}`")]
    InvalidValue { key: &'static str, value: String },

    #[error("{key} is required when {reason}")]
    Missing {
        key: &'static str,
        reason: &'static str,
    },

    #[error("configured schedule is invalid: {0}")]
    Schedule(#[from] ValidationError),
}

/// Failure to build the application context.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Lookup(#[from] LookupError),
}
