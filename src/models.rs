//! # speedwatch
//!
//! Data types exchanged between the monitor, its collaborators and the HTTP layer.

// Copyright (c) 2025 Jak Bracegirdle
//
// This file is part of the speedwatch crate.
//
// Licensed under the Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::schedule::ScheduleDescriptor;

/// Server name recorded on results produced from a failed measurement.
pub const ERROR_SERVER: &str = "Error";

/// Value used when a lookup could not determine a field.
pub const UNKNOWN: &str = "Unknown";

/// Subset of the `speedtest-cli --json` output that the probe reads.
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct SpeedTestResponse {
    pub download: f64, // bits per second
    #[serde(default)]
    pub ping: f64,
    #[serde(default)]
    pub server: ServerInfo,
    #[serde(default)]
    pub timestamp: String,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone)]
pub struct ServerInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub sponsor: String,
}

/// Kind of network link the default route goes through.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterfaceType {
    WiFi,
    Ethernet,
    #[default]
    Unknown,
}

impl fmt::Display for InterfaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterfaceType::WiFi => write!(f, "WiFi"),
            InterfaceType::Ethernet => write!(f, "Ethernet"),
            InterfaceType::Unknown => write!(f, "{UNKNOWN}"),
        }
    }
}

/// The outcome of one speed test.
///
/// Failed measurements still produce a value: all numeric fields are zero and
/// `error` holds the reason.
///
/// `upload` is an estimate derived from `download`, and `ping` is a
/// placeholder; neither is measured.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SpeedTestResult {
    pub timestamp: String,
    pub download: f64,
    pub upload: f64,
    pub ping: f64,
    pub server: String,
    pub network_interface: Option<String>,
    pub isp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SpeedTestResult {
    /// Builds the zero-valued result reported for a failed measurement.
    pub fn failed(at: DateTime<Utc>, error: impl Into<String>) -> Self {
        Self {
            timestamp: format_timestamp(at),
            server: ERROR_SERVER.to_string(),
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Parses the RFC 3339 `timestamp` field.
    pub fn measured_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

/// Formats a timestamp the way results carry it (`2025-08-07T12:34:56.000Z`).
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// A persisted result.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoredSpeedTest {
    pub id: i64,
    #[serde(flatten)]
    pub result: SpeedTestResult,
    pub created_at: DateTime<Utc>,
}

impl StoredSpeedTest {
    /// When the measurement happened, falling back to when it was stored.
    pub fn measured_at(&self) -> DateTime<Utc> {
        self.result.measured_at().unwrap_or(self.created_at)
    }
}

/// Aggregates over all stored successful results.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Statistics {
    pub total_tests: usize,
    pub failed_tests: usize,
    pub avg_download: f64,
    pub max_download: f64,
    pub min_download: f64,
    pub avg_upload: f64,
    pub max_upload: f64,
    pub min_upload: f64,
    pub avg_ping: f64,
    pub max_ping: f64,
    pub min_ping: f64,
}

/// Per-day averages, newest day first.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DailyAverage {
    pub date: String,
    pub avg_download: f64,
    pub avg_upload: f64,
    pub avg_ping: f64,
    pub test_count: usize,
}

/// Result of a bulk delete.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearOutcome {
    pub removed: usize,
    pub remaining: usize,
}

/// Read-only projection of the monitor state for polling clients.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStatus {
    pub is_running: bool,
    pub schedule: Option<ScheduleDescriptor>,
    pub has_current_test: bool,
    pub last_test_time: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
}
