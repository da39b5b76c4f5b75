//! Runtime configuration read from the environment (and `.env`).

// Copyright (c) 2025 Jak Bracegirdle
//
// This file is part of the speedwatch crate.
//
// Licensed under the Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::schedule::{CronTimezone, Schedule, ScheduleDescriptor};

/// Application settings.
///
/// | Variable                 | Default          |
/// |--------------------------|------------------|
/// | `BIND_ADDRESS`           | `127.0.0.1`      |
/// | `BIND_PORT`              | `8080`           |
/// | `SCHEDULE_TYPE`          | `interval`       |
/// | `INTERVAL_MINUTES`       | `10`             |
/// | `CRON_EXPRESSION`        | required for cron|
/// | `CRON_TIMEZONE`          | `local`          |
/// | `DATA_DIR`               | `./data`         |
/// | `SPEEDTEST_COMMAND`      | `speedtest-cli`  |
/// | `SPEEDTEST_TIMEOUT_SECS` | `120`            |
/// | `RETENTION_DAYS`         | unset (keep all) |
///
/// `SCHEDULE_TYPE=none` leaves the monitor idle until started over HTTP.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub bind_address: String,
    pub bind_port: u16,
    pub schedule: Option<ScheduleDescriptor>,
    pub cron_timezone: CronTimezone,
    pub data_dir: PathBuf,
    pub speedtest_command: String,
    pub speedtest_timeout: Duration,
    pub retention_days: Option<u32>,
}

impl Config {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name
    /// to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let schedule = match get("SCHEDULE_TYPE").as_deref().map(str::trim) {
            None | Some("interval") => Some(ScheduleDescriptor::Interval {
                minutes: parse_or(&get, "INTERVAL_MINUTES", 10)?,
            }),
            Some("cron") => Some(ScheduleDescriptor::Cron {
                expression: get("CRON_EXPRESSION").ok_or(ConfigError::Missing {
                    key: "CRON_EXPRESSION",
                    reason: "SCHEDULE_TYPE is cron",
                })?,
            }),
            Some("none") => None,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "SCHEDULE_TYPE",
                    value: other.to_string(),
                });
            }
        };
        if let Some(descriptor) = &schedule {
            Schedule::validate(descriptor)?;
        }

        let cron_timezone = match get("CRON_TIMEZONE").as_deref().map(str::trim) {
            None | Some("local") => CronTimezone::Local,
            Some("utc") | Some("UTC") => CronTimezone::Utc,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "CRON_TIMEZONE",
                    value: other.to_string(),
                });
            }
        };

        Ok(Self {
            bind_address: get("BIND_ADDRESS").unwrap_or_else(|| "127.0.0.1".to_string()),
            bind_port: parse_or(&get, "BIND_PORT", 8080)?,
            schedule,
            cron_timezone,
            data_dir: get("DATA_DIR").map(PathBuf::from).unwrap_or_else(|| "./data".into()),
            speedtest_command: get("SPEEDTEST_COMMAND")
                .unwrap_or_else(|| "speedtest-cli".to_string()),
            speedtest_timeout: Duration::from_secs(parse_or(&get, "SPEEDTEST_TIMEOUT_SECS", 120)?),
            retention_days: get("RETENTION_DAYS")
                .map(|v| parse_value("RETENTION_DAYS", &v))
                .transpose()?,
        })
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(value) => parse_value(key, &value),
        None => Ok(default),
    }
}

fn parse_value<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}
