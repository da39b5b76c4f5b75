//! # speedwatch
//!
//! A utility application to run scheduled speedtests, persist the results and
//! serve them over HTTP.
//!
//! The core is the [`Monitor`]: it runs at most one test at a time, on either a
//! fixed interval or a cron expression, and re-derives its next run from the
//! configured schedule after a restart.
//!
//! ## Disclaimer
//! This project is not affiliated with, endorsed by, or sponsored by Ookla. (Ookla®).
//! All trademarks and copyrights belong to their respective owners.

// Copyright (c) 2025 Jak Bracegirdle
//
// This file is part of the speedwatch crate.
//
// Licensed under the Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

pub mod api;
pub mod clock;
pub mod config;
pub mod context;
pub mod cron;
pub mod error;
pub mod lookup;
pub mod models;
pub mod monitor;
pub mod probe;
pub mod runner;
pub mod schedule;
pub mod sink;
pub mod store;

pub use clock::{Clock, MonotonicClock, SystemClock};
pub use config::Config;
pub use context::AppContext;
pub use cron::CronExpression;
pub use error::{
    ConfigError, LookupError, MeasurementError, MonitorError, StartupError, StorageError,
    ValidationError,
};
pub use lookup::{HttpIspLookup, InterfaceDetector, IspLookup, SystemInterfaceDetector};
pub use models::*;
pub use monitor::Monitor;
pub use probe::{SpeedtestCliProbe, ThroughputProbe};
pub use runner::{Collaborators, RunOutcome, TestRunner};
pub use schedule::{CronTimezone, Schedule, ScheduleDescriptor, is_due, next_run_at};
pub use sink::{LatestResult, LogListener, ResultSink, TestListener};
pub use store::{JsonFileStore, ResultStore};

/// Installs the global `tracing` subscriber.
///
/// The filter is read from `RUST_LOG` and defaults to `info`.
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt().with_env_filter(filter).with_target(true).init();
}
