//! Application context wiring the monitor, the store and the HTTP layer.

// Copyright (c) 2025 Jak Bracegirdle
//
// This file is part of the speedwatch crate.
//
// Licensed under the Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::StartupError;
use crate::lookup::{HttpIspLookup, SystemInterfaceDetector};
use crate::monitor::Monitor;
use crate::probe::SpeedtestCliProbe;
use crate::runner::{Collaborators, TestRunner};
use crate::sink::{LatestResult, LogListener, ResultSink};
use crate::store::JsonFileStore;

/// Everything the HTTP handlers need, constructed once at startup.
pub struct AppContext {
    pub monitor: Monitor,
    pub store: Arc<JsonFileStore>,
    pub latest: Arc<LatestResult>,
    pub clock: Arc<dyn Clock>,
}

impl AppContext {
    /// Assembles a context from parts, e.g. with fake collaborators in tests.
    pub fn new(
        collaborators: Collaborators,
        store: Arc<JsonFileStore>,
        clock: Arc<dyn Clock>,
        config: &Config,
    ) -> Self {
        let latest = Arc::new(LatestResult::new());
        let sink = ResultSink::new()
            .with_store(store.clone())
            .with_listener(latest.clone())
            .with_listener(Arc::new(LogListener));
        let runner = Arc::new(TestRunner::new(collaborators, sink, clock.clone()));
        let monitor = Monitor::with_cron_timezone(runner, clock.clone(), config.cron_timezone);

        Self {
            monitor,
            store,
            latest,
            clock,
        }
    }

    /// Builds the production context from `config`.
    pub async fn from_config(config: &Config) -> Result<Self, StartupError> {
        let store = Arc::new(JsonFileStore::open(&config.data_dir).await?);

        if let Some(days) = config.retention_days {
            store.prune_older_than(days, Utc::now()).await?;
        }

        let collaborators = Collaborators {
            probe: Arc::new(SpeedtestCliProbe::new(
                config.speedtest_command.clone(),
                config.speedtest_timeout,
            )),
            interface: Arc::new(SystemInterfaceDetector),
            isp: Arc::new(HttpIspLookup::new()?),
        };

        Ok(Self::new(collaborators, store, Arc::new(SystemClock), config))
    }

    /// Starts the monitor with the configured schedule, if any.
    ///
    /// This is how the schedule survives a restart: it is re-derived from the
    /// configuration, not from any in-memory state.
    pub fn resume(&self, config: &Config) {
        let Some(descriptor) = &config.schedule else {
            info!("no schedule configured, monitor idle");
            return;
        };
        if let Err(e) = self.monitor.start(descriptor) {
            warn!(error = %e, "failed to start monitor from configuration");
        }
    }

    /// Stops the monitor if it is running.
    pub fn shutdown(&self) {
        if self.monitor.stop().is_ok() {
            info!("monitor stopped for shutdown");
        }
    }
}
