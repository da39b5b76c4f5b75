//! Execution of a single speed test behind a single-flight guard.

// Copyright (c) 2025 Jak Bracegirdle
//
// This file is part of the speedwatch crate.
//
// Licensed under the Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rand::Rng;
use tokio::time;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::lookup::{InterfaceDetector, IspLookup};
use crate::models::{InterfaceType, SpeedTestResult, UNKNOWN, format_timestamp};
use crate::probe::ThroughputProbe;
use crate::sink::ResultSink;

/// Upload is estimated as this fraction of the measured download.
pub const UPLOAD_ESTIMATE_RATIO: f64 = 0.1;

/// Bounds of the placeholder ping value, in milliseconds.
pub const PLACEHOLDER_PING_MS: std::ops::Range<f64> = 10.0..60.0;

/// Upper bound on each interface and ISP lookup, so a hung collaborator
/// cannot hold the single-flight guard.
pub const LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// What a call to [`TestRunner::run`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// A test ran and its result (possibly an error result) was delivered.
    Completed(SpeedTestResult),
    /// Another test was in flight; nothing happened.
    Skipped,
}

impl RunOutcome {
    pub fn into_result(self) -> Option<SpeedTestResult> {
        match self {
            RunOutcome::Completed(result) => Some(result),
            RunOutcome::Skipped => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, RunOutcome::Skipped)
    }
}

/// Collaborators a [`TestRunner`] measures through.
#[derive(Clone)]
pub struct Collaborators {
    pub probe: Arc<dyn ThroughputProbe>,
    pub interface: Arc<dyn InterfaceDetector>,
    pub isp: Arc<dyn IspLookup>,
}

/// Runs speed tests, at most one at a time.
///
/// Calls made while a test is in flight return [`RunOutcome::Skipped`]
/// immediately; they are not queued.
pub struct TestRunner {
    collaborators: Collaborators,
    sink: ResultSink,
    clock: Arc<dyn Clock>,
    in_flight: AtomicBool,
}

/// Releases the single-flight flag when dropped, including on panic or
/// cancellation of the owning future.
struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl TestRunner {
    pub fn new(collaborators: Collaborators, sink: ResultSink, clock: Arc<dyn Clock>) -> Self {
        Self {
            collaborators,
            sink,
            clock,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Whether a test is currently running.
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    fn try_acquire(&self) -> Option<FlightGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard(&self.in_flight))
    }

    /// Runs one test and delivers the result to the sink.
    ///
    /// Never fails: a measurement error becomes a zero-valued result with
    /// `error` set.
    pub async fn run(&self) -> RunOutcome {
        let Some(_guard) = self.try_acquire() else {
            info!("speed test already in progress, skipping");
            return RunOutcome::Skipped;
        };

        info!("starting speed test");
        self.sink.test_started();

        let result = self.measure().await;
        self.sink.deliver(&result).await;

        RunOutcome::Completed(result)
    }

    async fn measure(&self) -> SpeedTestResult {
        let Collaborators {
            probe,
            interface,
            isp,
        } = &self.collaborators;

        let download = match probe.measure_download_mbps().await {
            Ok(download) => download,
            Err(e) => {
                warn!(error = %e, "speed test measurement failed");
                return SpeedTestResult::failed(self.clock.now(), e.to_string());
            }
        };

        let (interface, isp) = futures::join!(
            async {
                time::timeout(LOOKUP_TIMEOUT, interface.detect_interface_type())
                    .await
                    .unwrap_or_else(|_| {
                        warn!("interface detection timed out");
                        InterfaceType::Unknown
                    })
            },
            async {
                time::timeout(LOOKUP_TIMEOUT, isp.lookup_isp())
                    .await
                    .unwrap_or_else(|_| {
                        warn!("ISP lookup timed out");
                        UNKNOWN.to_string()
                    })
            },
        );
        debug!(%interface, isp = %isp, "lookups finished");

        SpeedTestResult {
            timestamp: format_timestamp(self.clock.now()),
            download,
            upload: download * UPLOAD_ESTIMATE_RATIO,
            ping: placeholder_ping_ms(),
            server: probe.server_name(),
            network_interface: Some(interface.to_string()),
            isp: Some(isp),
            error: None,
        }
    }
}

/// Pseudo-random latency standing in for a real probe.
fn placeholder_ping_ms() -> f64 {
    rand::thread_rng().gen_range(PLACEHOLDER_PING_MS)
}
