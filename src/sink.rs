//! Delivery of finished results to storage and to listeners.

// Copyright (c) 2025 Jak Bracegirdle
//
// This file is part of the speedwatch crate.
//
// Licensed under the Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time;
use tracing::{error, info, warn};

use crate::error::StorageError;
use crate::models::SpeedTestResult;
use crate::store::ResultStore;

/// Bound on how long a single save may hold up delivery.
pub const SAVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Observer notified about test progress.
///
/// Delivery is best effort: listeners must not block, and nothing is retried.
pub trait TestListener: Send + Sync {
    fn on_test_started(&self) {}

    fn on_test_result(&self, result: &SpeedTestResult);
}

/// Forwards each result to the store and to every listener.
///
/// Persistence and notification are independent: a failed save is logged and
/// listeners are still notified.
#[derive(Clone, Default)]
pub struct ResultSink {
    store: Option<Arc<dyn ResultStore>>,
    listeners: Vec<Arc<dyn TestListener>>,
}

impl ResultSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(mut self, store: Arc<dyn ResultStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn TestListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn test_started(&self) {
        for listener in &self.listeners {
            listener.on_test_started();
        }
    }

    pub async fn deliver(&self, result: &SpeedTestResult) {
        if let Some(store) = &self.store {
            let saved = time::timeout(SAVE_TIMEOUT, store.save_result(result))
                .await
                .unwrap_or(Err(StorageError::Timeout(SAVE_TIMEOUT)));
            if let Err(e) = saved {
                error!(
                    error = %e,
                    timestamp = %result.timestamp,
                    "failed to store speed test result"
                );
            }
        }

        for listener in &self.listeners {
            listener.on_test_result(result);
        }
    }
}

/// Keeps the most recent result for the `/speed` endpoint.
#[derive(Debug, Default)]
pub struct LatestResult {
    result: Mutex<Option<SpeedTestResult>>,
    in_progress: AtomicBool,
}

impl LatestResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retrieves the last result, if any test finished yet.
    pub fn get(&self) -> Option<SpeedTestResult> {
        self.result
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn set(&self, result: SpeedTestResult) {
        *self
            .result
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(result);
    }

    pub fn clear(&self) {
        *self
            .result
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }

    /// Whether a test started and has not reported yet.
    pub fn in_progress(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }
}

impl TestListener for LatestResult {
    fn on_test_started(&self) {
        self.in_progress.store(true, Ordering::SeqCst);
    }

    fn on_test_result(&self, result: &SpeedTestResult) {
        self.set(result.clone());
        self.in_progress.store(false, Ordering::SeqCst);
    }
}

/// Logs every result.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogListener;

impl TestListener for LogListener {
    fn on_test_started(&self) {
        info!("speed test started");
    }

    fn on_test_result(&self, result: &SpeedTestResult) {
        match &result.error {
            Some(e) => warn!(error = %e, timestamp = %result.timestamp, "speed test failed"),
            None => info!(
                download_mbps = result.download,
                upload_mbps = result.upload,
                ping_ms = result.ping,
                timestamp = %result.timestamp,
                "speed test completed"
            ),
        }
    }
}
