// Copyright (c) 2025 Jak Bracegirdle
//
// This file is part of the speedwatch crate.
//
// Licensed under the Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Fake collaborators shared by the integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use speedwatch::*;
use tokio::sync::Notify;

/// Fixed start of the fake clock: 2025-08-07 11:58:30 UTC.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 8, 7, 11, 58, 30).unwrap()
}

/// Probe returning a fixed download figure, optionally failing or blocking
/// until released.
#[derive(Default)]
pub struct FakeProbe {
    pub calls: AtomicUsize,
    pub entered: Notify,
    pub fail: AtomicBool,
    gate: Option<Notify>,
}

impl FakeProbe {
    pub fn instant() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let probe = Self::default();
        probe.fail.store(true, Ordering::SeqCst);
        Arc::new(probe)
    }

    /// A probe that blocks every measurement until [`FakeProbe::release`].
    pub fn gated() -> Arc<Self> {
        Arc::new(Self {
            gate: Some(Notify::new()),
            ..Self::default()
        })
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ThroughputProbe for FakeProbe {
    async fn measure_download_mbps(&self) -> Result<f64, MeasurementError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(MeasurementError::CommandFailed {
                command: "fake".into(),
                stderr: "network unreachable".into(),
            });
        }
        Ok(100.0)
    }

    fn server_name(&self) -> String {
        "Fake Server".into()
    }
}

pub struct FakeInterface(pub InterfaceType);

#[async_trait]
impl InterfaceDetector for FakeInterface {
    async fn detect_interface_type(&self) -> InterfaceType {
        self.0
    }
}

pub struct FakeIsp(pub &'static str);

#[async_trait]
impl IspLookup for FakeIsp {
    async fn lookup_isp(&self) -> String {
        self.0.to_string()
    }
}

/// Lookups that never answer.
pub struct StalledLookups;

#[async_trait]
impl InterfaceDetector for StalledLookups {
    async fn detect_interface_type(&self) -> InterfaceType {
        std::future::pending().await
    }
}

#[async_trait]
impl IspLookup for StalledLookups {
    async fn lookup_isp(&self) -> String {
        std::future::pending().await
    }
}

/// In-memory store that can be told to fail.
#[derive(Default)]
pub struct MemoryStore {
    pub saved: Mutex<Vec<SpeedTestResult>>,
    pub fail: AtomicBool,
}

impl MemoryStore {
    pub fn saved(&self) -> Vec<SpeedTestResult> {
        self.saved.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn save_result(&self, result: &SpeedTestResult) -> Result<(), StorageError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::other("disk full")));
        }
        self.saved.lock().unwrap().push(result.clone());
        Ok(())
    }
}

/// Listener recording everything it is told.
#[derive(Default)]
pub struct RecordingListener {
    pub started: AtomicUsize,
    pub results: Mutex<Vec<SpeedTestResult>>,
}

impl RecordingListener {
    pub fn results(&self) -> Vec<SpeedTestResult> {
        self.results.lock().unwrap().clone()
    }

    pub fn result_count(&self) -> usize {
        self.results.lock().unwrap().len()
    }
}

impl TestListener for RecordingListener {
    fn on_test_started(&self) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn on_test_result(&self, result: &SpeedTestResult) {
        self.results.lock().unwrap().push(result.clone());
    }
}

pub fn collaborators(probe: Arc<FakeProbe>) -> Collaborators {
    Collaborators {
        probe,
        interface: Arc::new(FakeInterface(InterfaceType::Ethernet)),
        isp: Arc::new(FakeIsp("Example ISP")),
    }
}

/// A runner wired to fakes, plus handles to inspect what it did.
pub struct Harness {
    pub probe: Arc<FakeProbe>,
    pub store: Arc<MemoryStore>,
    pub listener: Arc<RecordingListener>,
    pub runner: Arc<TestRunner>,
    pub clock: Arc<MonotonicClock>,
}

impl Harness {
    pub fn new(probe: Arc<FakeProbe>) -> Self {
        let store = Arc::new(MemoryStore::default());
        let listener = Arc::new(RecordingListener::default());
        let clock = Arc::new(MonotonicClock::starting_at(t0()));
        let sink = ResultSink::new()
            .with_store(store.clone())
            .with_listener(listener.clone());
        let runner = Arc::new(TestRunner::new(
            collaborators(probe.clone()),
            sink,
            clock.clone(),
        ));
        Self {
            probe,
            store,
            listener,
            runner,
            clock,
        }
    }

    pub fn monitor(&self) -> Monitor {
        Monitor::with_cron_timezone(self.runner.clone(), self.clock.clone(), CronTimezone::Utc)
    }
}

/// Lets spawned tasks run to their next suspension point.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// A fresh directory under the system temp dir.
pub fn temp_dir(name: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("speedwatch-{name}-{}-{nanos}", std::process::id()))
}
