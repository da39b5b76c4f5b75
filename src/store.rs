//! Append-only result storage backed by a JSON file.

// Copyright (c) 2025 Jak Bracegirdle
//
// This file is part of the speedwatch crate.
//
// Licensed under the Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::StorageError;
use crate::models::{ClearOutcome, DailyAverage, SpeedTestResult, Statistics, StoredSpeedTest};

/// File name used inside the data directory.
pub const RESULTS_FILE: &str = "speed_tests.json";

/// Trait to abstract persisting results.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn save_result(&self, result: &SpeedTestResult) -> Result<(), StorageError>;
}

#[derive(Serialize, Deserialize, Default)]
struct StoreFile {
    #[serde(default)]
    speed_tests: Vec<StoredSpeedTest>,
}

/// Result store keeping every record in memory, newest first, and rewriting
/// the whole file on each change.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    tests: Mutex<Vec<StoredSpeedTest>>,
}

impl JsonFileStore {
    /// Opens (or creates) the store inside `data_dir`.
    ///
    /// An unreadable or corrupt file is logged and replaced by an empty store
    /// on the next write rather than failing startup.
    pub async fn open(data_dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir).await?;
        let path = data_dir.join(RESULTS_FILE);

        let mut tests = match fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<StoreFile>(&bytes) {
                Ok(file) => file.speed_tests,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "result file is corrupt, starting fresh"
                    );
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        sort_newest_first(&mut tests);

        info!(path = %path.display(), count = tests.len(), "result store opened");
        Ok(Self {
            path,
            tests: Mutex::new(tests),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends a result and returns its record id.
    pub async fn append(&self, result: &SpeedTestResult) -> Result<i64, StorageError> {
        let now = Utc::now();
        let mut tests = self.tests.lock().await;

        let newest_id = tests.iter().map(|t| t.id).max().unwrap_or(0);
        let id = now.timestamp_millis().max(newest_id + 1);
        let mut updated = tests.clone();
        updated.push(StoredSpeedTest {
            id,
            result: result.clone(),
            created_at: now,
        });
        sort_newest_first(&mut updated);

        // memory only changes once the file does
        self.persist(&updated).await?;
        *tests = updated;
        info!(id, "speed test saved");
        Ok(id)
    }

    /// The `limit` most recent records, newest first.
    pub async fn recent(&self, limit: usize) -> Vec<StoredSpeedTest> {
        self.tests.lock().await.iter().take(limit).cloned().collect()
    }

    /// Records measured within `[start, end]`, newest first.
    pub async fn between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<StoredSpeedTest> {
        self.tests
            .lock()
            .await
            .iter()
            .filter(|t| (start..=end).contains(&t.measured_at()))
            .cloned()
            .collect()
    }

    /// Aggregates over successful records; failed ones are only counted.
    pub async fn statistics(&self) -> Statistics {
        let tests = self.tests.lock().await;
        let ok: Vec<&SpeedTestResult> = tests
            .iter()
            .map(|t| &t.result)
            .filter(|r| !r.is_error())
            .collect();

        let mut stats = Statistics {
            total_tests: tests.len(),
            failed_tests: tests.len() - ok.len(),
            ..Statistics::default()
        };
        if ok.is_empty() {
            return stats;
        }

        (stats.avg_download, stats.min_download, stats.max_download) =
            summarize(ok.iter().map(|r| r.download));
        (stats.avg_upload, stats.min_upload, stats.max_upload) =
            summarize(ok.iter().map(|r| r.upload));
        (stats.avg_ping, stats.min_ping, stats.max_ping) = summarize(ok.iter().map(|r| r.ping));
        stats
    }

    /// Per-day averages of successful records from the last `days` days.
    pub async fn daily_averages(&self, days: u32, now: DateTime<Utc>) -> Vec<DailyAverage> {
        let cutoff = days_before(now, days);
        let tests = self.tests.lock().await;

        let mut by_day: BTreeMap<String, Vec<&SpeedTestResult>> = BTreeMap::new();
        for test in tests.iter().filter(|t| !t.result.is_error()) {
            let at = test.measured_at();
            if at >= cutoff {
                by_day
                    .entry(at.format("%Y-%m-%d").to_string())
                    .or_default()
                    .push(&test.result);
            }
        }

        by_day
            .into_iter()
            .rev()
            .map(|(date, results)| {
                let n = results.len() as f64;
                DailyAverage {
                    date,
                    avg_download: results.iter().map(|r| r.download).sum::<f64>() / n,
                    avg_upload: results.iter().map(|r| r.upload).sum::<f64>() / n,
                    avg_ping: results.iter().map(|r| r.ping).sum::<f64>() / n,
                    test_count: results.len(),
                }
            })
            .collect()
    }

    /// Deletes records measured more than `days_to_keep` days before `now`.
    pub async fn prune_older_than(
        &self,
        days_to_keep: u32,
        now: DateTime<Utc>,
    ) -> Result<usize, StorageError> {
        let cutoff = days_before(now, days_to_keep);
        let outcome = self.retain(|t| t.measured_at() >= cutoff).await?;
        if outcome.removed > 0 {
            info!(removed = outcome.removed, "old speed test records deleted");
        }
        Ok(outcome.removed)
    }

    /// Deletes every record created at or before `cutoff`.
    pub async fn clear_until(&self, cutoff: DateTime<Utc>) -> Result<ClearOutcome, StorageError> {
        let outcome = self.retain(|t| t.created_at > cutoff).await?;
        info!(removed = outcome.removed, %cutoff, "speed tests cleared up to cutoff");
        Ok(outcome)
    }

    pub async fn clear_all(&self) -> Result<ClearOutcome, StorageError> {
        let outcome = self.retain(|_| false).await?;
        info!(removed = outcome.removed, "all speed tests cleared");
        Ok(outcome)
    }

    /// Earliest and latest measurement times, for date pickers.
    pub async fn date_bounds(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let tests = self.tests.lock().await;
        let earliest = tests.iter().map(StoredSpeedTest::measured_at).min()?;
        let latest = tests.iter().map(StoredSpeedTest::measured_at).max()?;
        Some((earliest, latest))
    }

    async fn retain<F>(&self, keep: F) -> Result<ClearOutcome, StorageError>
    where
        F: Fn(&StoredSpeedTest) -> bool,
    {
        let mut tests = self.tests.lock().await;
        let kept: Vec<StoredSpeedTest> = tests.iter().filter(|t| keep(t)).cloned().collect();
        let removed = tests.len() - kept.len();
        if removed > 0 {
            self.persist(&kept).await?;
            *tests = kept;
        }
        Ok(ClearOutcome {
            removed,
            remaining: tests.len(),
        })
    }

    async fn persist(&self, tests: &[StoredSpeedTest]) -> Result<(), StorageError> {
        let file = StoreFileRef { speed_tests: tests };
        let json = serde_json::to_vec_pretty(&file)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[derive(Serialize)]
struct StoreFileRef<'a> {
    speed_tests: &'a [StoredSpeedTest],
}

#[async_trait]
impl ResultStore for JsonFileStore {
    async fn save_result(&self, result: &SpeedTestResult) -> Result<(), StorageError> {
        self.append(result).await.map(|_| ())
    }
}

/// `days` before `now`, saturating at the earliest representable instant.
fn days_before(now: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    TimeDelta::try_days(i64::from(days))
        .and_then(|span| now.checked_sub_signed(span))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn sort_newest_first(tests: &mut [StoredSpeedTest]) {
    tests.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

/// Returns `(average, min, max)` of a non-empty series.
fn summarize(values: impl Iterator<Item = f64>) -> (f64, f64, f64) {
    let mut count = 0usize;
    let mut sum = 0.0;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for value in values {
        count += 1;
        sum += value;
        min = min.min(value);
        max = max.max(value);
    }
    (sum / count as f64, min, max)
}
