// Copyright (c) 2025 Jak Bracegirdle
//
// This file is part of the speedwatch crate.
//
// Licensed under the Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Tests for the JSON file result store.

mod common;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use common::temp_dir;
use speedwatch::*;

fn result_at(at: DateTime<Utc>, download: f64) -> SpeedTestResult {
    SpeedTestResult {
        timestamp: format_timestamp(at),
        download,
        upload: download * 0.1,
        ping: 20.0,
        server: "Fake Server".into(),
        network_interface: Some("WiFi".into()),
        isp: Some("Example ISP".into()),
        error: None,
    }
}

fn day(d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 8, d, h, 0, 0).unwrap()
}

#[tokio::test]
async fn results_survive_reopening() {
    let dir = temp_dir("reopen");
    let store = JsonFileStore::open(&dir).await.unwrap();
    store.save_result(&result_at(day(1, 9), 50.0)).await.unwrap();
    store.save_result(&result_at(day(1, 10), 80.0)).await.unwrap();
    drop(store);

    let reopened = JsonFileStore::open(&dir).await.unwrap();
    let recent = reopened.recent(10).await;
    assert_eq!(recent.len(), 2);
    // newest first
    assert_eq!(recent[0].result.download, 80.0);
    assert!(recent[0].id > recent[1].id);
    assert_eq!(reopened.recent(1).await.len(), 1);

    std::fs::remove_dir_all(dir).ok();
}

#[tokio::test]
async fn corrupt_file_starts_fresh() {
    let dir = temp_dir("corrupt");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(store::RESULTS_FILE), b"{ not json").unwrap();

    let store = JsonFileStore::open(&dir).await.unwrap();
    assert!(store.recent(10).await.is_empty());
    store.save_result(&result_at(day(2, 9), 10.0)).await.unwrap();
    assert_eq!(store.recent(10).await.len(), 1);

    std::fs::remove_dir_all(dir).ok();
}

#[tokio::test]
async fn statistics_ignore_failed_runs() {
    let dir = temp_dir("stats");
    let store = JsonFileStore::open(&dir).await.unwrap();

    assert_eq!(store.statistics().await, Statistics::default());

    store.save_result(&result_at(day(3, 9), 40.0)).await.unwrap();
    store.save_result(&result_at(day(3, 10), 80.0)).await.unwrap();
    store
        .save_result(&SpeedTestResult::failed(day(3, 11), "timeout"))
        .await
        .unwrap();

    let stats = store.statistics().await;
    assert_eq!(stats.total_tests, 3);
    assert_eq!(stats.failed_tests, 1);
    assert_eq!(stats.avg_download, 60.0);
    assert_eq!(stats.min_download, 40.0);
    assert_eq!(stats.max_download, 80.0);
    assert_eq!(stats.avg_ping, 20.0);

    std::fs::remove_dir_all(dir).ok();
}

#[tokio::test]
async fn range_and_daily_averages() {
    let dir = temp_dir("daily");
    let store = JsonFileStore::open(&dir).await.unwrap();
    for (d, h, download) in [(1, 9, 10.0), (5, 9, 20.0), (5, 18, 40.0), (6, 12, 90.0)] {
        store.save_result(&result_at(day(d, h), download)).await.unwrap();
    }

    let in_range = store.between(day(5, 0), day(5, 23)).await;
    assert_eq!(in_range.len(), 2);

    let averages = store.daily_averages(3, day(7, 0)).await;
    let dates: Vec<&str> = averages.iter().map(|a| a.date.as_str()).collect();
    assert_eq!(dates, ["2025-08-06", "2025-08-05"]);
    assert_eq!(averages[1].avg_download, 30.0);
    assert_eq!(averages[1].test_count, 2);

    let (earliest, latest) = store.date_bounds().await.unwrap();
    assert!(earliest <= latest);

    std::fs::remove_dir_all(dir).ok();
}

#[tokio::test]
async fn pruning_and_clearing() {
    let dir = temp_dir("prune");
    let store = JsonFileStore::open(&dir).await.unwrap();
    store.save_result(&result_at(day(1, 9), 10.0)).await.unwrap();
    store.save_result(&result_at(day(20, 9), 20.0)).await.unwrap();

    let removed = store.prune_older_than(10, day(25, 0)).await.unwrap();
    assert_eq!(removed, 1);
    assert_eq!(store.recent(10).await[0].result.download, 20.0);

    // everything was created "now", after this cutoff
    let outcome = store.clear_until(Utc::now() - TimeDelta::days(1)).await.unwrap();
    assert_eq!(outcome.removed, 0);
    assert_eq!(outcome.remaining, 1);

    let outcome = store.clear_all().await.unwrap();
    assert_eq!(
        outcome,
        ClearOutcome {
            removed: 1,
            remaining: 0
        }
    );
    assert!(store.date_bounds().await.is_none());

    let reopened = JsonFileStore::open(&dir).await.unwrap();
    assert!(reopened.recent(10).await.is_empty());

    std::fs::remove_dir_all(dir).ok();
}

#[tokio::test]
async fn failed_writes_leave_memory_unchanged() {
    let dir = temp_dir("failed-write");
    let store = JsonFileStore::open(&dir).await.unwrap();
    store.save_result(&result_at(day(4, 9), 30.0)).await.unwrap();

    // a directory in place of the file makes every rename fail
    std::fs::remove_file(store.path()).unwrap();
    std::fs::create_dir(store.path()).unwrap();

    assert!(store.save_result(&result_at(day(4, 10), 60.0)).await.is_err());
    let recent = store.recent(10).await;
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].result.download, 30.0);
    assert_eq!(store.statistics().await.total_tests, 1);

    assert!(store.clear_all().await.is_err());
    assert!(store.clear_until(Utc::now()).await.is_err());
    assert!(store.prune_older_than(0, day(30, 0)).await.is_err());
    assert_eq!(store.recent(10).await.len(), 1);

    std::fs::remove_dir_all(dir).ok();
}

#[tokio::test]
async fn huge_day_windows_cover_everything() {
    let dir = temp_dir("huge-window");
    let store = JsonFileStore::open(&dir).await.unwrap();
    store.save_result(&result_at(day(1, 9), 10.0)).await.unwrap();
    store.save_result(&result_at(day(2, 9), 20.0)).await.unwrap();

    let averages = store.daily_averages(u32::MAX, day(3, 0)).await;
    assert_eq!(averages.len(), 2);

    assert_eq!(store.prune_older_than(u32::MAX, Utc::now()).await.unwrap(), 0);
    assert_eq!(store.recent(10).await.len(), 2);

    std::fs::remove_dir_all(dir).ok();
}
