// Copyright (c) 2025 Jak Bracegirdle
//
// This file is part of the speedwatch crate.
//
// Licensed under the Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Integration tests for the HTTP endpoints.
//!
//! Every test builds its own [`AppContext`] wired to fake collaborators and a
//! store in a fresh temporary directory, so no state is shared between tests.

mod common;

use std::path::PathBuf;
use std::sync::Arc;

use actix_web::{App, http, test, web};
use common::*;
use serde_json::{Value, json};
use speedwatch::api::{self, CommandResponse};
use speedwatch::*;

/// A dummy result with fixed example values.
fn dummy_result() -> SpeedTestResult {
    SpeedTestResult {
        timestamp: "2025-08-07T12:34:56.000Z".to_string(),
        download: 95.5,
        upload: 9.55,
        ping: 20.0,
        server: "Speedtest.net".into(),
        network_interface: Some("WiFi".into()),
        isp: Some("Example ISP".into()),
        error: None,
    }
}

async fn context(name: &str, probe: Arc<FakeProbe>) -> (web::Data<AppContext>, PathBuf) {
    let dir = temp_dir(name);
    let store = Arc::new(JsonFileStore::open(&dir).await.unwrap());
    let config = Config::from_lookup(|_| None).unwrap();
    let ctx = AppContext::new(collaborators(probe), store, Arc::new(SystemClock), &config);
    (web::Data::new(ctx), dir)
}

macro_rules! app {
    ($ctx:expr) => {
        test::init_service(App::new().app_data($ctx.clone()).configure(api::configure)).await
    };
}

/// `/speed` answers 503 until a result is available.
#[actix_web::test]
async fn speed_returns_service_unavailable_when_no_result() {
    let (ctx, dir) = context("speed-empty", FakeProbe::instant()).await;
    let app = app!(ctx);

    let req = test::TestRequest::get().uri("/speed").to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), http::StatusCode::SERVICE_UNAVAILABLE);
    let body = test::read_body(resp).await;
    assert_eq!(body, "Speedtest result not available yet.");

    std::fs::remove_dir_all(dir).ok();
}

/// `/speed` returns the latest result as JSON.
#[actix_web::test]
async fn speed_returns_latest_result() {
    let (ctx, dir) = context("speed-latest", FakeProbe::instant()).await;
    ctx.latest.set(dummy_result());
    let app = app!(ctx);

    let req = test::TestRequest::get().uri("/speed").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), http::StatusCode::OK);

    let body = test::read_body(resp).await;
    let result: SpeedTestResult = serde_json::from_slice(&body).unwrap();
    assert_eq!(result, dummy_result());

    let raw: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(raw["networkInterface"], "WiFi");
    assert!(raw.get("error").is_none());

    std::fs::remove_dir_all(dir).ok();
}

#[actix_web::test]
async fn manual_test_is_stored_and_served() {
    let (ctx, dir) = context("manual", FakeProbe::instant()).await;
    let app = app!(ctx);

    let req = test::TestRequest::post().uri("/test").to_request();
    let result: SpeedTestResult = test::call_and_read_body_json(&app, req).await;
    assert_eq!(result.download, 100.0);
    assert_eq!(result.network_interface.as_deref(), Some("Ethernet"));

    let req = test::TestRequest::get().uri("/speed").to_request();
    let latest: SpeedTestResult = test::call_and_read_body_json(&app, req).await;
    assert_eq!(latest, result);

    let req = test::TestRequest::get().uri("/history?limit=5").to_request();
    let history: Vec<StoredSpeedTest> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].result, result);

    let req = test::TestRequest::get().uri("/statistics").to_request();
    let stats: Statistics = test::call_and_read_body_json(&app, req).await;
    assert_eq!(stats.total_tests, 1);
    assert_eq!(stats.avg_download, 100.0);

    std::fs::remove_dir_all(dir).ok();
}

#[actix_web::test]
async fn start_and_stop_report_conflicts() {
    let (ctx, dir) = context("start-stop", FakeProbe::instant()).await;
    let app = app!(ctx);

    let req = test::TestRequest::post().uri("/monitor/stop").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), http::StatusCode::CONFLICT);

    let schedule = json!({ "type": "interval", "minutes": 10 });
    let req = test::TestRequest::post()
        .uri("/monitor/start")
        .set_json(&schedule)
        .to_request();
    let body: CommandResponse = test::call_and_read_body_json(&app, req).await;
    assert_eq!(
        body,
        CommandResponse {
            success: true,
            error: None
        }
    );

    let req = test::TestRequest::post()
        .uri("/monitor/start")
        .set_json(&schedule)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), http::StatusCode::CONFLICT);
    let body: CommandResponse = test::read_body_json(resp).await;
    assert!(!body.success);

    let req = test::TestRequest::get().uri("/status").to_request();
    let status: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(status["isRunning"], true);
    assert_eq!(status["schedule"], schedule);

    let req = test::TestRequest::post().uri("/monitor/stop").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), http::StatusCode::OK);

    let req = test::TestRequest::get().uri("/status").to_request();
    let status: MonitorStatus = test::call_and_read_body_json(&app, req).await;
    assert!(!status.is_running);
    assert_eq!(status.next_run_at, None);

    std::fs::remove_dir_all(dir).ok();
}

#[actix_web::test]
async fn invalid_schedule_is_a_bad_request() {
    let (ctx, dir) = context("invalid", FakeProbe::instant()).await;
    let app = app!(ctx);

    for schedule in [
        json!({ "type": "cron", "expression": "* * *" }),
        json!({ "type": "interval", "minutes": 0 }),
        json!({ "type": "weekly" }),
    ] {
        let req = test::TestRequest::post()
            .uri("/monitor/start")
            .set_json(&schedule)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), http::StatusCode::BAD_REQUEST, "{schedule}");
    }
    assert!(!ctx.monitor.is_running());

    std::fs::remove_dir_all(dir).ok();
}

#[actix_web::test]
async fn manual_test_conflicts_with_one_in_flight() {
    let probe = FakeProbe::gated();
    let (ctx, dir) = context("busy", probe.clone()).await;
    let app = app!(ctx);

    let running = {
        let ctx = ctx.clone();
        actix_web::rt::spawn(async move { ctx.monitor.trigger_test().await })
    };
    probe.entered.notified().await;

    let req = test::TestRequest::post().uri("/test").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), http::StatusCode::CONFLICT);

    probe.release();
    assert!(!running.await.unwrap().is_skipped());

    std::fs::remove_dir_all(dir).ok();
}

#[actix_web::test]
async fn clearing_history_empties_the_store() {
    let (ctx, dir) = context("clear", FakeProbe::instant()).await;
    ctx.store.save_result(&dummy_result()).await.unwrap();
    ctx.store.save_result(&dummy_result()).await.unwrap();
    let app = app!(ctx);

    let req = test::TestRequest::delete().uri("/history").to_request();
    let outcome: ClearOutcome = test::call_and_read_body_json(&app, req).await;
    assert_eq!(
        outcome,
        ClearOutcome {
            removed: 2,
            remaining: 0
        }
    );

    let req = test::TestRequest::get().uri("/history").to_request();
    let history: Vec<StoredSpeedTest> = test::call_and_read_body_json(&app, req).await;
    assert!(history.is_empty());

    std::fs::remove_dir_all(dir).ok();
}

#[actix_web::test]
async fn averages_accept_any_day_window() {
    let (ctx, dir) = context("averages", FakeProbe::instant()).await;
    ctx.store.save_result(&dummy_result()).await.unwrap();
    let app = app!(ctx);

    let req = test::TestRequest::get()
        .uri("/averages?days=4294967295")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), http::StatusCode::OK);
    let averages: Vec<DailyAverage> = test::read_body_json(resp).await;
    assert_eq!(averages.len(), 1);
    assert_eq!(averages[0].date, "2025-08-07");

    std::fs::remove_dir_all(dir).ok();
}

#[tokio::test]
async fn startup_tolerates_any_retention_window() {
    let dir = temp_dir("retention");
    let data_dir = dir.to_string_lossy().into_owned();
    let config = Config::from_lookup(|key| match key {
        "DATA_DIR" => Some(data_dir.clone()),
        "RETENTION_DAYS" => Some(u32::MAX.to_string()),
        "SCHEDULE_TYPE" => Some("none".into()),
        _ => None,
    })
    .unwrap();
    assert_eq!(config.retention_days, Some(u32::MAX));

    let ctx = AppContext::from_config(&config).await.unwrap();
    assert!(ctx.store.recent(1).await.is_empty());
    assert!(!ctx.monitor.is_running());

    std::fs::remove_dir_all(dir).ok();
}
