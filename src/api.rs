//! HTTP endpoints for polling results and controlling the monitor.

// Copyright (c) 2025 Jak Bracegirdle
//
// This file is part of the speedwatch crate.
//
// Licensed under the Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use actix_web::{HttpResponse, Responder, delete, get, post, web};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::context::AppContext;
use crate::error::MonitorError;
use crate::runner::RunOutcome;
use crate::schedule::ScheduleDescriptor;

/// Default number of records returned by `/history`.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Default window of `/averages`, in days.
pub const DEFAULT_AVERAGE_DAYS: u32 = 7;

/// Body of every command endpoint.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct CommandResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandResponse {
    fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    fn failed(error: impl ToString) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Deserialize, Debug)]
pub struct RangeQuery {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Deserialize, Debug)]
pub struct AveragesQuery {
    pub days: Option<u32>,
}

#[derive(Deserialize, Debug)]
pub struct ClearQuery {
    pub until: Option<DateTime<Utc>>,
}

/// Registers every endpoint on an actix `App`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(speedtest)
        .service(status)
        .service(start_monitoring)
        .service(stop_monitoring)
        .service(test_now)
        .service(history_range)
        .service(history)
        .service(statistics)
        .service(averages)
        .service(clear_history);
}

/// HTTP GET endpoint `/speed` returns the last speedtest result as JSON.
///
/// Returns HTTP 503 Service Unavailable if no test finished yet.
#[get("/speed")]
pub async fn speedtest(ctx: web::Data<AppContext>) -> impl Responder {
    match ctx.latest.get() {
        Some(result) => HttpResponse::Ok().json(result),
        None => HttpResponse::ServiceUnavailable().body("Speedtest result not available yet."),
    }
}

#[get("/status")]
pub async fn status(ctx: web::Data<AppContext>) -> impl Responder {
    HttpResponse::Ok().json(ctx.monitor.status())
}

/// Starts the monitor with the schedule in the body.
///
/// 400 for an invalid schedule, 409 when already running.
#[post("/monitor/start")]
pub async fn start_monitoring(
    ctx: web::Data<AppContext>,
    body: web::Json<ScheduleDescriptor>,
) -> impl Responder {
    match ctx.monitor.start(&body) {
        Ok(()) => HttpResponse::Ok().json(CommandResponse::ok()),
        Err(e @ MonitorError::Invalid(_)) => {
            HttpResponse::BadRequest().json(CommandResponse::failed(e))
        }
        Err(e) => HttpResponse::Conflict().json(CommandResponse::failed(e)),
    }
}

#[post("/monitor/stop")]
pub async fn stop_monitoring(ctx: web::Data<AppContext>) -> impl Responder {
    match ctx.monitor.stop() {
        Ok(()) => HttpResponse::Ok().json(CommandResponse::ok()),
        Err(e) => HttpResponse::Conflict().json(CommandResponse::failed(e)),
    }
}

/// Runs a test immediately and returns its result.
///
/// 409 when a test is already in flight.
#[post("/test")]
pub async fn test_now(ctx: web::Data<AppContext>) -> impl Responder {
    match ctx.monitor.trigger_test().await {
        RunOutcome::Completed(result) => HttpResponse::Ok().json(result),
        RunOutcome::Skipped => HttpResponse::Conflict()
            .json(CommandResponse::failed("a speed test is already in progress")),
    }
}

#[get("/history")]
pub async fn history(
    ctx: web::Data<AppContext>,
    query: web::Query<HistoryQuery>,
) -> impl Responder {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    HttpResponse::Ok().json(ctx.store.recent(limit).await)
}

#[get("/history/range")]
pub async fn history_range(
    ctx: web::Data<AppContext>,
    query: web::Query<RangeQuery>,
) -> impl Responder {
    HttpResponse::Ok().json(ctx.store.between(query.start, query.end).await)
}

#[get("/statistics")]
pub async fn statistics(ctx: web::Data<AppContext>) -> impl Responder {
    HttpResponse::Ok().json(ctx.store.statistics().await)
}

#[get("/averages")]
pub async fn averages(
    ctx: web::Data<AppContext>,
    query: web::Query<AveragesQuery>,
) -> impl Responder {
    let days = query.days.unwrap_or(DEFAULT_AVERAGE_DAYS);
    HttpResponse::Ok().json(ctx.store.daily_averages(days, ctx.clock.now()).await)
}

/// Deletes records created up to `until`, or everything when omitted.
#[delete("/history")]
pub async fn clear_history(
    ctx: web::Data<AppContext>,
    query: web::Query<ClearQuery>,
) -> impl Responder {
    let outcome = match query.until {
        Some(cutoff) => ctx.store.clear_until(cutoff).await,
        None => ctx.store.clear_all().await,
    };

    match outcome {
        Ok(outcome) => HttpResponse::Ok().json(outcome),
        Err(e) => {
            error!(error = %e, "failed to clear history");
            HttpResponse::InternalServerError().json(CommandResponse::failed(e))
        }
    }
}
