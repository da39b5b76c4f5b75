//! The monitor state machine: `Idle --start--> Running --stop--> Idle`.
//!
//! While running, a ticker task wakes up periodically, asks the schedule
//! evaluator whether a run is due, and dispatches the test runner on its own
//! task when it is.

// Copyright (c) 2025 Jak Bracegirdle
//
// This file is part of the speedwatch crate.
//
// Licensed under the Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::error::MonitorError;
use crate::models::MonitorStatus;
use crate::runner::{RunOutcome, TestRunner};
use crate::schedule::{CronTimezone, Schedule, ScheduleDescriptor};

#[derive(Debug, Default)]
struct MonitorState {
    schedule: Option<Schedule>,
    last_test_time: Option<DateTime<Utc>>,
    /// Present exactly while running.
    ticker: Option<CancellationToken>,
}

struct Inner {
    runner: Arc<TestRunner>,
    clock: Arc<dyn Clock>,
    zone: CronTimezone,
    state: Mutex<MonitorState>,
}

/// Schedules speed tests according to an interval or a cron expression.
///
/// Must be started from within a tokio runtime.
pub struct Monitor {
    inner: Arc<Inner>,
}

impl Monitor {
    pub fn new(runner: Arc<TestRunner>, clock: Arc<dyn Clock>) -> Self {
        Self::with_cron_timezone(runner, clock, CronTimezone::default())
    }

    pub fn with_cron_timezone(
        runner: Arc<TestRunner>,
        clock: Arc<dyn Clock>,
        zone: CronTimezone,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                runner,
                clock,
                zone,
                state: Mutex::new(MonitorState::default()),
            }),
        }
    }

    /// Validates `descriptor` and starts scheduling.
    ///
    /// Interval schedules run a test immediately and then every interval.
    /// Cron schedules wait for their next fire time. Nothing is armed when
    /// an error is returned.
    pub fn start(&self, descriptor: &ScheduleDescriptor) -> Result<(), MonitorError> {
        let mut state = self.inner.lock_state();
        if state.ticker.is_some() {
            return Err(MonitorError::AlreadyRunning);
        }

        let schedule = Schedule::validate(descriptor)?;
        let now = self.inner.clock.now();
        let first_tick = schedule.first_tick_delay(now);
        let period = schedule.tick_period();
        let token = CancellationToken::new();

        state.ticker = Some(token.clone());
        state.last_test_time = None;
        if schedule.runs_immediately() {
            state.last_test_time = Some(now);
            self.inner.dispatch();
        }
        info!(schedule = %schedule, "speed monitor started");
        state.schedule = Some(schedule);
        drop(state);

        tokio::spawn(tick_loop(Arc::downgrade(&self.inner), token, first_tick, period));
        Ok(())
    }

    /// Stops scheduling. Pending ticks are cancelled immediately; a test
    /// already in flight is left to finish on its own.
    pub fn stop(&self) -> Result<(), MonitorError> {
        let mut state = self.inner.lock_state();
        let token = state.ticker.take().ok_or(MonitorError::NotRunning)?;
        token.cancel();
        info!("speed monitor stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock_state().ticker.is_some()
    }

    /// Runs a test now, whatever the monitor state.
    ///
    /// Shares the single-flight guard with scheduled runs and never touches
    /// the schedule's last-run bookkeeping.
    pub async fn trigger_test(&self) -> RunOutcome {
        info!("manual speed test requested");
        self.inner.runner.run().await
    }

    pub fn status(&self) -> MonitorStatus {
        let state = self.inner.lock_state();
        let is_running = state.ticker.is_some();
        let next_run_at = match (&state.schedule, is_running) {
            (Some(schedule), true) => {
                self.inner
                    .zone
                    .next_run_at(schedule, state.last_test_time, self.inner.clock.now())
            }
            _ => None,
        };

        MonitorStatus {
            is_running,
            schedule: state.schedule.as_ref().map(Schedule::descriptor),
            has_current_test: self.inner.runner.is_busy(),
            last_test_time: state.last_test_time,
            next_run_at,
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        if let Some(token) = self.inner.lock_state().ticker.take() {
            token.cancel();
        }
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Runs the test on its own task so stopping the ticker never aborts it.
    fn dispatch(&self) {
        let runner = Arc::clone(&self.runner);
        tokio::spawn(async move {
            runner.run().await;
        });
    }

    fn on_tick(&self, token: &CancellationToken) {
        let mut state = self.lock_state();
        if token.is_cancelled() {
            return;
        }
        let Some(schedule) = &state.schedule else {
            return;
        };

        let now = self.clock.now();
        if !self.zone.is_due(schedule, state.last_test_time, now) {
            debug!(%now, "tick: not due");
            return;
        }

        debug!(%now, "tick: run due");
        state.last_test_time = Some(now);
        self.dispatch();
    }
}

async fn tick_loop(
    inner: Weak<Inner>,
    token: CancellationToken,
    first_tick: Duration,
    period: Duration,
) {
    let mut ticker = time::interval_at(Instant::now() + first_tick, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    debug!(?first_tick, ?period, "ticker armed");

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                let Some(inner) = inner.upgrade() else { break };
                inner.on_tick(&token);
            }
        }
    }

    debug!("ticker stopped");
}
