//! Wall-clock sources used to stamp results and evaluate schedules.

// Copyright (c) 2025 Jak Bracegirdle
//
// This file is part of the speedwatch crate.
//
// Licensed under the Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use chrono::{DateTime, TimeDelta, Utc};
use tokio::time::Instant;

/// Trait to abstract reading the current time.
///
/// Allows driving the monitor from a fake clock in tests.
pub trait Clock: Send + Sync {
    /// Returns the current wall-clock time.
    fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A wall clock anchored to tokio's monotonic clock.
///
/// It reads `origin` at the moment of construction and advances with
/// [`tokio::time::Instant`], so it follows `tokio::time::pause` and
/// `tokio::time::advance` in tests.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: DateTime<Utc>,
    started: Instant,
}

impl MonotonicClock {
    pub fn starting_at(origin: DateTime<Utc>) -> Self {
        Self {
            origin,
            started: Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> DateTime<Utc> {
        TimeDelta::from_std(self.started.elapsed())
            .ok()
            .and_then(|elapsed| self.origin.checked_add_signed(elapsed))
            .unwrap_or(self.origin)
    }
}
