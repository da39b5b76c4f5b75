//! Schedule descriptors, their validation, and the due-ness evaluator.

// Copyright (c) 2025 Jak Bracegirdle
//
// This file is part of the speedwatch crate.
//
// Licensed under the Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Local, TimeDelta, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cron::CronExpression;
use crate::error::ValidationError;

/// Smallest accepted interval, in minutes.
pub const MIN_INTERVAL_MINUTES: u32 = 1;

/// Largest accepted interval, in minutes (one day).
pub const MAX_INTERVAL_MINUTES: u32 = 24 * 60;

/// Band around a target time inside which a tick counts as "on time".
pub const TOLERANCE: Duration = Duration::from_secs(30);

/// Period of the wake-up tick used for cron schedules.
pub const CRON_TICK: Duration = Duration::from_secs(60);

/// A schedule as submitted by a caller, before validation.
///
/// Serialized as `{"type": "interval", "minutes": 5}` or
/// `{"type": "cron", "expression": "*/5 * * * *"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ScheduleDescriptor {
    Interval { minutes: u32 },
    Cron { expression: String },
}

/// A validated, immutable schedule.
///
/// Produced by [`Schedule::validate`]. A cron variant always holds a parsed
/// expression, so downstream code never re-checks it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    Interval { minutes: u32 },
    Cron(CronExpression),
}

impl Schedule {
    /// Validates a descriptor into a [`Schedule`].
    ///
    /// # Examples
    ///
    /// ```
    /// # use speedwatch::{Schedule, ScheduleDescriptor};
    /// let ok = Schedule::validate(&ScheduleDescriptor::Interval { minutes: 5 });
    /// assert!(ok.is_ok());
    ///
    /// let bad = Schedule::validate(&ScheduleDescriptor::Cron { expression: "* * *".into() });
    /// assert!(bad.is_err());
    /// ```
    pub fn validate(descriptor: &ScheduleDescriptor) -> Result<Self, ValidationError> {
        match descriptor {
            ScheduleDescriptor::Interval { minutes } => {
                if !(MIN_INTERVAL_MINUTES..=MAX_INTERVAL_MINUTES).contains(minutes) {
                    return Err(ValidationError::IntervalOutOfRange {
                        minutes: *minutes,
                        min: MIN_INTERVAL_MINUTES,
                        max: MAX_INTERVAL_MINUTES,
                    });
                }
                Ok(Self::Interval { minutes: *minutes })
            }
            ScheduleDescriptor::Cron { expression } => {
                Ok(Self::Cron(CronExpression::parse(expression)?))
            }
        }
    }

    /// Returns the descriptor this schedule was validated from (normalized).
    pub fn descriptor(&self) -> ScheduleDescriptor {
        match self {
            Self::Interval { minutes } => ScheduleDescriptor::Interval { minutes: *minutes },
            Self::Cron(cron) => ScheduleDescriptor::Cron {
                expression: cron.as_str().to_string(),
            },
        }
    }

    /// How often the monitor wakes up to evaluate this schedule.
    pub fn tick_period(&self) -> Duration {
        match self {
            Self::Interval { minutes } => Duration::from_secs(u64::from(*minutes) * 60),
            Self::Cron(_) => CRON_TICK,
        }
    }

    /// Delay before the first tick when the monitor starts at `now`.
    ///
    /// Cron ticks are aligned to whole minutes of the wall clock so that they
    /// land on fire times rather than somewhere inside the tolerance window.
    pub fn first_tick_delay(&self, now: DateTime<Utc>) -> Duration {
        match self {
            Self::Interval { .. } => self.tick_period(),
            Self::Cron(_) => {
                let into_minute =
                    Duration::new(u64::from(now.second()), now.nanosecond() % 1_000_000_000);
                CRON_TICK.saturating_sub(into_minute)
            }
        }
    }

    /// Whether the monitor should run a test as soon as it starts.
    pub fn runs_immediately(&self) -> bool {
        matches!(self, Self::Interval { .. })
    }
}

impl TryFrom<ScheduleDescriptor> for Schedule {
    type Error = ValidationError;

    fn try_from(descriptor: ScheduleDescriptor) -> Result<Self, Self::Error> {
        Self::validate(&descriptor)
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interval { minutes } => write!(f, "every {minutes} minute(s)"),
            Self::Cron(cron) => write!(f, "cron `{cron}`"),
        }
    }
}

/// Time zone cron fields are matched in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CronTimezone {
    #[default]
    Local,
    Utc,
}

impl CronTimezone {
    /// [`is_due`] with UTC timestamps, evaluated in this zone.
    pub fn is_due(
        self,
        schedule: &Schedule,
        last_run_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        match self {
            CronTimezone::Utc => is_due(schedule, last_run_at.as_ref(), &now),
            CronTimezone::Local => {
                let last = last_run_at.map(|t| t.with_timezone(&Local));
                is_due(schedule, last.as_ref(), &now.with_timezone(&Local))
            }
        }
    }

    /// [`next_run_at`] with UTC timestamps, evaluated in this zone.
    pub fn next_run_at(
        self,
        schedule: &Schedule,
        last_run_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        match self {
            CronTimezone::Utc => next_run_at(schedule, last_run_at.as_ref(), &now),
            CronTimezone::Local => {
                let last = last_run_at.map(|t| t.with_timezone(&Local));
                next_run_at(schedule, last.as_ref(), &now.with_timezone(&Local))
                    .map(|t| t.with_timezone(&Utc))
            }
        }
    }
}

fn tolerance() -> TimeDelta {
    TimeDelta::seconds(TOLERANCE.as_secs() as i64)
}

/// Decides whether a run is due at `now`.
///
/// Interval schedules are due when they never ran, or when at least the
/// interval (minus [`TOLERANCE`]) has elapsed since the last run.
///
/// Cron schedules are due when a fire time lies within `now ± TOLERANCE`
/// and was not already covered by the last run. A run at `L` covers every
/// fire time in `L ± TOLERANCE`, so two ticks landing in the same window
/// never both fire.
///
/// # Examples
///
/// ```
/// # use chrono::{TimeDelta, TimeZone, Utc};
/// # use speedwatch::{is_due, Schedule};
/// let every_five = Schedule::Interval { minutes: 5 };
/// let t = Utc.with_ymd_and_hms(2025, 8, 7, 12, 0, 0).unwrap();
///
/// assert!(is_due(&every_five, None, &t));
/// assert!(is_due(&every_five, Some(&t), &(t + TimeDelta::minutes(5))));
/// assert!(!is_due(&every_five, Some(&t), &(t + TimeDelta::minutes(4))));
/// ```
pub fn is_due<Tz: TimeZone>(
    schedule: &Schedule,
    last_run_at: Option<&DateTime<Tz>>,
    now: &DateTime<Tz>,
) -> bool {
    match schedule {
        Schedule::Interval { minutes } => {
            let Some(last) = last_run_at else {
                return true;
            };
            let period = TimeDelta::minutes(i64::from(*minutes));
            now.clone().signed_duration_since(last) >= period - tolerance()
        }
        Schedule::Cron(cron) => {
            if let Some(last) = last_run_at {
                if now.clone().signed_duration_since(last) < tolerance() {
                    return false;
                }
            }

            let Some(next) = cron.next_at_or_after(&cron_search_start(last_run_at, now)) else {
                warn!(expression = %cron, "cron expression has no upcoming fire time");
                return false;
            };

            next.signed_duration_since(now).abs() <= tolerance()
        }
    }
}

/// Projects the next time the schedule will fire, for status display.
///
/// Returns `None` for a cron expression that never fires again.
pub fn next_run_at<Tz: TimeZone>(
    schedule: &Schedule,
    last_run_at: Option<&DateTime<Tz>>,
    now: &DateTime<Tz>,
) -> Option<DateTime<Tz>> {
    match schedule {
        Schedule::Interval { minutes } => match last_run_at {
            Some(last) => Some(last.clone() + TimeDelta::minutes(i64::from(*minutes))),
            None => Some(now.clone()),
        },
        Schedule::Cron(cron) => cron.next_at_or_after(&cron_search_start(last_run_at, now)),
    }
}

/// Earliest instant a not-yet-covered cron fire time can have.
fn cron_search_start<Tz: TimeZone>(
    last_run_at: Option<&DateTime<Tz>>,
    now: &DateTime<Tz>,
) -> DateTime<Tz> {
    let window_start = now.clone() - tolerance();
    match last_run_at {
        Some(last) => {
            let covered_until = last.clone() + tolerance() + TimeDelta::nanoseconds(1);
            window_start.max(covered_until)
        }
        None => window_start,
    }
}
