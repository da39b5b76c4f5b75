//! Five-field cron expressions evaluated at minute granularity.
//!
//! Supported field syntax: `*`, `N`, `N-M`, `*/S`, `N-M/S`, `N/S` and comma
//! separated lists of those. Months accept `JAN`..`DEC`, weekdays accept
//! `SUN`..`SAT`, and weekday `7` is an alias for Sunday. When both the
//! day-of-month and the day-of-week fields are restricted a day matches if
//! either one does, as in Vixie cron.

// Copyright (c) 2025 Jak Bracegirdle
//
// This file is part of the speedwatch crate.
//
// Licensed under the Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::fmt;
use std::str::FromStr;

use chrono::{
    DateTime, Datelike, LocalResult, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Timelike,
};

use crate::error::ValidationError;

/// How far ahead [`CronExpression::next_at_or_after`] searches before giving up.
const SEARCH_HORIZON_DAYS: i64 = 366 * 5;

const MONTH_NAMES: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];
const WEEKDAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
    names: &'static [&'static str],
    name_offset: u32,
}

const MINUTE: FieldSpec = FieldSpec {
    name: "minute",
    min: 0,
    max: 59,
    names: &[],
    name_offset: 0,
};
const HOUR: FieldSpec = FieldSpec {
    name: "hour",
    min: 0,
    max: 23,
    names: &[],
    name_offset: 0,
};
const DAY_OF_MONTH: FieldSpec = FieldSpec {
    name: "day-of-month",
    min: 1,
    max: 31,
    names: &[],
    name_offset: 0,
};
const MONTH: FieldSpec = FieldSpec {
    name: "month",
    min: 1,
    max: 12,
    names: &MONTH_NAMES,
    name_offset: 1,
};
const DAY_OF_WEEK: FieldSpec = FieldSpec {
    name: "day-of-week",
    min: 0,
    max: 7,
    names: &WEEKDAY_NAMES,
    name_offset: 0,
};

/// A parsed cron expression.
///
/// Each field is stored as a bit set indexed by the field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpression {
    source: String,
    minutes: u64,
    hours: u64,
    days_of_month: u64,
    months: u64,
    days_of_week: u64,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl CronExpression {
    /// Parses a five-field cron expression.
    ///
    /// # Examples
    ///
    /// ```
    /// # use speedwatch::CronExpression;
    /// assert!(CronExpression::parse("*/5 * * * *").is_ok());
    /// assert!(CronExpression::parse("* * *").is_err());
    /// assert!(CronExpression::parse("61 * * * *").is_err());
    /// ```
    pub fn parse(expression: &str) -> Result<Self, ValidationError> {
        let trimmed = expression.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyCron);
        }

        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(ValidationError::CronFieldCount {
                found: fields.len(),
            });
        }

        let mut days_of_week = parse_field(&DAY_OF_WEEK, fields[4])?;
        if days_of_week & (1 << 7) != 0 {
            days_of_week = (days_of_week & !(1 << 7)) | 1;
        }

        Ok(Self {
            source: fields.join(" "),
            minutes: parse_field(&MINUTE, fields[0])?,
            hours: parse_field(&HOUR, fields[1])?,
            days_of_month: parse_field(&DAY_OF_MONTH, fields[2])?,
            months: parse_field(&MONTH, fields[3])?,
            days_of_week,
            dom_restricted: !fields[2].starts_with('*'),
            dow_restricted: !fields[4].starts_with('*'),
        })
    }

    /// The normalized source text (fields joined by single spaces).
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether the expression fires at the minute containing `at`.
    pub fn matches(&self, at: &NaiveDateTime) -> bool {
        self.month_matches(at.date())
            && self.day_matches(at.date())
            && bit(self.hours, at.hour())
            && bit(self.minutes, at.minute())
    }

    /// Returns the first fire time that is at or after `from`.
    ///
    /// Fields are matched against the local time of `from`'s time zone.
    /// Local times skipped by a DST transition never fire; ambiguous local
    /// times fire on their earliest mapping. Returns `None` when nothing
    /// matches within five years, e.g. for `0 0 30 2 *`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use chrono::{TimeZone, Utc};
    /// # use speedwatch::CronExpression;
    /// let cron = CronExpression::parse("*/15 * * * *").unwrap();
    /// let from = Utc.with_ymd_and_hms(2025, 8, 7, 12, 1, 30).unwrap();
    /// let next = cron.next_at_or_after(&from).unwrap();
    /// assert_eq!(next, Utc.with_ymd_and_hms(2025, 8, 7, 12, 15, 0).unwrap());
    /// ```
    pub fn next_at_or_after<Tz: TimeZone>(&self, from: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let tz = from.timezone();
        let mut cursor = from.naive_local();
        let horizon = cursor.checked_add_signed(TimeDelta::days(SEARCH_HORIZON_DAYS))?;

        loop {
            let candidate = self.next_naive_at_or_after(cursor, horizon)?;
            let resolved = match tz.from_local_datetime(&candidate) {
                LocalResult::Single(at) => Some(at),
                LocalResult::Ambiguous(earliest, _) => Some(earliest),
                LocalResult::None => None,
            };
            match resolved {
                Some(at) if at >= *from => return Some(at),
                _ => cursor = candidate.checked_add_signed(TimeDelta::minutes(1))?,
            }
        }
    }

    fn next_naive_at_or_after(
        &self,
        from: NaiveDateTime,
        horizon: NaiveDateTime,
    ) -> Option<NaiveDateTime> {
        let mut t = ceil_to_minute(from)?;

        while t <= horizon {
            let date = t.date();
            if !self.month_matches(date) {
                t = first_of_next_month(date)?.and_hms_opt(0, 0, 0)?;
                continue;
            }
            if !self.day_matches(date) {
                t = date.succ_opt()?.and_hms_opt(0, 0, 0)?;
                continue;
            }
            if !bit(self.hours, t.hour()) {
                t = date.and_hms_opt(t.hour(), 0, 0)? + TimeDelta::hours(1);
                continue;
            }
            if !bit(self.minutes, t.minute()) {
                t += TimeDelta::minutes(1);
                continue;
            }
            return Some(t);
        }

        None
    }

    fn month_matches(&self, date: NaiveDate) -> bool {
        bit(self.months, date.month())
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        let dom = bit(self.days_of_month, date.day());
        let dow = bit(self.days_of_week, date.weekday().num_days_from_sunday());
        if self.dom_restricted && self.dow_restricted {
            dom || dow
        } else {
            dom && dow
        }
    }
}

impl FromStr for CronExpression {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CronExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn bit(set: u64, value: u32) -> bool {
    set & (1u64 << value) != 0
}

fn ceil_to_minute(t: NaiveDateTime) -> Option<NaiveDateTime> {
    let floored = t.with_second(0)?.with_nanosecond(0)?;
    if floored == t {
        Some(floored)
    } else {
        floored.checked_add_signed(TimeDelta::minutes(1))
    }
}

fn first_of_next_month(date: NaiveDate) -> Option<NaiveDate> {
    if date.month() == 12 {
        NaiveDate::from_ymd_opt(date.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(date.year(), date.month() + 1, 1)
    }
}

fn parse_field(spec: &FieldSpec, text: &str) -> Result<u64, ValidationError> {
    let invalid = |reason: String| ValidationError::CronField {
        field: spec.name,
        value: text.to_string(),
        reason,
    };

    let mut set = 0u64;
    for item in text.split(',') {
        if item.is_empty() {
            return Err(invalid("empty list item".into()));
        }

        let (range, step) = match item.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| invalid(format!("`{step}` is not a valid step")))?;
                if step == 0 {
                    return Err(invalid("step must be at least 1".into()));
                }
                (range, Some(step))
            }
            None => (item, None),
        };

        let (low, high) = if range == "*" {
            (spec.min, spec.max)
        } else if let Some((low, high)) = range.split_once('-') {
            let low = parse_value(spec, low).map_err(&invalid)?;
            let high = parse_value(spec, high).map_err(&invalid)?;
            if low > high {
                return Err(invalid(format!("range {low}-{high} is reversed")));
            }
            (low, high)
        } else {
            let value = parse_value(spec, range).map_err(&invalid)?;
            match step {
                Some(_) => (value, spec.max),
                None => (value, value),
            }
        };

        for value in (low..=high).step_by(step.unwrap_or(1) as usize) {
            set |= 1u64 << value;
        }
    }

    Ok(set)
}

fn parse_value(spec: &FieldSpec, text: &str) -> Result<u32, String> {
    let value = match text.parse::<u32>() {
        Ok(value) => value,
        Err(_) => spec
            .names
            .iter()
            .position(|name| name.eq_ignore_ascii_case(text))
            .map(|index| index as u32 + spec.name_offset)
            .ok_or_else(|| format!("`{text}` is not a number"))?,
    };

    if value < spec.min || value > spec.max {
        return Err(format!(
            "{value} is outside {}..={}",
            spec.min, spec.max
        ));
    }
    Ok(value)
}
