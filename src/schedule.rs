//! Attendance-window computation and schedule resolution. Everything here is
//! a pure function of its inputs; callers pass the current time in, so the
//! logic is deterministic under test.

use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, NaiveDateTime, Timelike, Weekday};
use serde::Deserialize;

use crate::config::PeriodConfig;

/// One scheduled class on a given weekday.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClassEntry {
    pub periods: Vec<u32>,
    pub classroom: String,
}

/// Weekly schedule keyed by English three-letter weekday abbreviation
/// (`Mon`..`Sun`). A weekday without classes can simply be omitted.
pub type WeekSchedule = HashMap<String, Vec<ClassEntry>>;

/// Inclusive minute-of-day range during which a period accepts check-ins.
/// Minutes are signed because a large buffer can push the lower bound before
/// midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttendanceWindow {
    pub start: i32,
    pub end: i32,
}

impl AttendanceWindow {
    pub fn contains(&self, minute: i32) -> bool {
        self.start <= minute && minute <= self.end
    }
}

/// A schedule entry together with the period that selected it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedClass<'a> {
    pub period: u32,
    pub entry: &'a ClassEntry,
}

/// Derives the per-period check-in windows. Period `p` starts at
/// `start_hour*60 + (p-1)*duration` minutes past midnight and its window
/// extends `attendance_buffer_minutes` to either side, both ends inclusive.
/// Windows may overlap when the buffer is large relative to the duration.
pub fn attendance_windows(config: &PeriodConfig) -> BTreeMap<u32, AttendanceWindow> {
    let first_start = (config.start_hour * 60) as i32;
    let duration = config.period_duration_minutes as i32;
    let buffer = config.attendance_buffer_minutes as i32;

    (1..=config.period_count)
        .map(|period| {
            let start = first_start + (period as i32 - 1) * duration;
            (
                period,
                AttendanceWindow {
                    start: start - buffer,
                    end: start + buffer,
                },
            )
        })
        .collect()
}

/// Maps a minute-of-day to the period whose window contains it. Periods are
/// scanned in ascending order, so when windows overlap the lowest-numbered
/// period wins.
pub fn current_period(config: &PeriodConfig, minutes_now: i32) -> Option<u32> {
    attendance_windows(config)
        .into_iter()
        .find(|(_, window)| window.contains(minutes_now))
        .map(|(period, _)| period)
}

/// Schedule key for a weekday.
pub fn weekday_abbrev(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Mon",
        Weekday::Tue => "Tue",
        Weekday::Wed => "Wed",
        Weekday::Thu => "Thu",
        Weekday::Fri => "Fri",
        Weekday::Sat => "Sat",
        Weekday::Sun => "Sun",
    }
}

/// Resolves the class to attend at `now`, if any. When no attendance window
/// is open the schedule is not consulted at all; otherwise today's entries
/// are scanned in order and the first one listing the open period wins.
pub fn resolve_current_class<'a>(
    schedule: &'a WeekSchedule,
    config: &PeriodConfig,
    now: &NaiveDateTime,
) -> Option<ResolvedClass<'a>> {
    let minutes_now = (now.hour() * 60 + now.minute()) as i32;
    let period = current_period(config, minutes_now)?;

    schedule
        .get(weekday_abbrev(now.weekday()))
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .find(|entry| entry.periods.contains(&period))
        .map(|entry| ResolvedClass { period, entry })
}
