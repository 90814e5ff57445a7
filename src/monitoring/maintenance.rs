//! Recurring maintenance window evaluation.
//!
//! A monitor can carry at most one schedule: a daily, weekly or monthly
//! window given as `HH:MM` start/end times. Windows whose end precedes their
//! start wrap past midnight into the following day. Evaluation is pure and
//! happens once per check cycle, before probing.

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaintenanceFrequency {
    Daily,
    Weekly,
    Monthly,
}

/// Recurring maintenance window attached to a monitor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceSchedule {
    pub frequency: MaintenanceFrequency,
    /// Window start, `HH:MM`
    pub start_time: String,
    /// Window end, `HH:MM`; `end <= start` wraps to the next day
    pub end_time: String,
    /// Weekday indices for weekly schedules, 0=Sun..6=Sat
    #[serde(default)]
    pub weekdays: Vec<u8>,
    /// Day of month for monthly schedules, clamped to the month's length
    #[serde(default)]
    pub day_of_month: Option<u32>,
}

fn parse_hhmm(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").ok()
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}

/// Whether a window starting on `date` is applicable for this schedule
fn applies_on(schedule: &MaintenanceSchedule, date: NaiveDate) -> bool {
    match schedule.frequency {
        MaintenanceFrequency::Daily => true,
        MaintenanceFrequency::Weekly => {
            let weekday = date.weekday().num_days_from_sunday() as u8;
            schedule.weekdays.contains(&weekday)
        }
        MaintenanceFrequency::Monthly => match schedule.day_of_month {
            Some(day) => {
                let clamped = day.clamp(1, days_in_month(date.year(), date.month()));
                date.day() == clamped
            }
            None => false,
        },
    }
}

/// Evaluate whether `now` falls inside the schedule's window.
///
/// Malformed `HH:MM` values evaluate to false with a warning: a broken
/// schedule must not silently suppress monitoring.
pub fn is_in_maintenance_window(schedule: &MaintenanceSchedule, now: DateTime<Utc>) -> bool {
    let (Some(start), Some(end)) =
        (parse_hhmm(&schedule.start_time), parse_hhmm(&schedule.end_time))
    else {
        tracing::warn!(
            start = %schedule.start_time,
            end = %schedule.end_time,
            "malformed maintenance window times, treating as not in maintenance"
        );
        return false;
    };

    let wraps = end <= start;
    let today = now.date_naive();

    // A wrapping window that began yesterday can still cover the current
    // time, so both candidate start dates are checked.
    for days_back in 0..=1u64 {
        if days_back == 1 && !wraps {
            break;
        }

        let Some(date) = today.checked_sub_days(Days::new(days_back)) else {
            continue;
        };
        if !applies_on(schedule, date) {
            continue;
        }

        let window_start = date.and_time(start).and_utc();
        let window_end = if wraps {
            match date.checked_add_days(Days::new(1)) {
                Some(next) => next.and_time(end).and_utc(),
                None => continue,
            }
        } else {
            date.and_time(end).and_utc()
        };

        if now >= window_start && now < window_end {
            return true;
        }
    }

    false
}
