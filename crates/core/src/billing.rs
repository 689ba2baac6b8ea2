//! Billing cycles and usage aggregation.
//!
//! A cycle is a rolling calendar-month window anchored to the
//! subscription's day-of-month. Cycle arithmetic walks months, never fixed
//! 30-day increments, and clamps the anchor day into months that are too
//! short (anchor day 31 lands on Feb 28/29).

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::call::CallRecord;
use crate::domain::subscription::Subscription;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub included_minutes: i64,
    pub used_minutes: i64,
    pub remaining_minutes: i64,
    pub limit_reached: bool,
    pub cycle_start: DateTime<Utc>,
    pub cycle_end: DateTime<Utc>,
}

/// Billable minutes for one call: ceiling division by 60, never negative.
/// Exact minute boundaries stay exact (120s is 2 minutes, not 3).
pub fn billable_minutes(duration_secs: i64) -> i64 {
    if duration_secs <= 0 {
        return 0;
    }
    (duration_secs + 59) / 60
}

/// The billing window containing `now`: starts at midnight on the most
/// recent occurrence of the anchor's day-of-month and ends one calendar
/// month later, both clamped to month length.
pub fn cycle_window(anchor: DateTime<Utc>, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let anchor_day = anchor.day();
    let today = now.date_naive();

    let mut year = today.year();
    let mut month = today.month();
    let mut start = clamped_date(year, month, anchor_day);
    if start > today {
        (year, month) = previous_month(year, month);
        start = clamped_date(year, month, anchor_day);
    }

    let (end_year, end_month) = next_month(year, month);
    let end = clamped_date(end_year, end_month, anchor_day);

    (midnight_utc(start), midnight_utc(end))
}

/// Aggregate billable usage for the cycle containing `now`. Only completed
/// calls whose start falls inside `[cycle_start, cycle_end)` count.
pub fn usage_summary(
    subscription: &Subscription,
    calls: &[CallRecord],
    now: DateTime<Utc>,
) -> UsageSummary {
    let (cycle_start, cycle_end) = cycle_window(subscription.anchor_at, now);

    let used_minutes = calls
        .iter()
        .filter(|call| call.is_completed())
        .filter(|call| call.started_at >= cycle_start && call.started_at < cycle_end)
        .map(|call| billable_minutes(call.duration_secs))
        .sum::<i64>();

    let included_minutes = subscription.included_minutes.max(0);
    UsageSummary {
        included_minutes,
        used_minutes,
        remaining_minutes: (included_minutes - used_minutes).max(0),
        limit_reached: used_minutes >= included_minutes,
        cycle_start,
        cycle_end,
    }
}

fn clamped_date(year: i32, month: u32, day: u32) -> NaiveDate {
    let mut day = day.clamp(1, 31);
    loop {
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            return date;
        }
        day -= 1;
    }
}

fn previous_month(year: i32, month: u32) -> (i32, u32) {
    if month == 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    }
}

fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

fn midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}
