//! Pure streak derivation over a set of attendance dates.

use std::collections::HashSet;

use chrono::{Datelike, NaiveDate};

use crate::models::{DayAttendance, RolloverPolicy, StreakResult};
use crate::time::{days_in_month, previous_day, same_month};

/// Hard ceiling on the streak walk. Nobody attends for a year straight;
/// this guards against pathological log data.
const MAX_WALK_DAYS: u32 = 365;

/// Count consecutive attendance days ending at the most recent log.
///
/// Walks backwards one calendar day at a time while a log exists. The
/// rollover policy decides what happens at a month boundary: `Excluded`
/// stops the walk there, `Included` keeps going and folds counts past 30
/// back into 1..=30.
pub fn compute_streak(dates: &[NaiveDate], rollover: RolloverPolicy) -> StreakResult {
    let set: HashSet<NaiveDate> = dates.iter().copied().collect();
    let Some(most_recent) = set.iter().copied().max() else {
        return StreakResult::default();
    };

    let mut days: u32 = 0;
    let mut check = most_recent;
    while set.contains(&check) {
        if rollover.stops_at_month_boundary() && !same_month(check, most_recent) {
            break;
        }
        days += 1;
        check = previous_day(check);
        if days > MAX_WALK_DAYS {
            break;
        }
    }

    StreakResult {
        consecutive_days: rollover.fold(days),
        last_logged_date: Some(most_recent),
    }
}

/// Attendance rate (rounded percent) for one month. For the current
/// month only the days up to `today` count as the denominator.
pub fn attendance_rate(dates: &[NaiveDate], year: i32, month: u32, today: NaiveDate) -> u32 {
    let attended = dates
        .iter()
        .filter(|d| d.year() == year && d.month() == month)
        .count() as f64;

    let target_days = if today.year() == year && today.month() == month {
        today.day()
    } else {
        days_in_month(year, month)
    };
    if target_days == 0 {
        return 0;
    }

    (attended / target_days as f64 * 100.0).round() as u32
}

/// Per-day attended flags for a month view.
pub fn month_calendar(dates: &[NaiveDate], year: i32, month: u32) -> Vec<DayAttendance> {
    let set: HashSet<NaiveDate> = dates.iter().copied().collect();
    (1..=days_in_month(year, month))
        .filter_map(|day| NaiveDate::from_ymd_opt(year, month, day))
        .map(|date| DayAttendance {
            date,
            attended: set.contains(&date),
        })
        .collect()
}

/// Attended flags for the last `days` days ending at `today`, most
/// recent first.
pub fn recent_attendance(dates: &[NaiveDate], today: NaiveDate, days: u32) -> Vec<DayAttendance> {
    let set: HashSet<NaiveDate> = dates.iter().copied().collect();
    let mut result = Vec::with_capacity(days as usize);
    let mut check = today;
    for _ in 0..days {
        result.push(DayAttendance {
            date: check,
            attended: set.contains(&check),
        });
        check = previous_day(check);
    }
    result
}
