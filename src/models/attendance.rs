use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One attendance fact: this identity was logged on this site on this day.
/// Rows are only ever inserted or removed, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceLogEntry {
    pub account_id: i64,
    pub site: String,
    pub identity: String,
    pub date: NaiveDate,
}

/// Derived streak state. Not stored durably; recomputed from the log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakResult {
    pub consecutive_days: u32,
    pub last_logged_date: Option<NaiveDate>,
}

/// Point-in-time attendance numbers for a (site, identity) pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceStats {
    pub consecutive_days: u32,
    pub total_days: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToggleAction {
    Added,
    Removed,
    Noop,
}

/// Result of a manual attendance toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleOutcome {
    pub consecutive_days: u32,
    pub total_days: u32,
    pub action: ToggleAction,
}

/// One cell of a month calendar or recent-days strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayAttendance {
    pub date: NaiveDate,
    pub attended: bool,
}
