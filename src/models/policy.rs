use serde::{Deserialize, Serialize};

/// How attendance is recorded for a (site, identity) pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceType {
    /// Inferred from deposit events.
    #[default]
    Automatic,
    /// Explicitly toggled by the operator.
    Manual,
}

/// Whether an attendance streak survives a month boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RolloverPolicy {
    /// Streak keeps accumulating across months and wraps cyclically at 30.
    Included,
    /// Streak resets at the month boundary.
    #[default]
    Excluded,
}

impl RolloverPolicy {
    /// Whether the streak walk stops when it leaves the anchor month.
    pub fn stops_at_month_boundary(&self) -> bool {
        matches!(self, RolloverPolicy::Excluded)
    }

    /// Fold a raw consecutive-day count into the reported value.
    /// Under `Included`, counts past 30 wrap into 1..=30 (31 reads as 1,
    /// 60 as 30, 61 as 1 again).
    pub fn fold(&self, days: u32) -> u32 {
        match self {
            RolloverPolicy::Included if days > 30 => {
                let remainder = days % 30;
                if remainder == 0 { 30 } else { remainder }
            }
            _ => days,
        }
    }
}

/// Attendance policy for a site, optionally specialized per identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendancePolicy {
    pub attendance_type: AttendanceType,
    pub rollover: RolloverPolicy,
}
