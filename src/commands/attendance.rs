//! Attendance operations the application shell calls directly.

use chrono::NaiveDate;

use crate::attendance::{self, streak::compute_streak};
use crate::attendance::tracker;
use crate::commands::LedgerContext;
use crate::error::LedgerError;
use crate::models::{AttendanceStats, DayAttendance, StreakResult, ToggleOutcome};

/// Manual attendance toggle. Applied optimistically to the local log,
/// then pushed to the authoritative store; a remote failure keeps the
/// local outcome and only warns.
pub async fn toggle_manual(
    ctx: &LedgerContext,
    site: &str,
    identity: &str,
    date: NaiveDate,
    desired: Option<bool>,
) -> Result<ToggleOutcome, LedgerError> {
    let policy = ctx.policies.policy_for(ctx.account_id, site, identity).await;

    let outcome = tracker::toggle_manual(
        &ctx.db,
        &policy,
        ctx.account_id,
        site,
        identity,
        date,
        desired,
    )?;

    ctx.reconciler.invalidate_stats(site, identity);
    if let Err(e) = ctx
        .reconciler
        .toggle_remote(ctx.account_id, site, identity, date, desired)
        .await
    {
        log::warn!("remote attendance toggle for {}/{} failed: {}", identity, site, e);
    }

    Ok(outcome)
}

/// Batch attendance stats with the reconciler's retry/fallback rules.
pub async fn attendance_overview(
    ctx: &LedgerContext,
    pairs: &[(String, String)],
) -> Vec<AttendanceStats> {
    ctx.reconciler.attendance_stats(ctx.account_id, pairs).await
}

/// Streak computed from the local log under the pair's policy.
pub async fn local_streak(
    ctx: &LedgerContext,
    site: &str,
    identity: &str,
) -> Result<StreakResult, LedgerError> {
    let policy = ctx.policies.policy_for(ctx.account_id, site, identity).await;
    let dates = tracker::log_dates(&ctx.db, ctx.account_id, site, identity)?;
    Ok(compute_streak(&dates, policy.rollover))
}

/// Month calendar of attended days for a pair.
pub async fn month_view(
    ctx: &LedgerContext,
    site: &str,
    identity: &str,
    year: i32,
    month: u32,
) -> Result<Vec<DayAttendance>, LedgerError> {
    let dates = tracker::log_dates(&ctx.db, ctx.account_id, site, identity)?;
    Ok(attendance::month_calendar(&dates, year, month))
}

/// Attendance rate (percent) for a month.
pub async fn monthly_rate(
    ctx: &LedgerContext,
    site: &str,
    identity: &str,
    year: i32,
    month: u32,
    today: NaiveDate,
) -> Result<u32, LedgerError> {
    let dates = tracker::log_dates(&ctx.db, ctx.account_id, site, identity)?;
    Ok(attendance::attendance_rate(&dates, year, month, today))
}
