//! Attendance log maintenance.
//!
//! Automatic registration is driven by the same deposit edits the
//! cascade consumes; manual toggling is an explicit operator action.
//! Both paths end in the same place: an insert-or-ignore / delete on the
//! unique `(account, site, identity, date)` log row, followed by a
//! streak recompute.

use chrono::NaiveDate;
use rusqlite::params;

use crate::attendance::streak::compute_streak;
use crate::db::Database;
use crate::error::LedgerError;
use crate::models::{
    AttendanceLogEntry, AttendancePolicy, AttendanceType, Entry, StreakResult, ToggleAction,
    ToggleOutcome,
};

const DATE_FORMAT: &str = "%Y-%m-%d";

fn fmt_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Insert a log row if absent. Returns whether a row was inserted.
pub fn insert_log(
    db: &Database,
    account_id: i64,
    site: &str,
    identity: &str,
    date: NaiveDate,
) -> Result<bool, LedgerError> {
    let conn = db.conn.lock().map_err(|e| LedgerError::Database(e.to_string()))?;
    let changed = conn.execute(
        "INSERT OR IGNORE INTO attendance_log (account_id, site_name, identity_name, attendance_date)
         VALUES (?, ?, ?, ?)",
        params![account_id, site, identity, fmt_date(date)],
    )?;
    Ok(changed > 0)
}

/// Remove a log row if present. Returns whether a row was removed.
pub fn remove_log(
    db: &Database,
    account_id: i64,
    site: &str,
    identity: &str,
    date: NaiveDate,
) -> Result<bool, LedgerError> {
    let conn = db.conn.lock().map_err(|e| LedgerError::Database(e.to_string()))?;
    let changed = conn.execute(
        "DELETE FROM attendance_log
         WHERE account_id = ? AND site_name = ? AND identity_name = ? AND attendance_date = ?",
        params![account_id, site, identity, fmt_date(date)],
    )?;
    Ok(changed > 0)
}

/// All logged dates for a pair, most recent first.
pub fn log_dates(
    db: &Database,
    account_id: i64,
    site: &str,
    identity: &str,
) -> Result<Vec<NaiveDate>, LedgerError> {
    let conn = db.conn.lock().map_err(|e| LedgerError::Database(e.to_string()))?;
    let mut stmt = conn.prepare(
        "SELECT attendance_date FROM attendance_log
         WHERE account_id = ? AND site_name = ? AND identity_name = ?
         ORDER BY attendance_date DESC",
    )?;

    let dates = stmt
        .query_map(params![account_id, site, identity], |row| {
            row.get::<_, String>(0)
        })?
        .collect::<Result<Vec<String>, _>>()?;

    Ok(dates
        .iter()
        .filter_map(|s| NaiveDate::parse_from_str(s, DATE_FORMAT).ok())
        .collect())
}

/// Full log rows for a pair, most recent first. What the calendar and
/// export surfaces consume.
pub fn log_entries(
    db: &Database,
    account_id: i64,
    site: &str,
    identity: &str,
) -> Result<Vec<AttendanceLogEntry>, LedgerError> {
    Ok(log_dates(db, account_id, site, identity)?
        .into_iter()
        .map(|date| AttendanceLogEntry {
            account_id,
            site: site.to_string(),
            identity: identity.to_string(),
            date,
        })
        .collect())
}

/// Lifetime number of logged days for a pair.
pub fn total_days(
    db: &Database,
    account_id: i64,
    site: &str,
    identity: &str,
) -> Result<u32, LedgerError> {
    let conn = db.conn.lock().map_err(|e| LedgerError::Database(e.to_string()))?;
    let count: u32 = conn.query_row(
        "SELECT COUNT(*) FROM attendance_log
         WHERE account_id = ? AND site_name = ? AND identity_name = ?",
        params![account_id, site, identity],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Current streak for a pair under its rollover policy.
pub fn streak(
    db: &Database,
    policy: &AttendancePolicy,
    account_id: i64,
    site: &str,
    identity: &str,
) -> Result<StreakResult, LedgerError> {
    let dates = log_dates(db, account_id, site, identity)?;
    Ok(compute_streak(&dates, policy.rollover))
}

/// Deposit-driven registration. Only applies under automatic policy and
/// only for the first slot (by display order) carrying the pair that
/// day; later ones are recharges and must not double-register. A
/// positive deposit inserts the day's log, a zeroed one removes it.
///
/// Returns the recomputed streak, or `None` when the edit was skipped.
pub fn register_automatic(
    db: &Database,
    policy: &AttendancePolicy,
    account_id: i64,
    site: &str,
    identity: &str,
    date: NaiveDate,
    deposit: i64,
    first_slot: bool,
) -> Result<Option<StreakResult>, LedgerError> {
    if policy.attendance_type != AttendanceType::Automatic {
        log::debug!("attendance {}/{}: manual mode, skipped", identity, site);
        return Ok(None);
    }
    if !first_slot {
        log::debug!("attendance {}/{}: recharge, skipped", identity, site);
        return Ok(None);
    }

    if deposit > 0 {
        insert_log(db, account_id, site, identity, date)?;
    } else {
        remove_log(db, account_id, site, identity, date)?;
    }

    let result = streak(db, policy, account_id, site, identity)?;
    log::debug!(
        "attendance {}/{}: {} day(s)",
        identity,
        site,
        result.consecutive_days
    );
    Ok(Some(result))
}

/// Operator-driven toggle. Only applies under manual policy.
/// `Some(true)` ensures the log exists, `Some(false)` ensures it does
/// not, `None` flips the current state.
pub fn toggle_manual(
    db: &Database,
    policy: &AttendancePolicy,
    account_id: i64,
    site: &str,
    identity: &str,
    date: NaiveDate,
    desired: Option<bool>,
) -> Result<ToggleOutcome, LedgerError> {
    if policy.attendance_type != AttendanceType::Manual {
        return Err(LedgerError::Validation(format!(
            "attendance for {}/{} is automatic; manual toggle not allowed",
            identity, site
        )));
    }

    let exists = {
        let conn = db.conn.lock().map_err(|e| LedgerError::Database(e.to_string()))?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM attendance_log
             WHERE account_id = ? AND site_name = ? AND identity_name = ? AND attendance_date = ?",
            params![account_id, site, identity, fmt_date(date)],
            |row| row.get(0),
        )?;
        count > 0
    };

    let action = match desired {
        Some(true) if !exists => {
            insert_log(db, account_id, site, identity, date)?;
            ToggleAction::Added
        }
        Some(false) if exists => {
            remove_log(db, account_id, site, identity, date)?;
            ToggleAction::Removed
        }
        Some(_) => ToggleAction::Noop,
        None => {
            if exists {
                remove_log(db, account_id, site, identity, date)?;
                ToggleAction::Removed
            } else {
                insert_log(db, account_id, site, identity, date)?;
                ToggleAction::Added
            }
        }
    };

    let result = streak(db, policy, account_id, site, identity)?;
    let total = total_days(db, account_id, site, identity)?;

    Ok(ToggleOutcome {
        consecutive_days: result.consecutive_days,
        total_days: total,
        action,
    })
}

/// Whether the slot is a same-day duplicate of an earlier-ordered entry
/// for the same pair in the same slot position. A recharge never
/// registers attendance and gets no attendance/payback affordances.
pub fn is_recharge(journal: &[Entry], entry_index: usize, slot_index: usize) -> bool {
    let Some(entry) = journal.get(entry_index) else {
        return false;
    };
    let Some(pair) = entry.slots.get(slot_index).and_then(|s| s.pair()) else {
        return false;
    };

    journal[..entry_index]
        .iter()
        .find_map(|earlier| {
            let slot = &earlier.slots[slot_index];
            (slot.pair() == Some(pair)).then_some(slot.deposit_amount > 0)
        })
        .unwrap_or(false)
}

/// Policy switched from automatic to manual: optionally purge the pair's
/// accumulated automatic logs. Returns the number of rows deleted.
pub fn handle_mode_change(
    db: &Database,
    account_id: i64,
    site: &str,
    identity: &str,
    delete_logs: bool,
) -> Result<u32, LedgerError> {
    if !delete_logs {
        log::info!("attendance {}/{}: switched to manual, logs kept", identity, site);
        return Ok(0);
    }

    let conn = db.conn.lock().map_err(|e| LedgerError::Database(e.to_string()))?;
    let deleted = conn.execute(
        "DELETE FROM attendance_log
         WHERE account_id = ? AND site_name = ? AND identity_name = ?",
        params![account_id, site, identity],
    )?;

    log::info!(
        "attendance {}/{}: switched to manual, {} log(s) deleted",
        identity,
        site,
        deleted
    );
    Ok(deleted as u32)
}
