//! Entry row storage. The four slots are flattened into numbered
//! columns, matching what the operators see on screen.

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::LedgerError;
use crate::models::{Entry, Slot};

const DATE_FORMAT: &str = "%Y-%m-%d";

const ENTRY_COLUMNS: &str = "id, account_id, entry_date, display_order, \
     identity1, site1, deposit1, withdraw1, attended1, \
     identity2, site2, deposit2, withdraw2, attended2, \
     identity3, site3, deposit3, withdraw3, attended3, \
     identity4, site4, deposit4, withdraw4, attended4, \
     annotation, entered_amount, total_amount, rate_amount, \
     carried_amount, private_amount, total_charge, margin, \
     revision, created_at, updated_at";

/// Helper function to map a database row to an Entry struct
fn map_row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<Entry> {
    let date_text: String = row.get(2)?;
    let entry_date = NaiveDate::parse_from_str(&date_text, DATE_FORMAT).map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("bad entry date: {date_text}").into(),
        )
    })?;

    let mut slots: [Slot; 4] = Default::default();
    for (i, slot) in slots.iter_mut().enumerate() {
        let base = 4 + i * 5;
        *slot = Slot {
            identity: row.get(base)?,
            site: row.get(base + 1)?,
            deposit_amount: row.get(base + 2)?,
            withdraw_amount: row.get(base + 3)?,
            attended: row.get::<_, i64>(base + 4)? == 1,
        };
    }

    Ok(Entry {
        id: row.get(0)?,
        account_id: row.get(1)?,
        entry_date,
        display_order: row.get(3)?,
        slots,
        annotation: row.get(24)?,
        entered_amount: row.get(25)?,
        total_amount: row.get(26)?,
        rate_amount: row.get(27)?,
        carried_amount: row.get(28)?,
        private_amount: row.get(29)?,
        total_charge: row.get(30)?,
        margin: row.get(31)?,
        revision: row.get::<_, i64>(32)? as u64,
        created_at: row.get(33)?,
        updated_at: row.get(34)?,
    })
}

/// Ordered journal for one (account, date).
pub fn fetch_journal(
    conn: &Connection,
    account_id: i64,
    date: NaiveDate,
) -> Result<Vec<Entry>, LedgerError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ENTRY_COLUMNS} FROM entries
         WHERE account_id = ? AND entry_date = ?
         ORDER BY display_order ASC"
    ))?;

    let entries = stmt
        .query_map(
            params![account_id, date.format(DATE_FORMAT).to_string()],
            map_row_to_entry,
        )?
        .collect::<Result<Vec<Entry>, _>>()?;
    Ok(entries)
}

pub fn fetch_entry(conn: &Connection, id: &str) -> Result<Entry, LedgerError> {
    conn.query_row(
        &format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE id = ?"),
        [id],
        map_row_to_entry,
    )
    .optional()?
    .ok_or_else(|| LedgerError::NotFound(id.to_string()))
}

pub fn insert_entry(conn: &Connection, entry: &Entry) -> Result<(), LedgerError> {
    conn.execute(
        "INSERT INTO entries (
            id, account_id, entry_date, display_order,
            identity1, site1, deposit1, withdraw1, attended1,
            identity2, site2, deposit2, withdraw2, attended2,
            identity3, site3, deposit3, withdraw3, attended3,
            identity4, site4, deposit4, withdraw4, attended4,
            annotation, entered_amount, total_amount, rate_amount,
            carried_amount, private_amount, total_charge, margin,
            revision, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                  ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            entry.id,
            entry.account_id,
            entry.entry_date.format(DATE_FORMAT).to_string(),
            entry.display_order,
            entry.slots[0].identity,
            entry.slots[0].site,
            entry.slots[0].deposit_amount,
            entry.slots[0].withdraw_amount,
            entry.slots[0].attended as i64,
            entry.slots[1].identity,
            entry.slots[1].site,
            entry.slots[1].deposit_amount,
            entry.slots[1].withdraw_amount,
            entry.slots[1].attended as i64,
            entry.slots[2].identity,
            entry.slots[2].site,
            entry.slots[2].deposit_amount,
            entry.slots[2].withdraw_amount,
            entry.slots[2].attended as i64,
            entry.slots[3].identity,
            entry.slots[3].site,
            entry.slots[3].deposit_amount,
            entry.slots[3].withdraw_amount,
            entry.slots[3].attended as i64,
            entry.annotation,
            entry.entered_amount,
            entry.total_amount,
            entry.rate_amount,
            entry.carried_amount,
            entry.private_amount,
            entry.total_charge,
            entry.margin,
            entry.revision as i64,
            entry.created_at,
            entry.updated_at,
        ],
    )?;
    Ok(())
}

pub fn update_entry(conn: &Connection, entry: &Entry) -> Result<(), LedgerError> {
    let changed = conn.execute(
        "UPDATE entries SET
            account_id = ?, entry_date = ?, display_order = ?,
            identity1 = ?, site1 = ?, deposit1 = ?, withdraw1 = ?, attended1 = ?,
            identity2 = ?, site2 = ?, deposit2 = ?, withdraw2 = ?, attended2 = ?,
            identity3 = ?, site3 = ?, deposit3 = ?, withdraw3 = ?, attended3 = ?,
            identity4 = ?, site4 = ?, deposit4 = ?, withdraw4 = ?, attended4 = ?,
            annotation = ?, entered_amount = ?, total_amount = ?, rate_amount = ?,
            carried_amount = ?, private_amount = ?, total_charge = ?, margin = ?,
            revision = ?, updated_at = ?
         WHERE id = ?",
        rusqlite::params![
            entry.account_id,
            entry.entry_date.format(DATE_FORMAT).to_string(),
            entry.display_order,
            entry.slots[0].identity,
            entry.slots[0].site,
            entry.slots[0].deposit_amount,
            entry.slots[0].withdraw_amount,
            entry.slots[0].attended as i64,
            entry.slots[1].identity,
            entry.slots[1].site,
            entry.slots[1].deposit_amount,
            entry.slots[1].withdraw_amount,
            entry.slots[1].attended as i64,
            entry.slots[2].identity,
            entry.slots[2].site,
            entry.slots[2].deposit_amount,
            entry.slots[2].withdraw_amount,
            entry.slots[2].attended as i64,
            entry.slots[3].identity,
            entry.slots[3].site,
            entry.slots[3].deposit_amount,
            entry.slots[3].withdraw_amount,
            entry.slots[3].attended as i64,
            entry.annotation,
            entry.entered_amount,
            entry.total_amount,
            entry.rate_amount,
            entry.carried_amount,
            entry.private_amount,
            entry.total_charge,
            entry.margin,
            entry.revision as i64,
            entry.updated_at,
            entry.id,
        ],
    )?;
    if changed == 0 {
        return Err(LedgerError::NotFound(entry.id.clone()));
    }
    Ok(())
}

pub fn delete_entry(conn: &Connection, id: &str) -> Result<(), LedgerError> {
    let changed = conn.execute("DELETE FROM entries WHERE id = ?", [id])?;
    if changed == 0 {
        return Err(LedgerError::NotFound(id.to_string()));
    }
    Ok(())
}

/// Current revision of an entry, if it exists.
pub fn current_revision(conn: &Connection, id: &str) -> Result<Option<u64>, LedgerError> {
    let revision: Option<i64> = conn
        .query_row("SELECT revision FROM entries WHERE id = ?", [id], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(revision.map(|r| r as u64))
}

/// Record the store's acknowledgement: swap a temporary id for the
/// durable one and remember the acked revision.
pub fn apply_save_ack(
    conn: &Connection,
    old_id: &str,
    new_id: &str,
    acked_revision: u64,
) -> Result<(), LedgerError> {
    conn.execute(
        "UPDATE entries SET id = ?, acked_revision = ? WHERE id = ?",
        params![new_id, acked_revision as i64, old_id],
    )?;
    Ok(())
}

pub fn set_display_order(
    conn: &Connection,
    account_id: i64,
    id: &str,
    display_order: i64,
) -> Result<(), LedgerError> {
    conn.execute(
        "UPDATE entries SET display_order = ? WHERE id = ? AND account_id = ?",
        params![display_order, id, account_id],
    )?;
    Ok(())
}

/// Drop every local row of one journal (used by full reloads).
pub fn delete_journal(
    conn: &Connection,
    account_id: i64,
    date: NaiveDate,
) -> Result<usize, LedgerError> {
    let deleted = conn.execute(
        "DELETE FROM entries WHERE account_id = ? AND entry_date = ?",
        params![account_id, date.format(DATE_FORMAT).to_string()],
    )?;
    Ok(deleted)
}

/// Next free display_order for a journal (dense, starts at 0).
pub fn next_display_order(
    conn: &Connection,
    account_id: i64,
    date: NaiveDate,
) -> Result<i64, LedgerError> {
    let max: Option<i64> = conn.query_row(
        "SELECT MAX(display_order) FROM entries WHERE account_id = ? AND entry_date = ?",
        params![account_id, date.format(DATE_FORMAT).to_string()],
        |row| row.get(0),
    )?;
    Ok(max.map_or(0, |m| m + 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample_entry(order: i64) -> Entry {
        let mut entry = Entry::new_local(1, date(2025, 3, 10), order);
        entry.slots[0] = Slot {
            identity: "김철수".into(),
            site: "로로벳".into(),
            deposit_amount: 100_000,
            withdraw_amount: 30_000,
            attended: true,
        };
        entry.annotation = "10충".into();
        entry.total_amount = 500_000;
        entry
    }

    #[test]
    fn insert_and_fetch_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.conn.lock().unwrap();

        let entry = sample_entry(0);
        insert_entry(&conn, &entry).unwrap();

        let fetched = fetch_entry(&conn, &entry.id).unwrap();
        assert_eq!(fetched, entry);
    }

    #[test]
    fn journal_comes_back_ordered() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.conn.lock().unwrap();

        let mut a = sample_entry(1);
        a.id = "a".into();
        let mut b = sample_entry(0);
        b.id = "b".into();
        insert_entry(&conn, &a).unwrap();
        insert_entry(&conn, &b).unwrap();

        let journal = fetch_journal(&conn, 1, date(2025, 3, 10)).unwrap();
        let ids: Vec<&str> = journal.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn update_rejects_unknown_id() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.conn.lock().unwrap();

        let entry = sample_entry(0);
        let err = update_entry(&conn, &entry).unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }

    #[test]
    fn ack_swaps_temporary_id() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.conn.lock().unwrap();

        let mut entry = sample_entry(0);
        entry.revision = 3;
        insert_entry(&conn, &entry).unwrap();
        assert!(!entry.is_persisted());

        apply_save_ack(&conn, &entry.id, "77", 3).unwrap();
        let fetched = fetch_entry(&conn, "77").unwrap();
        assert!(fetched.is_persisted());
        assert_eq!(current_revision(&conn, "77").unwrap(), Some(3));
    }

    #[test]
    fn next_display_order_is_dense() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.conn.lock().unwrap();

        assert_eq!(next_display_order(&conn, 1, date(2025, 3, 10)).unwrap(), 0);
        insert_entry(&conn, &sample_entry(0)).unwrap();
        insert_entry(&conn, &sample_entry(1)).unwrap();
        assert_eq!(next_display_order(&conn, 1, date(2025, 3, 10)).unwrap(), 2);
    }
}
