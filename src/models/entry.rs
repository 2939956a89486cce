use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Number of site slots on a ledger row.
pub const SLOT_COUNT: usize = 4;

/// One site assignment within an entry: who deposited what, where.
///
/// Amounts are in base currency units (KRW). A slot is blank when both
/// identity and site are empty strings; `attended` is only meaningful
/// while `deposit_amount > 0`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub identity: String,
    pub site: String,
    pub deposit_amount: i64,
    pub withdraw_amount: i64,
    pub attended: bool,
}

impl Slot {
    pub fn is_blank(&self) -> bool {
        self.identity.is_empty() && self.site.is_empty()
    }

    /// The (identity, site) pair, if both are filled in.
    pub fn pair(&self) -> Option<(&str, &str)> {
        if self.identity.is_empty() || self.site.is_empty() {
            None
        } else {
            Some((self.identity.as_str(), self.site.as_str()))
        }
    }
}

/// One ledger row.
///
/// `carried_amount`, `private_amount`, `total_charge` and `margin` are
/// derived by the cascade engine; everything else is user input. The
/// `revision` counter increases on every local mutation and is compared
/// against async responses to discard stale ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    pub account_id: i64,
    pub entry_date: NaiveDate,
    pub display_order: i64,

    pub slots: [Slot; SLOT_COUNT],
    pub annotation: String,

    pub entered_amount: i64,
    pub total_amount: i64,
    pub rate_amount: i64,

    pub carried_amount: i64,
    pub private_amount: i64,
    pub total_charge: i64,
    pub margin: i64,

    pub revision: u64,
    pub created_at: i64,
    pub updated_at: i64,
}

const LOCAL_ID_PREFIX: &str = "tmp-";

impl Entry {
    /// Fresh, empty row with a temporary client id. The authoritative
    /// store assigns the durable id on first persist.
    pub fn new_local(account_id: i64, entry_date: NaiveDate, display_order: i64) -> Self {
        let now = chrono::Utc::now().timestamp();
        Entry {
            id: format!("{}{}", LOCAL_ID_PREFIX, Uuid::new_v4()),
            account_id,
            entry_date,
            display_order,
            slots: Default::default(),
            annotation: String::new(),
            entered_amount: 0,
            total_amount: 0,
            rate_amount: 0,
            carried_amount: 0,
            private_amount: 0,
            total_charge: 0,
            margin: 0,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_persisted(&self) -> bool {
        !self.id.starts_with(LOCAL_ID_PREFIX)
    }

    pub fn bump_revision(&mut self) {
        self.revision += 1;
        self.updated_at = chrono::Utc::now().timestamp();
    }

    /// Sum of withdrawals across all four slots.
    pub fn slot_withdraw_total(&self) -> i64 {
        self.slots.iter().map(|s| s.withdraw_amount).sum()
    }

    /// Sum of deposits across all four slots.
    pub fn slot_deposit_total(&self) -> i64 {
        self.slots.iter().map(|s| s.deposit_amount).sum()
    }
}

/// Input for creating a new entry (derived fields are computed, not taken).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateEntryInput {
    pub slots: [Slot; SLOT_COUNT],
    pub annotation: String,
    pub entered_amount: i64,
    pub total_amount: i64,
    pub rate_amount: i64,
}

/// Partial update for an existing entry. `None` leaves the field as-is.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntryUpdate {
    pub slots: Option<[Slot; SLOT_COUNT]>,
    pub annotation: Option<String>,
    pub entered_amount: Option<i64>,
    pub total_amount: Option<i64>,
    pub rate_amount: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_ids_are_temporary_until_persisted() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let mut entry = Entry::new_local(1, date, 0);
        assert!(!entry.is_persisted());

        entry.id = "42".to_string();
        assert!(entry.is_persisted());
    }

    #[test]
    fn bump_revision_is_monotonic() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let mut entry = Entry::new_local(1, date, 0);
        let before = entry.revision;
        entry.bump_revision();
        entry.bump_revision();
        assert_eq!(entry.revision, before + 2);
    }

    #[test]
    fn blank_slot_has_no_pair() {
        let slot = Slot::default();
        assert!(slot.is_blank());
        assert_eq!(slot.pair(), None);

        let filled = Slot {
            identity: "김철수".into(),
            site: "로로벳".into(),
            deposit_amount: 100_000,
            ..Default::default()
        };
        assert_eq!(filled.pair(), Some(("김철수", "로로벳")));
    }
}
