//! Daily ledger cascade.
//!
//! Each row's carried amount is seeded from the previous row's entered
//! total, withdrawals and rate, then adjusted by the annotation's
//! charge/withdraw totals. Editing any row therefore invalidates every
//! row after it, and recomputation is strictly left-to-right: a step's
//! persisted output is required before the next step may run.

use crate::codec;
use crate::error::LedgerError;
use crate::models::Entry;

/// The four derived fields of a ledger row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Derived {
    pub carried_amount: i64,
    pub private_amount: i64,
    pub total_charge: i64,
    pub margin: i64,
}

/// Persistence hook the cascade drives. One call per recomputed entry,
/// in order; returning an error aborts the cascade at that entry.
pub trait CascadeSink {
    fn persist(&mut self, entry: &Entry) -> Result<(), LedgerError>;
}

/// Recompute one entry's derived fields from its own inputs and the
/// previous entry. `previous == None` means the first row of the
/// journal, which seeds its carry from `entered_amount` instead.
pub fn recompute(entry: &Entry, previous: Option<&Entry>) -> Derived {
    let totals = codec::charge_withdraw_totals(&entry.annotation);
    let private_amount = entry.slot_deposit_total();

    let carried_amount = match previous {
        None => entry.entered_amount + totals.charge - totals.withdraw,
        Some(prev) => {
            prev.total_amount - prev.slot_withdraw_total() + prev.rate_amount + totals.charge
                - totals.withdraw
        }
    };

    let total_charge = carried_amount + private_amount;
    let margin = if entry.total_amount == 0 {
        0
    } else {
        entry.total_amount - total_charge
    };

    Derived {
        carried_amount,
        private_amount,
        total_charge,
        margin,
    }
}

fn apply(entry: &mut Entry, derived: Derived) {
    entry.carried_amount = derived.carried_amount;
    entry.private_amount = derived.private_amount;
    entry.total_charge = derived.total_charge;
    entry.margin = derived.margin;
}

/// Recompute entries `index..` in order, persisting each through `sink`
/// before moving on. A persist failure aborts the cascade: entries after
/// the failed one keep their stale values and the caller must reload.
///
/// Returns the number of entries recomputed.
pub fn cascade_from(
    journal: &mut [Entry],
    index: usize,
    sink: &mut dyn CascadeSink,
) -> Result<usize, LedgerError> {
    if index >= journal.len() {
        return Ok(0);
    }

    for i in index..journal.len() {
        let derived = {
            let previous = if i == 0 { None } else { Some(&journal[i - 1]) };
            recompute(&journal[i], previous)
        };

        let entry = &mut journal[i];
        apply(entry, derived);
        entry.bump_revision();

        if let Err(err) = sink.persist(entry) {
            log::error!(
                "cascade aborted at index {} (entry {}): {}",
                i,
                entry.id,
                err
            );
            return Err(LedgerError::CascadeAbort {
                index: i,
                source: Box::new(err),
            });
        }
    }

    Ok(journal.len() - index)
}

/// Position of one slot within a journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRef {
    pub entry: usize,
    pub slot: usize,
}

/// Swap two slots (same or different entries) and cascade from the
/// first affected row. The swap is two coordinated edits: both entries
/// are recomputed and persisted as part of the cascade.
pub fn swap_slots(
    journal: &mut [Entry],
    a: SlotRef,
    b: SlotRef,
    sink: &mut dyn CascadeSink,
) -> Result<usize, LedgerError> {
    let valid = |r: SlotRef| r.entry < journal.len() && r.slot < crate::models::SLOT_COUNT;
    if !valid(a) || !valid(b) {
        return Err(LedgerError::Validation(format!(
            "slot swap out of range: {:?} <-> {:?}",
            a, b
        )));
    }

    if a.entry == b.entry {
        journal[a.entry].slots.swap(a.slot, b.slot);
    } else {
        let (lo, hi) = if a.entry < b.entry { (a, b) } else { (b, a) };
        let (left, right) = journal.split_at_mut(hi.entry);
        std::mem::swap(
            &mut left[lo.entry].slots[lo.slot],
            &mut right[0].slots[hi.slot],
        );
    }

    cascade_from(journal, a.entry.min(b.entry), sink)
}

/// Sum of margin + rate across the journal, recomputed left-to-right.
/// Consumed by the daily settlement summary.
pub fn margin_sum(journal: &[Entry]) -> i64 {
    let mut sum = 0;
    for (i, entry) in journal.iter().enumerate() {
        let previous = if i == 0 { None } else { Some(&journal[i - 1]) };
        let derived = recompute(entry, previous);
        sum += derived.margin + entry.rate_amount;
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn entry(order: i64) -> Entry {
        Entry::new_local(1, NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(), order)
    }

    /// Sink that remembers persisted ids and can be told to fail.
    #[derive(Default)]
    struct RecordingSink {
        persisted: Vec<String>,
        fail_at: Option<usize>,
    }

    impl CascadeSink for RecordingSink {
        fn persist(&mut self, entry: &Entry) -> Result<(), LedgerError> {
            if self.fail_at == Some(self.persisted.len()) {
                return Err(LedgerError::Database("disk full".into()));
            }
            self.persisted.push(entry.id.clone());
            Ok(())
        }
    }

    #[test]
    fn first_row_seeds_carry_from_entered_amount_and_annotation() {
        let mut e = entry(0);
        e.entered_amount = 0;
        e.annotation = "사이트10충".to_string();

        let derived = recompute(&e, None);
        assert_eq!(derived.carried_amount, 100_000);
        assert_eq!(derived.total_charge, 100_000);
        assert_eq!(derived.margin, 0); // total_amount unset
    }

    #[test]
    fn chained_carry_uses_previous_totals_and_withdrawals() {
        let mut first = entry(0);
        first.total_amount = 500_000;
        first.rate_amount = 0;
        first.slots[0].identity = "김철수".into();
        first.slots[0].site = "로로벳".into();
        first.slots[0].withdraw_amount = 50_000;

        let second = entry(1);

        let derived = recompute(&second, Some(&first));
        assert_eq!(derived.carried_amount, 450_000);
    }

    #[test]
    fn margin_requires_entered_total() {
        let mut first = entry(0);
        first.entered_amount = 300_000;
        first.slots[0].deposit_amount = 100_000;

        let without_total = recompute(&first, None);
        assert_eq!(without_total.margin, 0);

        first.total_amount = 500_000;
        let with_total = recompute(&first, None);
        assert_eq!(with_total.private_amount, 100_000);
        assert_eq!(with_total.total_charge, 400_000);
        assert_eq!(with_total.margin, 100_000);
    }

    #[test]
    fn cascade_is_deterministic() {
        let mut journal = vec![entry(0), entry(1), entry(2)];
        journal[0].entered_amount = 200_000;
        journal[0].total_amount = 250_000;
        journal[1].annotation = "5충".to_string();
        journal[1].total_amount = 300_000;
        journal[2].total_amount = 310_000;

        let mut sink = RecordingSink::default();
        cascade_from(&mut journal, 0, &mut sink).unwrap();
        let first_pass: Vec<i64> = journal.iter().map(|e| e.carried_amount).collect();
        let margins: Vec<i64> = journal.iter().map(|e| e.margin).collect();

        cascade_from(&mut journal, 0, &mut sink).unwrap();
        let second_pass: Vec<i64> = journal.iter().map(|e| e.carried_amount).collect();

        assert_eq!(first_pass, second_pass);
        assert_eq!(first_pass, vec![200_000, 300_000, 300_000]);
        assert_eq!(margins, vec![50_000, 0, 10_000]);
    }

    #[test]
    fn cascade_persists_in_order_and_bumps_revisions() {
        let mut journal = vec![entry(0), entry(1), entry(2)];
        let ids: Vec<String> = journal.iter().map(|e| e.id.clone()).collect();

        let mut sink = RecordingSink::default();
        let recomputed = cascade_from(&mut journal, 1, &mut sink).unwrap();

        assert_eq!(recomputed, 2);
        assert_eq!(sink.persisted, ids[1..]);
        assert_eq!(journal[0].revision, 0);
        assert_eq!(journal[1].revision, 1);
        assert_eq!(journal[2].revision, 1);
    }

    #[test]
    fn persist_failure_aborts_and_leaves_downstream_stale() {
        let mut journal = vec![entry(0), entry(1), entry(2)];
        journal[0].entered_amount = 100_000;
        let stale_carry = journal[2].carried_amount;

        let mut sink = RecordingSink {
            fail_at: Some(1),
            ..Default::default()
        };
        let err = cascade_from(&mut journal, 0, &mut sink).unwrap_err();

        match err {
            LedgerError::CascadeAbort { index, .. } => assert_eq!(index, 1),
            other => panic!("unexpected error: {other}"),
        }
        // entry 2 was never recomputed or persisted
        assert_eq!(sink.persisted.len(), 1);
        assert_eq!(journal[2].carried_amount, stale_carry);
        assert_eq!(journal[2].revision, 0);
    }

    #[test]
    fn swap_slots_across_entries_cascades_from_first_affected() {
        let mut journal = vec![entry(0), entry(1)];
        journal[0].slots[0].identity = "김철수".into();
        journal[0].slots[0].site = "로로벳".into();
        journal[0].slots[0].withdraw_amount = 50_000;
        journal[0].total_amount = 500_000;

        let mut sink = RecordingSink::default();
        swap_slots(
            &mut journal,
            SlotRef { entry: 0, slot: 0 },
            SlotRef { entry: 1, slot: 2 },
            &mut sink,
        )
        .unwrap();

        assert!(journal[0].slots[0].is_blank());
        assert_eq!(journal[1].slots[2].site, "로로벳");
        // both entries persisted, in order
        assert_eq!(sink.persisted.len(), 2);
        // the withdrawal moved to entry 1, so entry 1's carry no longer
        // subtracts it
        assert_eq!(journal[1].carried_amount, 500_000);
    }

    #[test]
    fn swap_rejects_out_of_range_refs() {
        let mut journal = vec![entry(0)];
        let mut sink = RecordingSink::default();
        let err = swap_slots(
            &mut journal,
            SlotRef { entry: 0, slot: 0 },
            SlotRef { entry: 5, slot: 0 },
            &mut sink,
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[test]
    fn margin_sum_includes_rate_amounts() {
        let mut journal = vec![entry(0), entry(1)];
        journal[0].entered_amount = 100_000;
        journal[0].total_amount = 150_000;
        journal[0].rate_amount = 5_000;
        journal[1].total_amount = 160_000;

        // entry0 margin: 150k - 100k = 50k; entry1 carry: 150k - 0 + 5k,
        // margin: 160k - 155k = 5k
        assert_eq!(margin_sum(&journal), 50_000 + 5_000 + 5_000);
    }
}
