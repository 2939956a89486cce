//! Journal operations: the edit surface the application shell calls
//! into. Every mutation follows the same shape: validate, apply
//! locally, cascade, re-register attendance for the deposits that
//! changed, then hand the rows to the reconciler for the authoritative
//! persist.

use rusqlite::Connection;

use chrono::NaiveDate;

use crate::attendance;
use crate::commands::LedgerContext;
use crate::db::entries;
use crate::error::LedgerError;
use crate::ledger::{self, CascadeSink, SlotRef};
use crate::models::{CreateEntryInput, Entry, EntryUpdate, Slot, SLOT_COUNT};

/// Cascade sink writing straight to the local store.
struct DbSink<'a> {
    conn: &'a Connection,
}

impl CascadeSink for DbSink<'_> {
    fn persist(&mut self, entry: &Entry) -> Result<(), LedgerError> {
        entries::update_entry(self.conn, entry)
    }
}

fn validate_slots(
    slots: &[Slot; SLOT_COUNT],
    ctx: &LedgerContext,
) -> Result<(), LedgerError> {
    for slot in slots {
        if slot.is_blank() {
            continue;
        }
        if !slot.site.is_empty() && !ctx.registry.is_known_site(&slot.site) {
            return Err(LedgerError::Validation(format!(
                "unregistered site: {}",
                slot.site
            )));
        }
        if !slot.identity.is_empty() && !ctx.registry.is_known_identity(&slot.identity) {
            return Err(LedgerError::Validation(format!(
                "unregistered identity: {}",
                slot.identity
            )));
        }
    }
    Ok(())
}

/// Ordered journal for one date, from the local store.
pub async fn get_entries(
    ctx: &LedgerContext,
    date: NaiveDate,
) -> Result<Vec<Entry>, LedgerError> {
    let conn = ctx.lock_conn()?;
    entries::fetch_journal(&conn, ctx.account_id, date)
}

/// Sum of margin + rate for one date's journal.
pub async fn daily_margin(ctx: &LedgerContext, date: NaiveDate) -> Result<i64, LedgerError> {
    let journal = {
        let conn = ctx.lock_conn()?;
        entries::fetch_journal(&conn, ctx.account_id, date)?
    };
    Ok(ledger::margin_sum(&journal))
}

pub async fn create_entry(
    ctx: &LedgerContext,
    date: NaiveDate,
    input: CreateEntryInput,
) -> Result<Entry, LedgerError> {
    validate_slots(&input.slots, ctx)?;

    let mut entry = {
        let conn = ctx.lock_conn()?;
        let order = entries::next_display_order(&conn, ctx.account_id, date)?;
        let mut entry = Entry::new_local(ctx.account_id, date, order);
        entry.slots = input.slots;
        entry.annotation = input.annotation;
        entry.entered_amount = input.entered_amount;
        entry.total_amount = input.total_amount;
        entry.rate_amount = input.rate_amount;
        entries::insert_entry(&conn, &entry)?;
        entry
    };

    let mut journal = cascade_journal(ctx, date, |journal| {
        journal.iter().position(|e| e.id == entry.id).unwrap_or(0)
    })
    .await?;

    let index = journal
        .iter()
        .position(|e| e.id == entry.id)
        .ok_or_else(|| LedgerError::NotFound(entry.id.clone()))?;
    sync_attendance_for_entry(ctx, &journal, index, &Default::default()).await?;

    push_saves(ctx, &journal[index..]).await;

    entry = journal.swap_remove(index);
    Ok(entry)
}

pub async fn update_entry(
    ctx: &LedgerContext,
    id: &str,
    update: EntryUpdate,
) -> Result<Entry, LedgerError> {
    if let Some(slots) = &update.slots {
        validate_slots(slots, ctx)?;
    }

    let (journal, target, old_slots) = {
        let conn = ctx.lock_conn()?;
        let date = entries::fetch_entry(&conn, id)?.entry_date;
        let mut journal = entries::fetch_journal(&conn, ctx.account_id, date)?;
        let target = journal
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| LedgerError::NotFound(id.to_string()))?;

        let entry = &mut journal[target];
        let old_slots = entry.slots.clone();
        if let Some(slots) = update.slots {
            entry.slots = slots;
        }
        if let Some(annotation) = update.annotation {
            entry.annotation = annotation;
        }
        if let Some(entered_amount) = update.entered_amount {
            entry.entered_amount = entered_amount;
        }
        if let Some(total_amount) = update.total_amount {
            entry.total_amount = total_amount;
        }
        if let Some(rate_amount) = update.rate_amount {
            entry.rate_amount = rate_amount;
        }

        let mut sink = DbSink { conn: &*conn };
        ledger::cascade_from(&mut journal, target, &mut sink)?;
        (journal, target, old_slots)
    };

    sync_attendance_for_entry(ctx, &journal, target, &old_slots).await?;
    push_saves(ctx, &journal[target..]).await;

    Ok(journal[target].clone())
}

pub async fn delete_entry(ctx: &LedgerContext, id: &str) -> Result<(), LedgerError> {
    let (removed, journal, index) = {
        let conn = ctx.lock_conn()?;
        let date = entries::fetch_entry(&conn, id)?.entry_date;
        let mut journal = entries::fetch_journal(&conn, ctx.account_id, date)?;
        let index = journal
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| LedgerError::NotFound(id.to_string()))?;

        let removed = journal.remove(index);
        entries::delete_entry(&conn, id)?;

        let mut sink = DbSink { conn: &*conn };
        ledger::cascade_from(&mut journal, index, &mut sink)?;
        (removed, journal, index)
    };

    // Retract the attendance this entry caused. The log row is removed
    // even when a same-day duplicate with a positive deposit survives;
    // that matches the store's delete handling (see DESIGN.md for the
    // open product question around re-attribution).
    for slot in &removed.slots {
        let Some((identity, site)) = slot.pair() else {
            continue;
        };
        let policy = ctx.policies.policy_for(ctx.account_id, site, identity).await;
        attendance::register_automatic(
            &ctx.db,
            &policy,
            ctx.account_id,
            site,
            identity,
            removed.entry_date,
            0,
            true,
        )?;
        ctx.reconciler.invalidate_stats(site, identity);
    }

    if let Err(e) = ctx.reconciler.delete_remote(id).await {
        log::warn!("remote delete for {} failed: {}", id, e);
    }
    push_saves(ctx, &journal[index..]).await;

    Ok(())
}

/// Bulk reorder: list of (id, new display_order). The whole journal is
/// recomputed afterwards since every carry may have moved.
pub async fn reorder_entries(
    ctx: &LedgerContext,
    date: NaiveDate,
    orders: &[(String, i64)],
) -> Result<Vec<Entry>, LedgerError> {
    let journal = {
        let conn = ctx.lock_conn()?;
        for (id, order) in orders {
            entries::set_display_order(&conn, ctx.account_id, id, *order)?;
        }
        let mut journal = entries::fetch_journal(&conn, ctx.account_id, date)?;
        let mut sink = DbSink { conn: &*conn };
        ledger::cascade_from(&mut journal, 0, &mut sink)?;
        journal
    };

    if let Err(e) = ctx.reconciler.reorder_remote(ctx.account_id, date, orders).await {
        log::warn!("remote reorder failed: {}", e);
    }
    push_saves(ctx, &journal).await;

    Ok(journal)
}

/// Swap two slots, possibly across entries. Treated as two coordinated
/// edits: both rows recompute, cascade and re-register attendance.
pub async fn swap_slots(
    ctx: &LedgerContext,
    a: (&str, usize),
    b: (&str, usize),
) -> Result<(), LedgerError> {
    let (journal, index_a, index_b, old_a, old_b) = {
        let conn = ctx.lock_conn()?;
        let date = entries::fetch_entry(&conn, a.0)?.entry_date;
        let mut journal = entries::fetch_journal(&conn, ctx.account_id, date)?;

        let index_a = journal
            .iter()
            .position(|e| e.id == a.0)
            .ok_or_else(|| LedgerError::NotFound(a.0.to_string()))?;
        let index_b = journal
            .iter()
            .position(|e| e.id == b.0)
            .ok_or_else(|| LedgerError::NotFound(b.0.to_string()))?;

        let old_a = journal[index_a].slots.clone();
        let old_b = journal[index_b].slots.clone();

        let mut sink = DbSink { conn: &*conn };
        ledger::swap_slots(
            &mut journal,
            SlotRef {
                entry: index_a,
                slot: a.1,
            },
            SlotRef {
                entry: index_b,
                slot: b.1,
            },
            &mut sink,
        )?;
        (journal, index_a, index_b, old_a, old_b)
    };

    // Retract both rows' vacated pairs before registering the current
    // ones, otherwise a pair moving from one row to the other could be
    // retracted right after its new row re-registered it.
    retract_vacated_pairs(ctx, &journal, index_a, &old_a).await?;
    if index_b != index_a {
        retract_vacated_pairs(ctx, &journal, index_b, &old_b).await?;
    }
    register_current_pairs(ctx, &journal, index_a, &old_a).await?;
    if index_b != index_a {
        register_current_pairs(ctx, &journal, index_b, &old_b).await?;
    }

    let start = index_a.min(index_b);
    push_saves(ctx, &journal[start..]).await;

    Ok(())
}

/// Row-copy: duplicate an entry to the end of its journal. Copied
/// deposits register no attendance of their own; they are recharges of
/// the source row.
pub async fn duplicate_entry(ctx: &LedgerContext, id: &str) -> Result<Entry, LedgerError> {
    let copy = {
        let conn = ctx.lock_conn()?;
        let source = entries::fetch_entry(&conn, id)?;
        let order = entries::next_display_order(&conn, ctx.account_id, source.entry_date)?;

        let mut copy = Entry::new_local(ctx.account_id, source.entry_date, order);
        copy.slots = source.slots.clone();
        copy.annotation = source.annotation.clone();
        copy.entered_amount = source.entered_amount;
        copy.total_amount = source.total_amount;
        copy.rate_amount = source.rate_amount;
        entries::insert_entry(&conn, &copy)?;
        copy
    };

    let journal = cascade_journal(ctx, copy.entry_date, |journal| {
        journal.iter().position(|e| e.id == copy.id).unwrap_or(0)
    })
    .await?;

    let index = journal
        .iter()
        .position(|e| e.id == copy.id)
        .ok_or_else(|| LedgerError::NotFound(copy.id.clone()))?;
    sync_attendance_for_entry(ctx, &journal, index, &Default::default()).await?;
    push_saves(ctx, &journal[index..]).await;

    Ok(journal[index].clone())
}

/// Throw away the local journal and re-read it from the authoritative
/// store. The recovery path after a cascade abort or a cross-session
/// change notification.
pub async fn reload_journal(
    ctx: &LedgerContext,
    date: NaiveDate,
) -> Result<Vec<Entry>, LedgerError> {
    let fetched = ctx
        .reconciler
        .fetch_remote_journal(ctx.account_id, date)
        .await?;

    let conn = ctx.lock_conn()?;
    entries::delete_journal(&conn, ctx.account_id, date)?;
    for entry in &fetched {
        entries::insert_entry(&conn, entry)?;
    }
    log::info!(
        "journal {} reloaded from remote ({} entries)",
        date,
        fetched.len()
    );
    Ok(fetched)
}

/// Fetch + cascade under one lock. `pick_index` chooses the cascade
/// start from the freshly loaded journal.
async fn cascade_journal(
    ctx: &LedgerContext,
    date: NaiveDate,
    pick_index: impl Fn(&[Entry]) -> usize,
) -> Result<Vec<Entry>, LedgerError> {
    let conn = ctx.lock_conn()?;
    let mut journal = entries::fetch_journal(&conn, ctx.account_id, date)?;
    let index = pick_index(&journal);
    let mut sink = DbSink { conn: &*conn };
    ledger::cascade_from(&mut journal, index, &mut sink)?;
    Ok(journal)
}

/// Re-register attendance for every slot of one entry whose pair or
/// deposit changed relative to `old_slots`.
async fn sync_attendance_for_entry(
    ctx: &LedgerContext,
    journal: &[Entry],
    index: usize,
    old_slots: &[Slot; SLOT_COUNT],
) -> Result<(), LedgerError> {
    retract_vacated_pairs(ctx, journal, index, old_slots).await?;
    register_current_pairs(ctx, journal, index, old_slots).await
}

/// Pairs that were on the entry before the edit but are gone now lose
/// their log row for the day.
async fn retract_vacated_pairs(
    ctx: &LedgerContext,
    journal: &[Entry],
    index: usize,
    old_slots: &[Slot; SLOT_COUNT],
) -> Result<(), LedgerError> {
    let entry = &journal[index];
    let date = entry.entry_date;

    for i in 0..SLOT_COUNT {
        let old = &old_slots[i];
        let Some((identity, site)) = old.pair() else {
            continue;
        };
        if Some((identity, site)) == entry.slots[i].pair() {
            continue;
        }
        let policy = ctx.policies.policy_for(ctx.account_id, site, identity).await;
        attendance::register_automatic(
            &ctx.db,
            &policy,
            ctx.account_id,
            site,
            identity,
            date,
            0,
            true,
        )?;
        ctx.reconciler.invalidate_stats(site, identity);
    }

    Ok(())
}

/// Pairs on the entry now, whose pair or deposit changed, are
/// (re-)registered under the recharge rule.
async fn register_current_pairs(
    ctx: &LedgerContext,
    journal: &[Entry],
    index: usize,
    old_slots: &[Slot; SLOT_COUNT],
) -> Result<(), LedgerError> {
    let entry = &journal[index];
    let date = entry.entry_date;

    for i in 0..SLOT_COUNT {
        let old = &old_slots[i];
        let new = &entry.slots[i];
        let Some((identity, site)) = new.pair() else {
            continue;
        };
        let deposit_changed = old.deposit_amount != new.deposit_amount;
        if old.pair() == new.pair() && !deposit_changed {
            continue;
        }

        let policy = ctx.policies.policy_for(ctx.account_id, site, identity).await;
        let first_slot = !attendance::is_recharge(journal, index, i);
        attendance::register_automatic(
            &ctx.db,
            &policy,
            ctx.account_id,
            site,
            identity,
            date,
            new.deposit_amount,
            first_slot,
        )?;
        ctx.reconciler.invalidate_stats(site, identity);
    }

    Ok(())
}

/// Hand recomputed rows to the reconciler. Remote failures only warn;
/// the optimistic local state already holds.
async fn push_saves(ctx: &LedgerContext, entries: &[Entry]) {
    for entry in entries {
        match ctx.reconciler.save_entry(&ctx.db, entry.clone()).await {
            Ok(true) => {}
            Ok(false) => log::debug!("save for {} dropped, one already in flight", entry.id),
            Err(e) => log::warn!("remote save for {} failed: {}", entry.id, e),
        }
    }
}
