//! Reconciliation between the optimistic local store and the
//! authoritative remote.
//!
//! Local mutations are already committed by the time a save reaches this
//! layer; the remote persist runs after the fact. Three protections keep
//! the two stores from diverging badly:
//!
//! - at most one in-flight save per entry key; a second request for the
//!   same key is dropped, not queued
//! - an acknowledgement carrying a revision older than the entry's
//!   current one is discarded (out-of-order network responses)
//! - attendance stats are polled with bounded, growing retries; on
//!   exhaustion the last locally-known value is kept rather than
//!   surfacing an error, because the server recomputes attendance
//!   asynchronously and may simply not be done yet

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::api::{RemoteStore, SaveAck, StatResult};
use crate::cache::{CacheKey, MetadataCache};
use crate::db::{entries, Database};
use crate::error::LedgerError;
use crate::models::{AttendanceStats, Entry};

/// Bounded retry with growing delay.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub growth: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(400),
            growth: 2,
        }
    }
}

/// Attendance stats stay fresh for this long before a poll re-reads them.
const STATS_TTL: Duration = Duration::from_secs(60);

pub struct SyncReconciler {
    remote: Arc<dyn RemoteStore>,
    retry: RetryPolicy,
    in_flight: Mutex<HashSet<String>>,
    stats_cache: MetadataCache<AttendanceStats>,
}

impl SyncReconciler {
    pub fn new(remote: Arc<dyn RemoteStore>) -> Self {
        Self::with_retry(remote, RetryPolicy::default())
    }

    pub fn with_retry(remote: Arc<dyn RemoteStore>, retry: RetryPolicy) -> Self {
        SyncReconciler {
            remote,
            retry,
            in_flight: Mutex::new(HashSet::new()),
            stats_cache: MetadataCache::new(STATS_TTL),
        }
    }

    /// Persist one entry to the authoritative store.
    ///
    /// Returns `Ok(false)` when a save for the same key is already in
    /// flight (the new request is dropped; the outstanding one's result
    /// will apply). Remote failures are returned but leave the local
    /// optimistic value untouched.
    pub async fn save_entry(&self, db: &Database, entry: Entry) -> Result<bool, LedgerError> {
        let key = entry.id.clone();
        if !self.begin_flight(&key) {
            log::debug!("save for {} already in flight, dropping request", key);
            return Ok(false);
        }

        let result = self.push_entry(db, &entry).await;
        self.end_flight(&key);

        result.map(|_| true)
    }

    async fn push_entry(&self, db: &Database, entry: &Entry) -> Result<(), LedgerError> {
        let ack = if entry.is_persisted() {
            self.remote.update_entry(entry).await?
        } else {
            self.remote.create_entry(entry).await?
        };
        self.apply_ack(db, &entry.id, ack)
    }

    /// Apply a save acknowledgement unless a newer local revision has
    /// landed since the request went out.
    fn apply_ack(&self, db: &Database, old_id: &str, ack: SaveAck) -> Result<(), LedgerError> {
        let conn = db
            .conn
            .lock()
            .map_err(|e| LedgerError::Database(e.to_string()))?;

        let Some(current) = entries::current_revision(&conn, old_id)? else {
            // entry deleted while the save was in flight
            log::debug!("ack for {} ignored, entry is gone", old_id);
            return Ok(());
        };
        if ack.revision < current {
            log::debug!(
                "stale ack for {} discarded (acked {} < current {})",
                old_id,
                ack.revision,
                current
            );
            return Ok(());
        }

        entries::apply_save_ack(&conn, old_id, &ack.id, ack.revision)
    }

    fn begin_flight(&self, key: &str) -> bool {
        match self.in_flight.lock() {
            Ok(mut set) => set.insert(key.to_string()),
            Err(_) => false,
        }
    }

    fn end_flight(&self, key: &str) {
        if let Ok(mut set) = self.in_flight.lock() {
            set.remove(key);
        }
    }

    /// Attendance stats for a list of pairs, polled with bounded
    /// retries. Never fails: on exhaustion the last known (possibly
    /// zero) values come back instead.
    pub async fn attendance_stats(
        &self,
        account_id: i64,
        pairs: &[(String, String)],
    ) -> Vec<AttendanceStats> {
        // fresh cache hits for every pair: skip the network entirely
        let cached: Vec<Option<AttendanceStats>> = pairs
            .iter()
            .map(|(site, identity)| {
                self.stats_cache
                    .get(&CacheKey::for_identity(site.clone(), identity.clone()))
            })
            .collect();
        if cached.iter().all(|c| c.is_some()) {
            return cached.into_iter().flatten().collect();
        }

        let mut delay = self.retry.base_delay;
        for attempt in 1..=self.retry.max_attempts {
            match self.remote.batch_attendance_stats(account_id, pairs).await {
                Ok(stats) => return self.absorb_stats(pairs, stats),
                Err(e) => {
                    log::warn!(
                        "attendance batch read failed (attempt {}/{}): {}",
                        attempt,
                        self.retry.max_attempts,
                        e
                    );
                    if attempt < self.retry.max_attempts {
                        tokio::time::sleep(delay).await;
                        delay *= self.retry.growth;
                    }
                }
            }
        }

        log::warn!("attendance batch read exhausted retries, keeping last known values");
        pairs
            .iter()
            .map(|(site, identity)| {
                self.stats_cache
                    .get_stale(&CacheKey::for_identity(site.clone(), identity.clone()))
                    .unwrap_or_default()
            })
            .collect()
    }

    /// Fold a batch response into the cache, falling back to the last
    /// known value for items that came back with a per-item error.
    fn absorb_stats(
        &self,
        pairs: &[(String, String)],
        stats: Vec<StatResult>,
    ) -> Vec<AttendanceStats> {
        pairs
            .iter()
            .map(|(site, identity)| {
                let key = CacheKey::for_identity(site.clone(), identity.clone());
                let item = stats
                    .iter()
                    .find(|s| s.site == *site && s.identity == *identity);

                match item {
                    Some(item) if item.error.is_none() => {
                        let value = AttendanceStats {
                            consecutive_days: item.consecutive_days.unwrap_or(0),
                            total_days: item.total_days.unwrap_or(0),
                        };
                        self.stats_cache.insert(key, value);
                        value
                    }
                    _ => {
                        if let Some(item) = item {
                            log::warn!(
                                "attendance stats for {}/{} errored: {:?}",
                                identity,
                                site,
                                item.error
                            );
                        }
                        self.stats_cache.get_stale(&key).unwrap_or_default()
                    }
                }
            })
            .collect()
    }

    /// Invalidate the cached stats for one pair (called after an edit
    /// that changes its attendance).
    pub fn invalidate_stats(&self, site: &str, identity: &str) {
        self.stats_cache
            .invalidate(&CacheKey::for_identity(site, identity));
    }

    pub async fn delete_remote(&self, id: &str) -> Result<(), LedgerError> {
        self.remote.delete_entry(id).await?;
        Ok(())
    }

    pub async fn reorder_remote(
        &self,
        account_id: i64,
        date: chrono::NaiveDate,
        orders: &[(String, i64)],
    ) -> Result<(), LedgerError> {
        self.remote.reorder_entries(account_id, date, orders).await?;
        Ok(())
    }

    pub async fn toggle_remote(
        &self,
        account_id: i64,
        site: &str,
        identity: &str,
        date: chrono::NaiveDate,
        desired: Option<bool>,
    ) -> Result<crate::models::ToggleOutcome, LedgerError> {
        let outcome = self
            .remote
            .toggle_attendance(account_id, site, identity, date, desired)
            .await?;
        Ok(outcome)
    }

    pub async fn fetch_remote_journal(
        &self,
        account_id: i64,
        date: chrono::NaiveDate,
    ) -> Result<Vec<Entry>, LedgerError> {
        let journal = self.remote.fetch_journal(account_id, date).await?;
        Ok(journal)
    }
}
