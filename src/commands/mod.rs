pub mod attendance;
pub mod entries;
pub mod policies;

use std::sync::{Arc, MutexGuard};

use rusqlite::Connection;

use crate::api::{RemoteStore, SiteMetadata};
use crate::db::Database;
use crate::error::LedgerError;
use crate::sync::SyncReconciler;

pub use policies::{PolicyService, RegistrySnapshot};

/// Everything the edit surface needs: the local store, the registry
/// snapshot used for validation, the policy lookup and the reconciler
/// that talks to the authoritative store.
pub struct LedgerContext {
    pub db: Database,
    pub account_id: i64,
    pub registry: RegistrySnapshot,
    pub policies: PolicyService,
    pub reconciler: SyncReconciler,
    metadata: Arc<dyn SiteMetadata>,
}

impl LedgerContext {
    pub async fn new(
        db: Database,
        account_id: i64,
        metadata: Arc<dyn SiteMetadata>,
        remote: Arc<dyn RemoteStore>,
    ) -> Result<Self, LedgerError> {
        let registry = RegistrySnapshot::load(metadata.as_ref(), account_id).await?;
        Ok(LedgerContext {
            db,
            account_id,
            registry,
            policies: PolicyService::new(metadata.clone()),
            reconciler: SyncReconciler::new(remote),
            metadata,
        })
    }

    pub fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>, LedgerError> {
        self.db
            .conn
            .lock()
            .map_err(|e| LedgerError::Database(e.to_string()))
    }

    /// Re-read the site/identity registry (after the metadata
    /// collaborator reports changes).
    pub async fn refresh_registry(&mut self) -> Result<(), LedgerError> {
        self.registry = RegistrySnapshot::load(self.metadata.as_ref(), self.account_id).await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::NaiveDate;

    use crate::api::{ApiError, RemoteStore, SaveAck, SiteMetadata, StatResult};
    use crate::models::{AttendancePolicy, Entry, ToggleAction, ToggleOutcome};

    /// Fake back-office server: answers every call from memory.
    pub struct InMemoryRemote {
        pub sites: Vec<String>,
        pub identities: Vec<String>,
        pub policies: Mutex<HashMap<(String, String), AttendancePolicy>>,
        pub saved: Mutex<Vec<String>>,
        next_id: AtomicI64,
    }

    impl InMemoryRemote {
        pub fn new(sites: &[&str], identities: &[&str]) -> Self {
            InMemoryRemote {
                sites: sites.iter().map(|s| s.to_string()).collect(),
                identities: identities.iter().map(|s| s.to_string()).collect(),
                policies: Mutex::new(HashMap::new()),
                saved: Mutex::new(Vec::new()),
                next_id: AtomicI64::new(100),
            }
        }

        pub fn set_policy(&self, site: &str, identity: &str, policy: AttendancePolicy) {
            self.policies
                .lock()
                .unwrap()
                .insert((site.to_string(), identity.to_string()), policy);
        }
    }

    #[async_trait]
    impl RemoteStore for InMemoryRemote {
        async fn fetch_journal(
            &self,
            _account_id: i64,
            _date: NaiveDate,
        ) -> Result<Vec<Entry>, ApiError> {
            Ok(vec![])
        }

        async fn create_entry(&self, entry: &Entry) -> Result<SaveAck, ApiError> {
            self.saved.lock().unwrap().push(entry.id.clone());
            Ok(SaveAck {
                id: self.next_id.fetch_add(1, Ordering::SeqCst).to_string(),
                revision: entry.revision,
            })
        }

        async fn update_entry(&self, entry: &Entry) -> Result<SaveAck, ApiError> {
            self.saved.lock().unwrap().push(entry.id.clone());
            Ok(SaveAck {
                id: entry.id.clone(),
                revision: entry.revision,
            })
        }

        async fn reorder_entries(
            &self,
            _account_id: i64,
            _date: NaiveDate,
            _orders: &[(String, i64)],
        ) -> Result<(), ApiError> {
            Ok(())
        }

        async fn delete_entry(&self, _id: &str) -> Result<(), ApiError> {
            Ok(())
        }

        async fn toggle_attendance(
            &self,
            _account_id: i64,
            _site: &str,
            _identity: &str,
            _date: NaiveDate,
            desired: Option<bool>,
        ) -> Result<ToggleOutcome, ApiError> {
            Ok(ToggleOutcome {
                consecutive_days: 1,
                total_days: 1,
                action: match desired {
                    Some(false) => ToggleAction::Removed,
                    _ => ToggleAction::Added,
                },
            })
        }

        async fn batch_attendance_stats(
            &self,
            _account_id: i64,
            pairs: &[(String, String)],
        ) -> Result<Vec<StatResult>, ApiError> {
            Ok(pairs
                .iter()
                .map(|(site, identity)| StatResult {
                    site: site.clone(),
                    identity: identity.clone(),
                    consecutive_days: Some(0),
                    total_days: Some(0),
                    error: None,
                })
                .collect())
        }
    }

    #[async_trait]
    impl SiteMetadata for InMemoryRemote {
        async fn site_names(&self, _account_id: i64) -> Result<Vec<String>, ApiError> {
            Ok(self.sites.clone())
        }

        async fn identity_names(&self, _account_id: i64) -> Result<Vec<String>, ApiError> {
            Ok(self.identities.clone())
        }

        async fn attendance_policy(
            &self,
            _account_id: i64,
            site: &str,
            identity: Option<&str>,
        ) -> Result<AttendancePolicy, ApiError> {
            let policies = self.policies.lock().unwrap();
            Ok(identity
                .and_then(|i| policies.get(&(site.to_string(), i.to_string())))
                .copied()
                .unwrap_or_default())
        }

        async fn set_attendance_policy(
            &self,
            _account_id: i64,
            site: &str,
            identity: Option<&str>,
            policy: AttendancePolicy,
        ) -> Result<(), ApiError> {
            if let Some(identity) = identity {
                self.policies
                    .lock()
                    .unwrap()
                    .insert((site.to_string(), identity.to_string()), policy);
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;

    use super::test_support::InMemoryRemote;
    use super::*;
    use crate::attendance::tracker;
    use crate::models::{
        AttendancePolicy, AttendanceType, CreateEntryInput, EntryUpdate, RolloverPolicy, Slot,
        ToggleAction,
    };

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn test_context() -> (LedgerContext, Arc<InMemoryRemote>) {
        let remote = Arc::new(InMemoryRemote::new(
            &["로로벳", "샷벳", "의리벳"],
            &["김철수", "박영희"],
        ));
        let db = Database::open_in_memory().unwrap();
        let ctx = LedgerContext::new(db, 1, remote.clone(), remote.clone())
            .await
            .unwrap();
        (ctx, remote)
    }

    fn slot(identity: &str, site: &str, deposit: i64, withdraw: i64) -> Slot {
        Slot {
            identity: identity.into(),
            site: site.into(),
            deposit_amount: deposit,
            withdraw_amount: withdraw,
            attended: false,
        }
    }

    #[tokio::test]
    async fn create_rejects_unregistered_site() {
        let (ctx, _) = test_context().await;

        let mut input = CreateEntryInput::default();
        input.slots[0] = slot("김철수", "없는사이트", 100_000, 0);

        let err = entries::create_entry(&ctx, date(2025, 3, 10), input)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));

        // rejected before any local mutation
        let journal = entries::get_entries(&ctx, date(2025, 3, 10)).await.unwrap();
        assert!(journal.is_empty());
    }

    #[tokio::test]
    async fn chained_edit_cascades_into_downstream_entries() {
        let (ctx, _) = test_context().await;
        let d = date(2025, 3, 10);

        let mut first_input = CreateEntryInput::default();
        first_input.slots[0] = slot("김철수", "로로벳", 0, 50_000);
        first_input.total_amount = 500_000;
        let first = entries::create_entry(&ctx, d, first_input).await.unwrap();

        let second = entries::create_entry(&ctx, d, CreateEntryInput::default())
            .await
            .unwrap();
        assert_eq!(second.carried_amount, 450_000);

        // raising the first row's total re-derives the second row
        entries::update_entry(
            &ctx,
            &first.id,
            EntryUpdate {
                total_amount: Some(600_000),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let journal = entries::get_entries(&ctx, d).await.unwrap();
        assert_eq!(journal[1].carried_amount, 550_000);
    }

    #[tokio::test]
    async fn deposit_registers_attendance_once_per_pair_and_day() {
        let (ctx, _) = test_context().await;
        let d = date(2025, 3, 10);

        let mut input = CreateEntryInput::default();
        input.slots[0] = slot("김철수", "로로벳", 100_000, 0);
        entries::create_entry(&ctx, d, input).await.unwrap();

        // second entry, same pair, same slot, also positive: a recharge
        let mut recharge = CreateEntryInput::default();
        recharge.slots[0] = slot("김철수", "로로벳", 50_000, 0);
        entries::create_entry(&ctx, d, recharge).await.unwrap();

        assert_eq!(tracker::total_days(&ctx.db, 1, "로로벳", "김철수").unwrap(), 1);
    }

    #[tokio::test]
    async fn zeroing_a_deposit_retracts_the_days_log() {
        let (ctx, _) = test_context().await;
        let d = date(2025, 3, 10);

        let mut input = CreateEntryInput::default();
        input.slots[0] = slot("김철수", "로로벳", 100_000, 0);
        let entry = entries::create_entry(&ctx, d, input).await.unwrap();
        assert_eq!(tracker::total_days(&ctx.db, 1, "로로벳", "김철수").unwrap(), 1);

        let mut slots = entry.slots.clone();
        slots[0].deposit_amount = 0;
        entries::update_entry(
            &ctx,
            &entry.id,
            EntryUpdate {
                slots: Some(slots),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(tracker::total_days(&ctx.db, 1, "로로벳", "김철수").unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_retracts_attendance_it_caused() {
        let (ctx, _) = test_context().await;
        let d = date(2025, 3, 10);

        let mut input = CreateEntryInput::default();
        input.slots[0] = slot("김철수", "로로벳", 100_000, 0);
        let entry = entries::create_entry(&ctx, d, input).await.unwrap();
        assert_eq!(tracker::total_days(&ctx.db, 1, "로로벳", "김철수").unwrap(), 1);

        entries::delete_entry(&ctx, &entry.id).await.unwrap();
        assert_eq!(tracker::total_days(&ctx.db, 1, "로로벳", "김철수").unwrap(), 0);
        assert!(entries::get_entries(&ctx, d).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reorder_recomputes_every_carry() {
        let (ctx, _) = test_context().await;
        let d = date(2025, 3, 10);

        let mut first_input = CreateEntryInput::default();
        first_input.total_amount = 500_000;
        first_input.slots[0] = slot("김철수", "로로벳", 0, 50_000);
        let first = entries::create_entry(&ctx, d, first_input).await.unwrap();

        let mut second_input = CreateEntryInput::default();
        second_input.entered_amount = 200_000;
        let second = entries::create_entry(&ctx, d, second_input).await.unwrap();

        // swap the two rows: the former second entry now seeds the chain
        let journal = entries::reorder_entries(
            &ctx,
            d,
            &[(second.id.clone(), 0), (first.id.clone(), 1)],
        )
        .await
        .unwrap();

        assert_eq!(journal[0].id, second.id);
        assert_eq!(journal[0].carried_amount, 200_000);
        // the demoted first row now derives from the second's totals
        assert_eq!(journal[1].carried_amount, 0);
    }

    #[tokio::test]
    async fn duplicate_copies_inputs_but_not_attendance() {
        let (ctx, _) = test_context().await;
        let d = date(2025, 3, 10);

        let mut input = CreateEntryInput::default();
        input.slots[0] = slot("김철수", "로로벳", 100_000, 0);
        input.annotation = "10충".to_string();
        let entry = entries::create_entry(&ctx, d, input).await.unwrap();

        let copy = entries::duplicate_entry(&ctx, &entry.id).await.unwrap();
        assert_eq!(copy.slots, entry.slots);
        assert_eq!(copy.annotation, entry.annotation);
        assert!(copy.display_order > entry.display_order);

        // the copy is a recharge, so the day still has exactly one log
        assert_eq!(tracker::total_days(&ctx.db, 1, "로로벳", "김철수").unwrap(), 1);
    }

    #[tokio::test]
    async fn swap_moves_slot_between_entries_and_keeps_one_log() {
        let (ctx, _) = test_context().await;
        let d = date(2025, 3, 10);

        let mut input = CreateEntryInput::default();
        input.slots[0] = slot("김철수", "로로벳", 100_000, 0);
        let first = entries::create_entry(&ctx, d, input).await.unwrap();
        let second = entries::create_entry(&ctx, d, CreateEntryInput::default())
            .await
            .unwrap();

        entries::swap_slots(&ctx, (first.id.as_str(), 0), (second.id.as_str(), 2))
            .await
            .unwrap();

        let journal = entries::get_entries(&ctx, d).await.unwrap();
        assert!(journal[0].slots[0].is_blank());
        assert_eq!(journal[1].slots[2].site, "로로벳");
        // still one log: the pair just moved rows
        assert_eq!(tracker::total_days(&ctx.db, 1, "로로벳", "김철수").unwrap(), 1);
    }

    #[tokio::test]
    async fn manual_toggle_round_trips_through_context() {
        let (ctx, remote) = test_context().await;
        remote.set_policy(
            "샷벳",
            "박영희",
            AttendancePolicy {
                attendance_type: AttendanceType::Manual,
                rollover: RolloverPolicy::Excluded,
            },
        );

        let outcome =
            attendance::toggle_manual(&ctx, "샷벳", "박영희", date(2025, 3, 10), Some(true))
                .await
                .unwrap();
        assert_eq!(outcome.action, ToggleAction::Added);
        assert_eq!(outcome.consecutive_days, 1);

        let streak = attendance::local_streak(&ctx, "샷벳", "박영희").await.unwrap();
        assert_eq!(streak.consecutive_days, 1);
    }

    #[tokio::test]
    async fn policy_write_through_purges_logs_on_manual_switch() {
        let (ctx, _) = test_context().await;
        let d = date(2025, 3, 10);

        let mut input = CreateEntryInput::default();
        input.slots[0] = slot("김철수", "로로벳", 100_000, 0);
        entries::create_entry(&ctx, d, input).await.unwrap();
        assert_eq!(tracker::total_days(&ctx.db, 1, "로로벳", "김철수").unwrap(), 1);

        ctx.policies
            .set_policy(
                &ctx.db,
                1,
                "로로벳",
                Some("김철수"),
                AttendancePolicy {
                    attendance_type: AttendanceType::Manual,
                    rollover: RolloverPolicy::Excluded,
                },
                true,
            )
            .await
            .unwrap();

        assert_eq!(tracker::total_days(&ctx.db, 1, "로로벳", "김철수").unwrap(), 0);
    }
}
