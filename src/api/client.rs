use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{AttendancePolicy, Entry, ToggleOutcome};

use super::error::ApiError;

/// Acknowledgement returned by entry writes. `id` is the durable id the
/// store settled on (it replaces a temporary client id on first create);
/// `revision` is the revision the write carried, echoed back so stale
/// responses can be told apart from fresh ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveAck {
    pub id: String,
    pub revision: u64,
}

/// One item of a batch attendance read. Per-item failure is a value,
/// not an error: the batch as a whole still succeeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatResult {
    pub site: String,
    pub identity: String,
    pub consecutive_days: Option<u32>,
    pub total_days: Option<u32>,
    pub error: Option<String>,
}

/// The authoritative store. Exact transport is the collaborator's
/// concern; this is everything the ledger core needs from it.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Ordered entry list for one (account, date) journal.
    async fn fetch_journal(&self, account_id: i64, date: NaiveDate)
        -> Result<Vec<Entry>, ApiError>;

    async fn create_entry(&self, entry: &Entry) -> Result<SaveAck, ApiError>;

    async fn update_entry(&self, entry: &Entry) -> Result<SaveAck, ApiError>;

    /// Bulk reorder: list of (id, display_order).
    async fn reorder_entries(
        &self,
        account_id: i64,
        date: NaiveDate,
        orders: &[(String, i64)],
    ) -> Result<(), ApiError>;

    async fn delete_entry(&self, id: &str) -> Result<(), ApiError>;

    async fn toggle_attendance(
        &self,
        account_id: i64,
        site: &str,
        identity: &str,
        date: NaiveDate,
        desired: Option<bool>,
    ) -> Result<ToggleOutcome, ApiError>;

    /// Batch attendance stats for a list of (site, identity) pairs.
    async fn batch_attendance_stats(
        &self,
        account_id: i64,
        pairs: &[(String, String)],
    ) -> Result<Vec<StatResult>, ApiError>;
}

/// The external site-metadata collaborator. The core reads the registry
/// for validation and the attendance policy for streak semantics;
/// managing the registry itself is out of scope.
#[async_trait]
pub trait SiteMetadata: Send + Sync {
    async fn site_names(&self, account_id: i64) -> Result<Vec<String>, ApiError>;

    async fn identity_names(&self, account_id: i64) -> Result<Vec<String>, ApiError>;

    /// Policy for a site, optionally specialized per identity (`None`
    /// reads the shared site-wide policy).
    async fn attendance_policy(
        &self,
        account_id: i64,
        site: &str,
        identity: Option<&str>,
    ) -> Result<AttendancePolicy, ApiError>;

    async fn set_attendance_policy(
        &self,
        account_id: i64,
        site: &str,
        identity: Option<&str>,
        policy: AttendancePolicy,
    ) -> Result<(), ApiError>;
}
