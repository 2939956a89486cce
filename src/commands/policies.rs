//! Site metadata reads: the registry snapshot used for validation and
//! the attendance policy lookup, both cached.

use std::sync::Arc;
use std::time::Duration;

use crate::api::SiteMetadata;
use crate::attendance;
use crate::cache::{CacheKey, MetadataCache};
use crate::db::Database;
use crate::error::LedgerError;
use crate::models::{AttendancePolicy, AttendanceType};

/// Policies change rarely; cache them for a few minutes.
const POLICY_TTL: Duration = Duration::from_secs(300);

/// Known site and identity names, loaded from the site-metadata
/// collaborator. Edits referencing names outside the snapshot are
/// rejected before any mutation.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    pub site_names: Vec<String>,
    pub identity_names: Vec<String>,
}

impl RegistrySnapshot {
    pub async fn load(
        metadata: &dyn SiteMetadata,
        account_id: i64,
    ) -> Result<Self, LedgerError> {
        let site_names = metadata.site_names(account_id).await?;
        let identity_names = metadata.identity_names(account_id).await?;
        Ok(RegistrySnapshot {
            site_names,
            identity_names,
        })
    }

    pub fn is_known_site(&self, site: &str) -> bool {
        self.site_names.iter().any(|s| s == site)
    }

    pub fn is_known_identity(&self, identity: &str) -> bool {
        self.identity_names.iter().any(|i| i == identity)
    }
}

/// Cached attendance-policy lookup. Unreachable metadata degrades to the
/// default policy (automatic, no rollover) instead of blocking the edit.
pub struct PolicyService {
    metadata: Arc<dyn SiteMetadata>,
    cache: MetadataCache<AttendancePolicy>,
}

impl PolicyService {
    pub fn new(metadata: Arc<dyn SiteMetadata>) -> Self {
        PolicyService {
            metadata,
            cache: MetadataCache::new(POLICY_TTL),
        }
    }

    pub async fn policy_for(
        &self,
        account_id: i64,
        site: &str,
        identity: &str,
    ) -> AttendancePolicy {
        let key = CacheKey::for_identity(site, identity);
        if let Some(policy) = self.cache.get(&key) {
            return policy;
        }

        let policy = match self
            .metadata
            .attendance_policy(account_id, site, Some(identity))
            .await
        {
            Ok(policy) => policy,
            Err(e) => {
                log::warn!(
                    "policy read for {}/{} failed, using default: {}",
                    identity,
                    site,
                    e
                );
                AttendancePolicy::default()
            }
        };

        self.cache.insert(key, policy);
        policy
    }

    /// Write a policy through to the metadata collaborator. Switching a
    /// pair from automatic to manual may purge its accumulated automatic
    /// logs, which is the operator's call (`delete_logs`).
    pub async fn set_policy(
        &self,
        db: &Database,
        account_id: i64,
        site: &str,
        identity: Option<&str>,
        policy: AttendancePolicy,
        delete_logs: bool,
    ) -> Result<(), LedgerError> {
        let previous = match identity {
            Some(identity) => Some(self.policy_for(account_id, site, identity).await),
            None => None,
        };

        self.metadata
            .set_attendance_policy(account_id, site, identity, policy)
            .await?;

        match identity {
            Some(identity) => {
                self.cache.invalidate(&CacheKey::for_identity(site, identity));

                let switched_to_manual = previous
                    .map(|p| p.attendance_type == AttendanceType::Automatic)
                    .unwrap_or(false)
                    && policy.attendance_type == AttendanceType::Manual;
                if switched_to_manual {
                    attendance::handle_mode_change(db, account_id, site, identity, delete_logs)?;
                }
            }
            None => {
                // shared policy changed: every identity key for the site
                // may be stale
                self.cache.clear();
            }
        }

        Ok(())
    }
}
