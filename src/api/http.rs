use async_trait::async_trait;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use crate::models::{AttendancePolicy, Entry, ToggleOutcome};

use super::client::{RemoteStore, SaveAck, SiteMetadata, StatResult};
use super::error::ApiError;
use super::rate_limiter::{RateLimitConfig, RateLimiter};
use super::wire::{
    map_entry_to_wire, map_policy_to_wire, map_wire_entry, map_wire_policy, map_wire_toggle,
    WireEntry, WirePolicy, WireToggleOutcome,
};

const ENTRIES_ENDPOINT: &str = "/api/entries";
const REORDER_ENDPOINT: &str = "/api/entries/reorder";
const ATTENDANCE_TOGGLE_ENDPOINT: &str = "/api/attendance/toggle";
const ATTENDANCE_BATCH_ENDPOINT: &str = "/api/attendance/stats/batch";
const SITES_ENDPOINT: &str = "/api/sites/names";
const IDENTITIES_ENDPOINT: &str = "/api/identities/names";
const SITE_NOTES_ENDPOINT: &str = "/api/site-notes/policy";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// `RemoteStore`/`SiteMetadata` over the back-office server's JSON API.
/// Every response is an envelope: `{ "success": bool, ... }`.
pub struct HttpRemoteStore {
    base_url: String,
    http_client: reqwest::Client,
    rate_limiter: RateLimiter,
}

impl HttpRemoteStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http_client: reqwest::Client::new(),
            rate_limiter: RateLimiter::new(RateLimitConfig::default()),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Issue a request, enforce the envelope, and deserialize the body.
    async fn request_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ApiError> {
        self.rate_limiter.acquire().await;

        let response = request.send().await?;
        let status = response.status();
        let value: serde_json::Value = response.json().await?;

        let success = value
            .get("success")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if !status.is_success() || !success {
            let message = value
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("request failed")
                .to_string();
            return Err(ApiError::ServerError {
                code: status.as_u16().to_string(),
                message,
            });
        }

        serde_json::from_value(value).map_err(Into::into)
    }
}

#[derive(Deserialize)]
struct JournalResponse {
    entries: Vec<WireEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveResponse {
    id: String,
    revision: u64,
}

#[derive(Deserialize)]
struct AckResponse {}

#[derive(Deserialize)]
struct NamesResponse {
    names: Vec<String>,
}

#[derive(Deserialize)]
struct PolicyResponse {
    policy: WirePolicy,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireStatResult {
    site: String,
    identity: String,
    consecutive_days: Option<u32>,
    total_days: Option<u32>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct BatchStatsResponse {
    stats: Vec<WireStatResult>,
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn fetch_journal(
        &self,
        account_id: i64,
        date: NaiveDate,
    ) -> Result<Vec<Entry>, ApiError> {
        let request = self
            .http_client
            .get(self.url(ENTRIES_ENDPOINT))
            .query(&[
                ("accountId", account_id.to_string()),
                ("date", date.format(DATE_FORMAT).to_string()),
            ]);

        let response: JournalResponse = self.request_json(request).await?;
        let mut entries = response
            .entries
            .into_iter()
            .map(map_wire_entry)
            .collect::<Result<Vec<_>, _>>()?;
        entries.sort_by_key(|e| e.display_order);
        Ok(entries)
    }

    async fn create_entry(&self, entry: &Entry) -> Result<SaveAck, ApiError> {
        let request = self
            .http_client
            .post(self.url(ENTRIES_ENDPOINT))
            .json(&map_entry_to_wire(entry));

        let response: SaveResponse = self.request_json(request).await?;
        Ok(SaveAck {
            id: response.id,
            revision: response.revision,
        })
    }

    async fn update_entry(&self, entry: &Entry) -> Result<SaveAck, ApiError> {
        let request = self
            .http_client
            .put(format!("{}/{}", self.url(ENTRIES_ENDPOINT), entry.id))
            .json(&map_entry_to_wire(entry));

        let response: SaveResponse = self.request_json(request).await?;
        Ok(SaveAck {
            id: response.id,
            revision: response.revision,
        })
    }

    async fn reorder_entries(
        &self,
        account_id: i64,
        date: NaiveDate,
        orders: &[(String, i64)],
    ) -> Result<(), ApiError> {
        let records: Vec<_> = orders
            .iter()
            .map(|(id, order)| json!({ "id": id, "displayOrder": order }))
            .collect();
        let request = self.http_client.put(self.url(REORDER_ENDPOINT)).json(&json!({
            "accountId": account_id,
            "date": date.format(DATE_FORMAT).to_string(),
            "records": records,
        }));

        let _: AckResponse = self.request_json(request).await?;
        Ok(())
    }

    async fn delete_entry(&self, id: &str) -> Result<(), ApiError> {
        let request = self
            .http_client
            .delete(format!("{}/{}", self.url(ENTRIES_ENDPOINT), id));
        let _: AckResponse = self.request_json(request).await?;
        Ok(())
    }

    async fn toggle_attendance(
        &self,
        account_id: i64,
        site: &str,
        identity: &str,
        date: NaiveDate,
        desired: Option<bool>,
    ) -> Result<ToggleOutcome, ApiError> {
        let request = self
            .http_client
            .post(self.url(ATTENDANCE_TOGGLE_ENDPOINT))
            .json(&json!({
                "accountId": account_id,
                "siteName": site,
                "identityName": identity,
                "attendanceDate": date.format(DATE_FORMAT).to_string(),
                "desiredState": desired,
            }));

        let response: WireToggleOutcome = self.request_json(request).await?;
        map_wire_toggle(response)
    }

    async fn batch_attendance_stats(
        &self,
        account_id: i64,
        pairs: &[(String, String)],
    ) -> Result<Vec<StatResult>, ApiError> {
        let wire_pairs: Vec<_> = pairs
            .iter()
            .map(|(site, identity)| json!({ "siteName": site, "identityName": identity }))
            .collect();
        let request = self
            .http_client
            .post(self.url(ATTENDANCE_BATCH_ENDPOINT))
            .json(&json!({ "accountId": account_id, "pairs": wire_pairs }));

        let response: BatchStatsResponse = self.request_json(request).await?;
        Ok(response
            .stats
            .into_iter()
            .map(|s| StatResult {
                site: s.site,
                identity: s.identity,
                consecutive_days: s.consecutive_days,
                total_days: s.total_days,
                error: s.error,
            })
            .collect())
    }
}

#[async_trait]
impl SiteMetadata for HttpRemoteStore {
    async fn site_names(&self, account_id: i64) -> Result<Vec<String>, ApiError> {
        let request = self
            .http_client
            .get(self.url(SITES_ENDPOINT))
            .query(&[("accountId", account_id.to_string())]);
        let response: NamesResponse = self.request_json(request).await?;
        Ok(response.names)
    }

    async fn identity_names(&self, account_id: i64) -> Result<Vec<String>, ApiError> {
        let request = self
            .http_client
            .get(self.url(IDENTITIES_ENDPOINT))
            .query(&[("accountId", account_id.to_string())]);
        let response: NamesResponse = self.request_json(request).await?;
        Ok(response.names)
    }

    async fn attendance_policy(
        &self,
        account_id: i64,
        site: &str,
        identity: Option<&str>,
    ) -> Result<AttendancePolicy, ApiError> {
        let mut query = vec![
            ("accountId", account_id.to_string()),
            ("siteName", site.to_string()),
        ];
        if let Some(identity) = identity {
            query.push(("identityName", identity.to_string()));
        }
        let request = self
            .http_client
            .get(self.url(SITE_NOTES_ENDPOINT))
            .query(&query);

        let response: PolicyResponse = self.request_json(request).await?;
        Ok(map_wire_policy(&response.policy))
    }

    async fn set_attendance_policy(
        &self,
        account_id: i64,
        site: &str,
        identity: Option<&str>,
        policy: AttendancePolicy,
    ) -> Result<(), ApiError> {
        let request = self
            .http_client
            .put(self.url(SITE_NOTES_ENDPOINT))
            .json(&json!({
                "accountId": account_id,
                "siteName": site,
                "identityName": identity,
                "policy": map_policy_to_wire(policy),
            }));

        let _: AckResponse = self.request_json(request).await?;
        Ok(())
    }
}
