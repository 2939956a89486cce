//! Change-notification feed from the back-office server.
//!
//! Other sessions editing the same account surface here as data-change
//! events (the caller reloads the affected journal; storage is
//! last-writer-wins) and as advisory editing signals. The editing signal
//! is informational only, never a lock.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::error::ApiError;

/// Events surfaced to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// Remote data changed; reload the named scope (and date, if any).
    DataChanged {
        scope: String,
        date: Option<NaiveDate>,
    },
    /// Another session started editing. Advisory only.
    EditingStarted {
        page: String,
        record_id: Option<String>,
    },
    EditingEnded {
        page: String,
        record_id: Option<String>,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireFeedMessage {
    event: String,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    page: Option<String>,
    #[serde(default)]
    record_id: Option<String>,
}

fn map_feed_message(wire: WireFeedMessage) -> Option<ChangeEvent> {
    match wire.event.as_str() {
        "data:changed" => Some(ChangeEvent::DataChanged {
            scope: wire.scope.unwrap_or_default(),
            date: wire
                .date
                .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
        }),
        "editing:started" => Some(ChangeEvent::EditingStarted {
            page: wire.page.unwrap_or_default(),
            record_id: wire.record_id,
        }),
        "editing:ended" => Some(ChangeEvent::EditingEnded {
            page: wire.page.unwrap_or_default(),
            record_id: wire.record_id,
        }),
        // join acks, heartbeats and future event types
        _ => None,
    }
}

/// One websocket connection scoped to an account room.
pub struct ChangeFeed {
    url: String,
    account_id: i64,
}

impl ChangeFeed {
    pub fn new(url: impl Into<String>, account_id: i64) -> Self {
        Self {
            url: url.into(),
            account_id,
        }
    }

    /// Connect, join the account room and pump events into `tx` until
    /// the connection drops. Reconnecting is the caller's concern.
    pub async fn run(self, tx: UnboundedSender<ChangeEvent>) -> Result<(), ApiError> {
        let (ws_stream, _) = connect_async(&self.url)
            .await
            .map_err(|e| ApiError::WebSocketError(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        let join = serde_json::json!({
            "event": "join:account",
            "room": format!("account:{}", self.account_id),
        });
        write
            .send(Message::Text(join.to_string()))
            .await
            .map_err(|e| ApiError::WebSocketError(e.to_string()))?;

        log::info!("change feed connected for account {}", self.account_id);

        while let Some(message) = read.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    match serde_json::from_str::<WireFeedMessage>(text.as_ref()) {
                        Ok(wire) => {
                            if let Some(event) = map_feed_message(wire) {
                                if tx.send(event).is_err() {
                                    // receiver dropped, nobody is listening
                                    break;
                                }
                            }
                        }
                        Err(e) => log::warn!("unparseable feed message: {}", e),
                    }
                }
                Ok(Message::Ping(payload)) => {
                    write
                        .send(Message::Pong(payload))
                        .await
                        .map_err(|e| ApiError::WebSocketError(e.to_string()))?;
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => return Err(ApiError::WebSocketError(e.to_string())),
            }
        }

        log::info!("change feed closed for account {}", self.account_id);
        Ok(())
    }
}

/// Keeps at most one feed task per account.
pub struct ChangeFeedManager {
    active: Arc<Mutex<HashMap<i64, tokio::task::JoinHandle<()>>>>,
}

impl ChangeFeedManager {
    pub fn new() -> Self {
        Self {
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn start(
        &self,
        url: impl Into<String>,
        account_id: i64,
        tx: UnboundedSender<ChangeEvent>,
    ) -> Result<(), ApiError> {
        let mut active = self.active.lock().await;
        if active.contains_key(&account_id) {
            return Err(ApiError::Unknown(format!(
                "change feed already active for account {}",
                account_id
            )));
        }

        let feed = ChangeFeed::new(url, account_id);
        let handle = tokio::spawn(async move {
            if let Err(e) = feed.run(tx).await {
                log::error!("change feed for account {} failed: {}", account_id, e);
            }
        });
        active.insert(account_id, handle);
        Ok(())
    }

    pub async fn stop(&self, account_id: i64) {
        let mut active = self.active.lock().await;
        if let Some(handle) = active.remove(&account_id) {
            handle.abort();
        }
    }

    pub async fn is_active(&self, account_id: i64) -> bool {
        self.active.lock().await.contains_key(&account_id)
    }

    pub async fn stop_all(&self) {
        let mut active = self.active.lock().await;
        for (_, handle) in active.drain() {
            handle.abort();
        }
    }
}

impl Default for ChangeFeedManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_change_messages_map_with_date() {
        let wire: WireFeedMessage = serde_json::from_str(
            r#"{"event":"data:changed","scope":"journal","date":"2025-03-10"}"#,
        )
        .unwrap();
        let event = map_feed_message(wire).unwrap();
        assert_eq!(
            event,
            ChangeEvent::DataChanged {
                scope: "journal".into(),
                date: NaiveDate::from_ymd_opt(2025, 3, 10),
            }
        );
    }

    #[test]
    fn editing_signals_map_to_advisory_events() {
        let wire: WireFeedMessage = serde_json::from_str(
            r#"{"event":"editing:started","page":"ledger","recordId":"42"}"#,
        )
        .unwrap();
        assert_eq!(
            map_feed_message(wire).unwrap(),
            ChangeEvent::EditingStarted {
                page: "ledger".into(),
                record_id: Some("42".into()),
            }
        );
    }

    #[test]
    fn unknown_events_are_ignored() {
        let wire: WireFeedMessage =
            serde_json::from_str(r#"{"event":"editors:list"}"#).unwrap();
        assert!(map_feed_message(wire).is_none());
    }

    #[tokio::test]
    async fn manager_tracks_active_accounts() {
        let manager = ChangeFeedManager::new();
        assert!(!manager.is_active(1).await);
        manager.stop(1).await; // stopping a missing feed is fine
        manager.stop_all().await;
    }
}
