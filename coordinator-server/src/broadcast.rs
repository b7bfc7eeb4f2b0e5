//! C7: the directed broadcaster (section 4.5). Delivers a typed event to a
//! named set of target players with graceful degradation: per-target
//! outbox fallback on failure, and a global fan-out when enough targets
//! fail.
//!
//! Grounded on relay-server's `host_to_client_broadcaster: broadcast::Sender<Bytes>`
//! fan-out in `lobby.rs`, generalized from "every client in a room" to "a
//! named subset of players" with a personalized payload per target.

use std::time::Duration;

use axum::extract::ws::Message;
use futures_util::future::join_all;
use serde_json::Value;
use tracing::warn;

use crate::connections::ConnectionTable;
use crate::error::Result;
use crate::identity::SessionRegistry;
use crate::outbox::EventOutbox;
use protocol::names::{custom_session_id, is_bot_name, normalize_summoner_name};

const OVERALL_SEND_DEADLINE: Duration = Duration::from_secs(5);
const GLOBAL_FALLBACK_FAILURE_RATIO: f64 = 0.30;

#[derive(Clone)]
pub struct Broadcaster {
    connections: ConnectionTable,
    sessions: std::sync::Arc<SessionRegistry>,
    outbox: EventOutbox,
}

impl Broadcaster {
    pub fn new(connections: ConnectionTable, sessions: std::sync::Arc<SessionRegistry>, outbox: EventOutbox) -> Self {
        Broadcaster { connections, sessions, outbox }
    }

    /// Directed send to `targets`, falling back to a global fan-out if the
    /// failure ratio across targets reaches 30%.
    pub async fn send_to(&self, targets: &[String], event_type: &str, data: Value) -> Result<()> {
        self.send_to_with_extra(targets, event_type, data, serde_json::Map::new()).await
    }

    /// Like [`send_to`], but merges `extra` as sibling fields of `data` on
    /// the outer frame rather than nesting them inside it - section 6's
    /// `draft_updated { data: <DraftSnapshot>, timeRemaining }` needs
    /// `timeRemaining` next to `data`, not folded into it.
    pub async fn send_to_with_extra(&self, targets: &[String], event_type: &str, data: Value, extra: serde_json::Map<String, Value>) -> Result<()> {
        let real_targets: Vec<&String> = targets.iter().filter(|name| !is_bot_name(name)).collect();
        if real_targets.is_empty() {
            return Ok(());
        }

        let sends = real_targets.iter().map(|name| self.send_one(name, event_type, &data, &extra));
        let results = tokio::time::timeout(OVERALL_SEND_DEADLINE, join_all(sends))
            .await
            .unwrap_or_else(|_| real_targets.iter().map(|_| false).collect());

        let failures = results.iter().filter(|ok| !**ok).count();
        let ratio = failures as f64 / real_targets.len() as f64;
        if ratio >= GLOBAL_FALLBACK_FAILURE_RATIO {
            warn!(event_type, failures, total = real_targets.len(), "directed send failure ratio triggered global fan-out");
            self.global_fan_out(event_type, data, &extra).await?;
        }
        Ok(())
    }

    /// Sends the personalized copy to one target. Returns `false` (never
    /// an `Err`) on any failure so the caller can compute the ratio; the
    /// event is enqueued to the outbox either way a send doesn't succeed.
    async fn send_one(&self, summoner_name: &str, event_type: &str, data: &Value, extra: &serde_json::Map<String, Value>) -> bool {
        let name = normalize_summoner_name(summoner_name);
        let personalized = personalize(event_type, data, extra, &name);

        let random_session_id = match self.sessions.get_session_by_summoner(&name).await {
            Ok(Some(id)) => id,
            _ => {
                let _ = self.outbox.queue_event(&custom_session_id(&name), event_type, personalized).await;
                return false;
            }
        };

        let registered = self.sessions.get_summoner_by_session(&random_session_id).await.ok().flatten();
        if registered.as_deref() != Some(name.as_str()) {
            let _ = self.outbox.queue_event(&custom_session_id(&name), event_type, personalized).await;
            return false;
        }

        let text = serde_json::to_string(&personalized).unwrap_or_default();
        let sent = self.connections.send(&random_session_id, Message::Text(text.into())).await;
        if !sent {
            let _ = self.outbox.queue_event(&custom_session_id(&name), event_type, personalized).await;
        }
        sent
    }

    /// Best-effort send to every connected session, regardless of target
    /// list. Clients discard anything whose `targetSummoner` isn't them.
    async fn global_fan_out(&self, event_type: &str, data: Value, extra: &serde_json::Map<String, Value>) -> Result<()> {
        let session_ids = self.connections.all_session_ids().await;
        let mut frame = serde_json::Map::new();
        frame.insert("type".to_string(), Value::String(event_type.to_string()));
        frame.insert("data".to_string(), data);
        for (k, v) in extra {
            frame.insert(k.clone(), v.clone());
        }
        let text = serde_json::to_string(&Value::Object(frame)).unwrap_or_default();
        for session_id in session_ids {
            let _ = self.connections.send(&session_id, Message::Text(text.clone().into())).await;
        }
        Ok(())
    }
}

/// Wraps `data` with a root-level and nested `targetSummoner`, plus any
/// `extra` sibling fields on the outer frame, per section 4.5 ("the gateway
/// uses this to discard messages misrouted to it").
fn personalize(event_type: &str, data: &Value, extra: &serde_json::Map<String, Value>, target_summoner: &str) -> Value {
    let mut nested = data.clone();
    if let Value::Object(map) = &mut nested {
        map.insert("targetSummoner".to_string(), Value::String(target_summoner.to_string()));
    }
    let mut frame = serde_json::Map::new();
    frame.insert("type".to_string(), Value::String(event_type.to_string()));
    frame.insert("data".to_string(), nested);
    frame.insert("targetSummoner".to_string(), Value::String(target_summoner.to_string()));
    for (k, v) in extra {
        frame.insert(k.clone(), v.clone());
    }
    Value::Object(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn personalize_adds_target_summoner_at_root_and_nested() {
        let data = serde_json::json!({"matchId": 7});
        let out = personalize("match_accepted", &data, &serde_json::Map::new(), "alpha");
        assert_eq!(out["targetSummoner"], "alpha");
        assert_eq!(out["data"]["targetSummoner"], "alpha");
        assert_eq!(out["data"]["matchId"], 7);
    }

    #[test]
    fn personalize_merges_extra_fields_as_siblings_of_data() {
        let data = serde_json::json!({"step": 3});
        let mut extra = serde_json::Map::new();
        extra.insert("timeRemaining".to_string(), serde_json::json!(12.5));
        let out = personalize("draft_updated", &data, &extra, "alpha");
        assert_eq!(out["timeRemaining"], 12.5);
        assert_eq!(out["data"]["step"], 3);
        assert!(out["data"].get("timeRemaining").is_none());
    }
}
