//! C4: the per-player durable event outbox (section 4.2). Keyed by the
//! **stable** `customSessionId`, never by the volatile `randomSessionId`,
//! so a reconnect under a new session still finds its queue.
//!
//! The bounded-FIFO-with-oldest-eviction shape mirrors the capacity
//! discipline of relay-server's `broadcast::channel(CHANNEL_BUFFER_SIZE)`
//! fan-out buffers, generalized from an in-memory ring to a KV-backed list
//! per spec section 9 (shared mutable state belongs in the KV store).

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::kv::KvStore;

pub const MAX_PENDING_EVENTS_PER_PLAYER: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingEvent {
    pub event_type: String,
    pub payload: serde_json::Value,
    pub enqueued_at: chrono::DateTime<Utc>,
    pub ttl_secs: i64,
    pub delivery_attempts: u32,
}

impl PendingEvent {
    pub fn is_expired(&self, now: chrono::DateTime<Utc>) -> bool {
        (now - self.enqueued_at).num_seconds() >= self.ttl_secs
    }
}

/// Event-class TTLs (section 4.2: "match-found 5 min, draft 10 min,
/// in-game 1 h").
pub fn ttl_for_event_type(event_type: &str) -> i64 {
    match event_type {
        "match_found" | "match_acceptance_progress" | "match_accepted" | "match_cancelled" => 300,
        "draft_updated" => 600,
        "game_ready" | "game_started" | "restore_active_match" => 3600,
        _ => 300,
    }
}

fn pending_key(custom_session_id: &str) -> String {
    format!("pending:{custom_session_id}")
}

#[derive(Clone)]
pub struct EventOutbox {
    kv: KvStore,
}

impl EventOutbox {
    pub fn new(kv: KvStore) -> Self {
        EventOutbox { kv }
    }

    /// `queueEvent` - append to the bounded FIFO; overflow drops the
    /// oldest entry first.
    pub async fn queue_event(&self, custom_session_id: &str, event_type: &str, payload: serde_json::Value) -> Result<()> {
        let event = PendingEvent {
            event_type: event_type.to_string(),
            payload,
            enqueued_at: Utc::now(),
            ttl_secs: ttl_for_event_type(event_type),
            delivery_attempts: 0,
        };
        let key = pending_key(custom_session_id);
        self.kv.rpush(&key, &serde_json::to_string(&event).unwrap_or_default()).await?;

        let len = self.kv.llen(&key).await?;
        if len > MAX_PENDING_EVENTS_PER_PLAYER {
            self.kv.ltrim_from_head(&key, (len - MAX_PENDING_EVENTS_PER_PLAYER) as isize).await?;
        }
        Ok(())
    }

    /// `getPendingEvents` - a read snapshot, with already-TTL-expired
    /// entries filtered out (lazy eviction; no separate sweep needed for
    /// correctness, though a watchdog may still trim dead keys).
    pub async fn get_pending_events(&self, custom_session_id: &str) -> Result<Vec<PendingEvent>> {
        let raw = self.kv.lrange_all(&pending_key(custom_session_id)).await?;
        let now = Utc::now();
        Ok(raw
            .iter()
            .filter_map(|s| serde_json::from_str::<PendingEvent>(s).ok())
            .filter(|e| !e.is_expired(now))
            .collect())
    }

    /// `clearPendingEvents` - drain on successful send.
    pub async fn clear_pending_events(&self, custom_session_id: &str) -> Result<()> {
        self.kv.del(&pending_key(custom_session_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_classes_match_section_4_2() {
        assert_eq!(ttl_for_event_type("match_found"), 300);
        assert_eq!(ttl_for_event_type("draft_updated"), 600);
        assert_eq!(ttl_for_event_type("game_started"), 3600);
    }

    #[test]
    fn expiry_is_relative_to_enqueue_time() {
        let event = PendingEvent {
            event_type: "match_found".to_string(),
            payload: serde_json::json!({}),
            enqueued_at: Utc::now() - chrono::Duration::seconds(301),
            ttl_secs: 300,
            delivery_attempts: 0,
        };
        assert!(event.is_expired(Utc::now()));
    }
}
