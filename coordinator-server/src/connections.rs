//! In-process table of live gateway sockets, keyed by the volatile
//! `randomSessionId` (section 3: "non-serializable live handles are fine to
//! keep as in-process caches, never as the source of truth" - section 9).
//! `identity.rs` is the source of truth for who a session belongs to; this
//! table only exists to get bytes onto a live socket.
//!
//! Modeled on the per-connection split-task shape in
//! `relay-server/src/hand_shake.rs`: each accepted socket gets an
//! unbounded mpsc sender captured here, and a paired task owns the actual
//! `WebSocket` and forwards anything received on the channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use axum::extract::ws::Message;
use tokio::sync::{mpsc, RwLock};

pub struct Connection {
    pub random_session_id: String,
    pub sender: mpsc::UnboundedSender<Message>,
    pub remote_addr: Option<String>,
    last_activity_unix: AtomicI64,
}

impl Connection {
    pub fn touch(&self, now_unix: i64) {
        self.last_activity_unix.store(now_unix, Ordering::Relaxed);
    }

    pub fn last_activity_unix(&self) -> i64 {
        self.last_activity_unix.load(Ordering::Relaxed)
    }
}

#[derive(Clone, Default)]
pub struct ConnectionTable {
    inner: Arc<RwLock<HashMap<String, Arc<Connection>>>>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        ConnectionTable::default()
    }

    pub async fn insert(
        &self,
        random_session_id: String,
        sender: mpsc::UnboundedSender<Message>,
        remote_addr: Option<String>,
        now_unix: i64,
    ) -> Arc<Connection> {
        let conn = Arc::new(Connection {
            random_session_id: random_session_id.clone(),
            sender,
            remote_addr,
            last_activity_unix: AtomicI64::new(now_unix),
        });
        self.inner.write().await.insert(random_session_id, conn.clone());
        conn
    }

    pub async fn get(&self, random_session_id: &str) -> Option<Arc<Connection>> {
        self.inner.read().await.get(random_session_id).cloned()
    }

    pub async fn remove(&self, random_session_id: &str) {
        self.inner.write().await.remove(random_session_id);
    }

    /// Best-effort send; `false` means the socket's forwarding task is gone
    /// (closed channel), which callers treat the same as "not connected".
    pub async fn send(&self, random_session_id: &str, message: Message) -> bool {
        match self.get(random_session_id).await {
            Some(conn) => conn.sender.send(message).is_ok(),
            None => false,
        }
    }

    pub async fn all_session_ids(&self) -> Vec<String> {
        self.inner.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_get_remove_round_trip() {
        let table = ConnectionTable::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        table.insert("rand-1".to_string(), tx, None, 1000).await;

        assert!(table.get("rand-1").await.is_some());
        assert!(table.send("rand-1", Message::Text("hi".into())).await);
        assert_eq!(rx.recv().await, Some(Message::Text("hi".into())));

        table.remove("rand-1").await;
        assert!(table.get("rand-1").await.is_none());
        assert!(!table.send("rand-1", Message::Text("bye".into())).await);
    }

    #[tokio::test]
    async fn send_to_unknown_session_is_false() {
        let table = ConnectionTable::new();
        assert!(!table.send("nope", Message::Text("x".into())).await);
    }
}
