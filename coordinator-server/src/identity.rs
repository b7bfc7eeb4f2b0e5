//! C3: the session registry. Bidirectional `player <-> session` map,
//! duplicate-session takeover, and the per-player exclusion lock - all
//! backed by the KV store (section 9: these are shared mutable tables, not
//! in-process maps; only non-serializable live handles belong in-process,
//! see `connections.rs`).
//!
//! Grounded on relay-server's `lobby.rs` `AppState` registry shape
//! (a name-keyed table with create/lookup/remove operations under a single
//! owner), generalized from one in-process `Mutex<HashMap<...>>` to the KV
//! primitives section 5 requires (`SET NX`, `EXPIRE`, plain get/del).

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::kv::KvStore;
use protocol::names::{custom_session_id, normalize_summoner_name};

const SESSION_TTL_SECS: u64 = 120;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    Accepted,
    Duplicate { existing_session_id: String },
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionRecord {
    summoner_name: String,
    remote_addr: Option<String>,
    user_agent: Option<String>,
    registered_at: chrono::DateTime<Utc>,
}

fn player_lock_key(name: &str) -> String {
    format!("player:{name}")
}

fn session_key(random_session_id: &str) -> String {
    format!("session:{random_session_id}")
}

fn session_by_summoner_key(name: &str) -> String {
    format!("session_by_summoner:{name}")
}

fn custom_session_mapping_key(custom_id: &str) -> String {
    format!("custom_session_mapping:{custom_id}")
}

pub struct SessionRegistry {
    kv: KvStore,
}

impl SessionRegistry {
    pub fn new(kv: KvStore) -> Self {
        SessionRegistry { kv }
    }

    /// `registerSession` (section 4.1): atomic create with duplicate-session
    /// takeover against a zombie holder.
    pub async fn register_session(
        &self,
        random_session_id: &str,
        summoner_name: &str,
        remote_addr: Option<String>,
        user_agent: Option<String>,
    ) -> crate::error::Result<RegisterOutcome> {
        let name = normalize_summoner_name(summoner_name);
        match self.try_claim(&name, random_session_id).await? {
            Some(existing) => {
                if self.kv.exists(&session_key(&existing)).await? {
                    warn!(summoner = %name, existing_session = %existing, "duplicate live session");
                    Ok(RegisterOutcome::Duplicate { existing_session_id: existing })
                } else {
                    info!(summoner = %name, stale_session = %existing, "zombie session takeover");
                    self.force_release_player_lock(&name).await?;
                    match self.try_claim(&name, random_session_id).await? {
                        None => self.finish_register(&name, random_session_id, remote_addr, user_agent).await,
                        Some(raced) => Ok(RegisterOutcome::Duplicate { existing_session_id: raced }),
                    }
                }
            }
            None => self.finish_register(&name, random_session_id, remote_addr, user_agent).await,
        }
    }

    /// Attempts the `SET NX` claim; returns `None` on success, or the
    /// current holder's `randomSessionId` on contention.
    async fn try_claim(&self, name: &str, random_session_id: &str) -> crate::error::Result<Option<String>> {
        if self.kv.set_nx_ex(&player_lock_key(name), random_session_id, SESSION_TTL_SECS).await? {
            Ok(None)
        } else {
            Ok(self.kv.get(&player_lock_key(name)).await?)
        }
    }

    async fn finish_register(
        &self,
        name: &str,
        random_session_id: &str,
        remote_addr: Option<String>,
        user_agent: Option<String>,
    ) -> crate::error::Result<RegisterOutcome> {
        let record = SessionRecord {
            summoner_name: name.to_string(),
            remote_addr,
            user_agent,
            registered_at: Utc::now(),
        };
        let body = serde_json::to_string(&record).unwrap_or_default();
        self.kv.set_ex(&session_key(random_session_id), &body, SESSION_TTL_SECS).await?;
        self.kv.set_ex(&session_by_summoner_key(name), random_session_id, SESSION_TTL_SECS).await?;
        self.bind_custom_to_random(&custom_session_id(name), random_session_id).await?;
        Ok(RegisterOutcome::Accepted)
    }

    /// `acquirePlayerLock` (section 4.1). Leased exclusion; returns the
    /// current holder so callers can compare against their own id.
    pub async fn acquire_player_lock(&self, summoner_name: &str, random_session_id: &str) -> crate::error::Result<String> {
        let name = normalize_summoner_name(summoner_name);
        match self.try_claim(&name, random_session_id).await? {
            None => Ok(random_session_id.to_string()),
            Some(holder) => Ok(holder),
        }
    }

    /// `forceReleasePlayerLock` - only valid once the caller has confirmed
    /// the current holder is a zombie.
    pub async fn force_release_player_lock(&self, summoner_name: &str) -> crate::error::Result<()> {
        let name = normalize_summoner_name(summoner_name);
        self.kv.del(&player_lock_key(&name)).await
    }

    pub async fn bind_custom_to_random(&self, custom_id: &str, random_session_id: &str) -> crate::error::Result<()> {
        self.kv
            .set_ex(&custom_session_mapping_key(custom_id), random_session_id, SESSION_TTL_SECS)
            .await
    }

    pub async fn get_random_by_custom(&self, custom_id: &str) -> crate::error::Result<Option<String>> {
        self.kv.get(&custom_session_mapping_key(custom_id)).await
    }

    pub async fn get_custom_by_random(&self, random_session_id: &str) -> crate::error::Result<Option<String>> {
        let summoner = self.get_summoner_by_session(random_session_id).await?;
        Ok(summoner.map(|name| custom_session_id(&name)))
    }

    pub async fn get_session_by_summoner(&self, summoner_name: &str) -> crate::error::Result<Option<String>> {
        let name = normalize_summoner_name(summoner_name);
        self.kv.get(&session_by_summoner_key(&name)).await
    }

    pub async fn get_summoner_by_session(&self, random_session_id: &str) -> crate::error::Result<Option<String>> {
        match self.kv.get(&session_key(random_session_id)).await? {
            Some(body) => {
                let record: SessionRecord = serde_json::from_str(&body)
                    .map_err(|e| crate::error::CoordinatorError::ProtocolViolation { reason: e.to_string() })?;
                Ok(Some(record.summoner_name))
            }
            None => Ok(None),
        }
    }

    /// Refreshes every TTL this session's liveness depends on: its own
    /// record, its summoner index, its exclusion lock, and its stable-id
    /// mapping.
    pub async fn update_heartbeat(&self, random_session_id: &str) -> crate::error::Result<()> {
        self.kv.expire(&session_key(random_session_id), SESSION_TTL_SECS).await?;
        if let Some(name) = self.get_summoner_by_session(random_session_id).await? {
            self.kv.expire(&session_by_summoner_key(&name), SESSION_TTL_SECS).await?;
            self.kv.expire(&player_lock_key(&name), SESSION_TTL_SECS).await?;
            self.kv
                .expire(&custom_session_mapping_key(&custom_session_id(&name)), SESSION_TTL_SECS)
                .await?;
        }
        Ok(())
    }

    /// On disconnect: removes the session record and releases its lock iff
    /// it is still the current holder (avoids releasing a lock a later
    /// reconnect already re-acquired).
    pub async fn remove_session(&self, random_session_id: &str) -> crate::error::Result<()> {
        if let Some(name) = self.get_summoner_by_session(random_session_id).await? {
            if self.kv.get(&player_lock_key(&name)).await?.as_deref() == Some(random_session_id) {
                self.kv.del(&player_lock_key(&name)).await?;
            }
            self.kv.del(&session_by_summoner_key(&name)).await?;
        }
        self.kv.del(&session_key(random_session_id)).await
    }
}

/// Anti-spoofing precondition every mutating router handler runs first
/// (section 4.4): the message's claimed `summonerName` must match the
/// session's registered one, case-insensitively.
pub fn claims_match(registered: &str, claimed: &str) -> bool {
    normalize_summoner_name(registered) == normalize_summoner_name(claimed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claims_match_is_case_and_whitespace_insensitive() {
        assert!(claims_match("Alpha", "  ALPHA  "));
        assert!(!claims_match("Alpha", "Bravo"));
    }
}
