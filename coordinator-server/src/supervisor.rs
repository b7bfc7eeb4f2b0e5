//! C11: in-game supervisor and ownership (section 4.9). From draft
//! completion until post-game vote resolution, one backend instance owns
//! each match exclusively; this component also restores a reconnecting
//! player to the right screen.
//!
//! The TTL-lease protocol follows directly from `kv.rs`'s `SET NX` +
//! `EXPIRE` primitives - relay-server has no cross-instance ownership
//! concept of its own, every room lives on the one process that created it.
//!
//! Open question (section 9, recorded in `DESIGN.md`): dual-owner
//! detection when the original owner is alive but partitioned is not
//! attempted beyond the heartbeat TTL compare - this is a known gap,
//! inherited from the source's own fail-stop assumption.

use std::time::Duration;

use tracing::info;

use crate::broadcast::Broadcaster;
use crate::error::{CoordinatorError, Result};
use crate::kv::KvStore;
use crate::storage::Storage;
use protocol::Match;

fn owner_key(match_id: i64) -> String {
    format!("match:{match_id}:owner")
}

fn alive_key(backend_id: &str) -> String {
    format!("backend:{backend_id}:alive")
}

pub struct Supervisor {
    kv: KvStore,
    storage: Storage,
    broadcaster: Broadcaster,
    backend_id: String,
    ownership_ttl: Duration,
}

impl Supervisor {
    pub fn new(kv: KvStore, storage: Storage, broadcaster: Broadcaster, backend_id: String, ownership_ttl: Duration) -> Self {
        Supervisor { kv, storage, broadcaster, backend_id, ownership_ttl }
    }

    /// `claimMatchOwnership(matchId)` - succeeds iff no live owner exists.
    pub async fn claim_match_ownership(&self, match_id: i64) -> Result<bool> {
        let ttl = self.ownership_ttl.as_secs();
        if self.kv.set_nx_ex(&owner_key(match_id), &self.backend_id, ttl).await? {
            self.mark_owned(match_id).await?;
            return Ok(true);
        }

        let current_owner = self.kv.get(&owner_key(match_id)).await?;
        match current_owner {
            Some(owner) if self.kv.exists(&alive_key(&owner)).await? => Ok(false),
            _ => {
                self.kv.del(&owner_key(match_id)).await?;
                let claimed = self.kv.set_nx_ex(&owner_key(match_id), &self.backend_id, ttl).await?;
                if claimed {
                    self.mark_owned(match_id).await?;
                }
                Ok(claimed)
            }
        }
    }

    async fn mark_owned(&self, match_id: i64) -> Result<()> {
        if let Some(mut m) = self.storage.load_match(match_id).await? {
            m.owner_backend_id = Some(self.backend_id.clone());
            m.last_heartbeat = Some(chrono::Utc::now());
            self.storage.save_match(&m).await?;
        }
        Ok(())
    }

    /// Refreshes this backend's liveness record and every match it owns,
    /// per the heartbeat-every-`ownershipTtl/2` supplement in
    /// `SPEC_FULL.md` section E.
    pub async fn heartbeat(&self) -> Result<()> {
        self.kv.set_ex(&alive_key(&self.backend_id), "1", self.ownership_ttl.as_secs()).await?;
        for match_id in self.storage.match_ids_owned_by(&self.backend_id).await? {
            self.kv.expire(&owner_key(match_id), self.ownership_ttl.as_secs()).await?;
        }
        Ok(())
    }

    /// `validateOwnership(player, matchId)` - orthogonal to backend
    /// ownership: the player must be a recorded participant.
    pub async fn validate_participant(&self, match_id: i64, summoner_name: &str) -> Result<Match> {
        let m = self.storage.load_match(match_id).await?.ok_or(CoordinatorError::NotInMatch { match_id })?;
        if !m.is_participant(summoner_name) {
            return Err(CoordinatorError::NotInMatch { match_id });
        }
        Ok(m)
    }

    /// Releases every match this backend owns - called on graceful
    /// shutdown, per `SPEC_FULL.md` section E.
    pub async fn release_all_owned_matches(&self) -> Result<()> {
        let owned = self.storage.match_ids_owned_by(&self.backend_id).await?;
        info!(backend_id = %self.backend_id, count = owned.len(), "releasing owned matches on shutdown");
        for match_id in owned {
            self.kv.del(&owner_key(match_id)).await?;
            if let Some(mut m) = self.storage.load_match(match_id).await? {
                m.owner_backend_id = None;
                self.storage.save_match(&m).await?;
            }
        }
        Ok(())
    }

    /// Reconnect restoration (section 4.9): find any non-terminal match
    /// the player belongs to and emit `restore_active_match`.
    pub async fn restore_active_match(&self, summoner_name: &str, match_id: i64) -> Result<()> {
        let m = self.storage.load_match(match_id).await?.ok_or(CoordinatorError::NotInMatch { match_id })?;
        if matches!(m.status, protocol::MatchStatus::Completed | protocol::MatchStatus::Cancelled) {
            return Ok(());
        }
        self.broadcaster
            .send_to(
                &[summoner_name.to_string()],
                "restore_active_match",
                serde_json::json!({"matchId": m.id, "status": m.status, "matchData": m.pick_ban_data}),
            )
            .await
    }
}
