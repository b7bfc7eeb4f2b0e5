//! C9: match acceptance (section 4.7). Holds a proposal open for a finite
//! window while each of the ten players accepts or declines.
//!
//! Acceptance progress has no entry in section 6's persisted/KV layout
//! (unlike sessions, outbox, or ownership), and the window is short (30s
//! default) - it's tracked in-process per match, behind the per-match
//! critical section relay-server's `lobby.rs::Room` pattern uses for its
//! mutable state. A crash mid-window simply lets the window lapse; no
//! handoff has happened yet, so there's nothing to reconcile on restart.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::broadcast::Broadcaster;
use crate::error::{CoordinatorError, Result};
use protocol::names::normalize_summoner_name;
use protocol::RosterPlayer;

/// Minimal capability the draft engine exposes to this component, per
/// section 9's dependency-inversion note (consumers get the smallest
/// interface they need, not a reference to the whole engine).
#[async_trait::async_trait]
pub trait DraftHandoff: Send + Sync {
    async fn start_draft(&self, match_id: i64, team_one: Vec<RosterPlayer>, team_two: Vec<RosterPlayer>) -> Result<()>;
}

struct Window {
    participants: HashSet<String>,
    accepted: HashSet<String>,
    declined: bool,
    deadline: Instant,
}

pub struct AcceptanceTracker {
    windows: Mutex<HashMap<i64, Window>>,
    broadcaster: Broadcaster,
    draft: Arc<dyn DraftHandoff>,
    accept_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptanceDecision {
    Progress { accepted: usize, total: usize },
    AllAccepted,
    AlreadyDecided,
}

impl AcceptanceTracker {
    pub fn new(broadcaster: Broadcaster, draft: Arc<dyn DraftHandoff>, accept_timeout: Duration) -> Self {
        AcceptanceTracker { windows: Mutex::new(HashMap::new()), broadcaster, draft, accept_timeout }
    }

    pub async fn open_window(&self, match_id: i64, participants: &[String]) {
        let names: HashSet<String> = participants.iter().map(|n| normalize_summoner_name(n)).collect();
        let window = Window {
            participants: names,
            accepted: HashSet::new(),
            declined: false,
            deadline: Instant::now() + self.accept_timeout,
        };
        self.windows.lock().await.insert(match_id, window);
    }

    /// `acceptMatch` - idempotent per player.
    pub async fn accept(&self, match_id: i64, player: &str, team_one: &[RosterPlayer], team_two: &[RosterPlayer]) -> Result<AcceptanceDecision> {
        let name = normalize_summoner_name(player);
        let mut windows = self.windows.lock().await;
        let window = windows.get_mut(&match_id).ok_or(CoordinatorError::NotInMatch { match_id })?;
        if !window.participants.contains(&name) {
            return Err(CoordinatorError::NotInMatch { match_id });
        }
        if window.declined {
            return Ok(AcceptanceDecision::AlreadyDecided);
        }
        window.accepted.insert(name);
        let accepted = window.accepted.len();
        let total = window.participants.len();
        let all_in = accepted == total;
        drop(windows);

        self.broadcast_progress(match_id, accepted, total).await;

        if all_in {
            self.windows.lock().await.remove(&match_id);
            self.draft.start_draft(match_id, team_one.to_vec(), team_two.to_vec()).await?;
            Ok(AcceptanceDecision::AllAccepted)
        } else {
            Ok(AcceptanceDecision::Progress { accepted, total })
        }
    }

    /// `declineMatch` - idempotent per player; any decline cancels the
    /// whole cohort. Returns the non-declining participants so the caller
    /// can return them to the queue ahead of new arrivals (section 4.7).
    pub async fn decline(&self, match_id: i64, player: &str) -> Result<Vec<String>> {
        let name = normalize_summoner_name(player);
        let mut windows = self.windows.lock().await;
        let window = windows.get_mut(&match_id).ok_or(CoordinatorError::NotInMatch { match_id })?;
        if !window.participants.contains(&name) {
            return Err(CoordinatorError::NotInMatch { match_id });
        }
        window.declined = true;
        let participants: Vec<String> = window.participants.iter().cloned().collect();
        let non_decliners: Vec<String> = participants.iter().filter(|p| p.as_str() != name).cloned().collect();
        drop(windows);

        self.windows.lock().await.remove(&match_id);
        self.broadcaster
            .send_to(&participants, "match_cancelled", serde_json::json!({"matchId": match_id, "reason": "declined"}))
            .await?;
        Ok(non_decliners)
    }

    /// Sweeps windows past their deadline, cancelling any that never
    /// reached all ten. Returns the cancelled match ids.
    pub async fn expire_overdue(&self) -> Vec<i64> {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let expired: Vec<i64> = windows
            .iter()
            .filter(|(_, w)| !w.declined && w.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            windows.remove(id);
        }
        expired
    }

    async fn broadcast_progress(&self, match_id: i64, accepted: usize, total: usize) {
        let windows = self.windows.lock().await;
        let targets: Vec<String> = windows.get(&match_id).map(|w| w.participants.iter().cloned().collect()).unwrap_or_default();
        drop(windows);
        let progress = accepted as f64 / total as f64;
        let _ = self
            .broadcaster
            .send_to(&targets, "match_acceptance_progress", serde_json::json!({"matchId": match_id, "accepted": accepted, "total": total, "progress": progress}))
            .await;
    }
}
