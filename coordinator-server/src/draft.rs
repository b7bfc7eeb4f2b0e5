//! C10: the draft engine (section 4.8). Runs the fixed 20-step ban/pick
//! state machine for one match: per-step authority, per-step timer,
//! champion-uniqueness, and the exact persisted snapshot shape.
//!
//! Per-match mutable state lives behind a `tokio::sync::Mutex`, the same
//! shape as relay-server's `lobby.rs::Room` - suspension points (storage
//! writes, broadcasts) happen without holding the lock across the await,
//! per section 5's "no suspension point may be held under a per-match
//! lock longer than the individual call" rule.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::acceptance::DraftHandoff;
use crate::broadcast::Broadcaster;
use crate::error::{CoordinatorError, Result};
use crate::storage::Storage;
use protocol::draft_order::{
    ActionStatus, ActionType, DraftSnapshot, PlayerActionEntry, PlayerSnapshot, TeamSnapshot, TeamsSnapshot,
    DRAFT_LENGTH, DRAFT_ORDER,
};
use protocol::names::normalize_summoner_name;
use protocol::{MatchStatus, RosterPlayer, Team};

#[derive(Debug, Clone)]
struct ActionSlot {
    champion_id: Option<String>,
    champion_name: Option<String>,
    status: ActionStatus,
}

struct RunningDraft {
    team_one: Vec<RosterPlayer>,
    team_two: Vec<RosterPlayer>,
    actions: [ActionSlot; DRAFT_LENGTH],
    current_index: usize,
    deadline: Instant,
    confirmations: std::collections::HashSet<String>,
}

impl RunningDraft {
    fn new(team_one: Vec<RosterPlayer>, team_two: Vec<RosterPlayer>, step_timeout: Duration) -> Self {
        const EMPTY: ActionSlot = ActionSlot { champion_id: None, champion_name: None, status: ActionStatus::Pending };
        RunningDraft {
            team_one,
            team_two,
            actions: [EMPTY; DRAFT_LENGTH],
            current_index: 0,
            deadline: Instant::now() + step_timeout,
            confirmations: std::collections::HashSet::new(),
        }
    }

    fn roster(&self, team: Team) -> &[RosterPlayer] {
        match team {
            Team::One => &self.team_one,
            Team::Two => &self.team_two,
        }
    }

    fn acting_player(&self, index: usize) -> Option<(&RosterPlayer, Team, ActionType)> {
        let entry = DRAFT_ORDER.get(index)?;
        let roster = self.roster(entry.team);
        roster.get(entry.position as usize).map(|p| (p, entry.team, entry.action_type))
    }

    fn champion_taken(&self, champion_id: &str) -> bool {
        self.actions.iter().any(|a| a.champion_id.as_deref() == Some(champion_id))
    }

    fn time_remaining(&self, step_timeout: Duration) -> Duration {
        self.deadline.saturating_duration_since(Instant::now()).min(step_timeout)
    }

    fn to_snapshot(&self) -> DraftSnapshot {
        let team_snapshot = |team: Team, name: &str| -> TeamSnapshot {
            let roster = self.roster(team);
            let average_mmr = if roster.is_empty() { 0 } else { roster.iter().map(|p| p.mmr as i64).sum::<i64>() as i32 / roster.len() as i32 };
            let players = roster
                .iter()
                .enumerate()
                .map(|(position, player)| {
                    let actions = DRAFT_ORDER
                        .iter()
                        .enumerate()
                        .filter(|(_, e)| e.team == team && e.position as usize == position)
                        .map(|(index, entry)| {
                            let slot = &self.actions[index];
                            PlayerActionEntry {
                                index,
                                action_type: entry.action_type,
                                champion_id: slot.champion_id.clone(),
                                champion_name: slot.champion_name.clone(),
                                phase: protocol::draft_order::phase_for_index(index),
                                status: slot.status,
                            }
                        })
                        .collect();
                    PlayerSnapshot {
                        summoner_name: player.summoner_name.clone(),
                        player_id: player.player_id,
                        mmr: player.mmr,
                        assigned_lane: player.assigned_lane,
                        team_index: player.team_index,
                        actions,
                    }
                })
                .collect();
            TeamSnapshot { name: name.to_string(), team_number: team.as_number(), average_mmr, players }
        };

        let (current_player, current_team, current_action_type) = match self.acting_player(self.current_index) {
            Some((player, team, action_type)) => (Some(player.summoner_name.clone()), Some(team.as_color()), Some(action_type)),
            None => (None, None, None),
        };

        DraftSnapshot {
            teams: TeamsSnapshot { blue: team_snapshot(Team::One, "blue"), red: team_snapshot(Team::Two, "red") },
            current_index: self.current_index,
            current_phase: protocol::draft_order::phase_for_index(self.current_index),
            current_player,
            current_team,
            current_action_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Accepted,
    Rejected(&'static str),
}

pub struct DraftEngine {
    running: Mutex<HashMap<i64, RunningDraft>>,
    storage: Storage,
    broadcaster: Broadcaster,
    step_timeout: Duration,
}

impl DraftEngine {
    pub fn new(storage: Storage, broadcaster: Broadcaster, step_timeout: Duration) -> Arc<Self> {
        Arc::new(DraftEngine { running: Mutex::new(HashMap::new()), storage, broadcaster, step_timeout })
    }

    /// `processAction(matchId, actionIndex, championId, byPlayer)`.
    pub async fn process_action(
        &self,
        match_id: i64,
        action_index: usize,
        champion_id: &str,
        champion_name: &str,
        by_player: &str,
    ) -> Result<ProcessOutcome> {
        let by_player = normalize_summoner_name(by_player);
        let snapshot_and_players = {
            let mut running = self.running.lock().await;
            let draft = match running.get_mut(&match_id) {
                Some(d) => d,
                None => return Err(CoordinatorError::NotInMatch { match_id }),
            };

            if action_index != draft.current_index {
                return Ok(ProcessOutcome::Rejected("wrong_index"));
            }
            if draft.actions[action_index].status == ActionStatus::Completed {
                return Ok(ProcessOutcome::Rejected("already_completed"));
            }
            let Some((expected_player, _, _)) = draft.acting_player(action_index) else {
                return Ok(ProcessOutcome::Rejected("index_out_of_range"));
            };
            if normalize_summoner_name(&expected_player.summoner_name) != by_player {
                return Ok(ProcessOutcome::Rejected("not_expected_player"));
            }
            if draft.champion_taken(champion_id) {
                return Ok(ProcessOutcome::Rejected("champion_already_taken"));
            }

            draft.actions[action_index] = ActionSlot {
                champion_id: Some(champion_id.to_string()),
                champion_name: Some(champion_name.to_string()),
                status: ActionStatus::Completed,
            };
            draft.current_index += 1;
            draft.deadline = Instant::now() + self.step_timeout;

            (draft.to_snapshot(), all_participants(draft))
        };

        self.persist_and_broadcast(match_id, snapshot_and_players).await?;
        Ok(ProcessOutcome::Accepted)
    }

    /// `confirmDraft(matchId, player)` - ready-up after step 19.
    pub async fn confirm_draft(&self, match_id: i64, player: &str) -> Result<bool> {
        let name = normalize_summoner_name(player);
        let mut running = self.running.lock().await;
        let draft = running.get_mut(&match_id).ok_or(CoordinatorError::NotInMatch { match_id })?;
        if draft.current_index < DRAFT_LENGTH {
            return Err(CoordinatorError::ProtocolViolation { reason: "draft not yet complete".to_string() });
        }
        draft.confirmations.insert(name);
        let total = draft.team_one.len() + draft.team_two.len();
        let all_confirmed = draft.confirmations.len() == total;
        if all_confirmed {
            running.remove(&match_id);
            if let Some(mut completed) = self.storage.load_match(match_id).await? {
                completed.status = MatchStatus::InProgress;
                self.storage.save_match(&completed).await?;
            }
        }
        Ok(all_confirmed)
    }

    /// `snapshot(matchId)`, paired with the freshly recomputed
    /// `timeRemaining` (section 4.8: never rely solely on the stored
    /// deadline).
    pub async fn snapshot(&self, match_id: i64) -> Result<(DraftSnapshot, Duration)> {
        let running = self.running.lock().await;
        let draft = running.get(&match_id).ok_or(CoordinatorError::NotInMatch { match_id })?;
        Ok((draft.to_snapshot(), draft.time_remaining(self.step_timeout)))
    }

    /// Resolves any step whose timer has lapsed with the deterministic
    /// filler policy decided for the open question in section 9: the
    /// acting player's own champion preference (none recorded here, since
    /// preferences aren't part of this spec's data model) falls through
    /// to the lowest not-yet-taken champion id from a small fixed pool.
    /// Deterministic so draft-timeout tests never need a seeded PRNG.
    pub async fn resolve_expired_steps(&self, champion_pool: &[&str]) -> Vec<i64> {
        let mut resolved = Vec::new();
        let now = Instant::now();
        let match_ids: Vec<i64> = {
            let running = self.running.lock().await;
            running.iter().filter(|(_, d)| d.deadline <= now && d.current_index < DRAFT_LENGTH).map(|(id, _)| *id).collect()
        };
        for match_id in match_ids {
            let snapshot_and_players = {
                let mut running = self.running.lock().await;
                let Some(draft) = running.get_mut(&match_id) else { continue };
                if draft.deadline > Instant::now() || draft.current_index >= DRAFT_LENGTH {
                    continue;
                }
                let index = draft.current_index;
                let filler = champion_pool.iter().find(|c| !draft.champion_taken(c)).copied().unwrap_or("unknown");
                warn!(match_id, index, champion = filler, "draft step timed out, applying filler pick");
                draft.actions[index] = ActionSlot {
                    champion_id: Some(filler.to_string()),
                    champion_name: Some(filler.to_string()),
                    status: ActionStatus::Completed,
                };
                draft.current_index += 1;
                draft.deadline = Instant::now() + self.step_timeout;
                (draft.to_snapshot(), all_participants(draft))
            };
            if self.persist_and_broadcast(match_id, snapshot_and_players).await.is_ok() {
                resolved.push(match_id);
            }
        }
        resolved
    }

    async fn persist_and_broadcast(&self, match_id: i64, (snapshot, participants): (DraftSnapshot, Vec<String>)) -> Result<()> {
        if let Some(mut persisted) = self.storage.load_match(match_id).await? {
            persisted.pick_ban_data = Some(serde_json::to_value(&snapshot).unwrap_or_default());
            persisted.status = MatchStatus::Draft;
            self.storage.save_match(&persisted).await?;
        }
        let time_remaining_secs = self.step_timeout.as_secs();
        let mut extra = serde_json::Map::new();
        extra.insert("timeRemaining".to_string(), serde_json::json!(time_remaining_secs));
        self.broadcaster
            .send_to_with_extra(&participants, "draft_updated", serde_json::to_value(&snapshot).unwrap_or_default(), extra)
            .await
    }
}

fn all_participants(draft: &RunningDraft) -> Vec<String> {
    draft.team_one.iter().chain(draft.team_two.iter()).map(|p| p.summoner_name.clone()).collect()
}

#[async_trait::async_trait]
impl DraftHandoff for DraftEngine {
    async fn start_draft(&self, match_id: i64, team_one: Vec<RosterPlayer>, team_two: Vec<RosterPlayer>) -> Result<()> {
        info!(match_id, "draft starting");
        let draft = RunningDraft::new(team_one, team_two, self.step_timeout);
        let snapshot = draft.to_snapshot();
        let participants = all_participants(&draft);
        self.running.lock().await.insert(match_id, draft);

        if let Some(mut persisted) = self.storage.load_match(match_id).await? {
            persisted.status = MatchStatus::Draft;
            persisted.pick_ban_data = Some(serde_json::to_value(&snapshot).unwrap_or_default());
            self.storage.save_match(&persisted).await?;
        }
        let mut extra = serde_json::Map::new();
        extra.insert("timeRemaining".to_string(), serde_json::json!(self.step_timeout.as_secs()));
        self.broadcaster
            .send_to_with_extra(&participants, "draft_updated", serde_json::to_value(&snapshot).unwrap_or_default(), extra)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::Lane;

    fn roster(prefix: &str) -> Vec<RosterPlayer> {
        Lane::ALL
            .iter()
            .enumerate()
            .map(|(i, lane)| RosterPlayer {
                summoner_name: format!("{prefix}{i}"),
                player_id: i as i64,
                mmr: 1000,
                assigned_lane: *lane,
                team_index: i as u8,
            })
            .collect()
    }

    fn fresh_draft() -> RunningDraft {
        RunningDraft::new(roster("blue"), roster("red"), Duration::from_secs(30))
    }

    #[test]
    fn first_action_expects_team_one_position_zero() {
        let draft = fresh_draft();
        let (player, team, action_type) = draft.acting_player(0).unwrap();
        assert_eq!(player.summoner_name, "blue0");
        assert_eq!(team, Team::One);
        assert_eq!(action_type, ActionType::Ban);
    }

    #[test]
    fn champion_taken_checks_across_all_slots() {
        let mut draft = fresh_draft();
        draft.actions[0] = ActionSlot { champion_id: Some("ahri".to_string()), champion_name: Some("Ahri".to_string()), status: ActionStatus::Completed };
        assert!(draft.champion_taken("ahri"));
        assert!(!draft.champion_taken("zed"));
    }

    #[test]
    fn snapshot_reflects_current_index_and_acting_player() {
        let draft = fresh_draft();
        let snapshot = draft.to_snapshot();
        assert_eq!(snapshot.current_index, 0);
        assert_eq!(snapshot.current_player.as_deref(), Some("blue0"));
        assert_eq!(snapshot.current_team, Some("blue"));
    }
}
