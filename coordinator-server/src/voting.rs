//! C12: voting and rating (section 4.10). Tallies post-game association
//! votes, links the match to an external game id once a linking rule
//! fires, and applies the ELO-style LP update to every participant.
//!
//! relay-server has no post-game concept at all; grounded directly on
//! spec.md section 4.10, using
//! `protocol::rating` for the formula and `gateway.rs` to fetch the
//! external game's payload through a participant's session.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::broadcast::Broadcaster;
use crate::config::SpecialUsers;
use crate::error::Result;
use crate::gateway::GatewayBridge;
use crate::storage::Storage;
use protocol::names::normalize_summoner_name;
use protocol::rating::{lp_delta, Outcome};
use protocol::{Match, MatchStatus, Team, Vote};

const VOTES_TO_LINK: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteOutcome {
    Recorded,
    Linked { external_game_id: String, reason: &'static str },
}

pub struct VotingService {
    storage: Storage,
    broadcaster: Broadcaster,
    gateway: Arc<GatewayBridge>,
    special_users: Arc<SpecialUsers>,
    k_factor: f64,
}

impl VotingService {
    pub fn new(storage: Storage, broadcaster: Broadcaster, gateway: Arc<GatewayBridge>, special_users: Arc<SpecialUsers>, k_factor: f64) -> Self {
        VotingService { storage, broadcaster, gateway, special_users, k_factor }
    }

    /// Casts (or overwrites) a player's vote, broadcasts the updated
    /// tally, and triggers linking if a linking rule just fired.
    pub async fn cast_vote(&self, match_id: i64, player_id: i64, summoner_name: &str, external_game_id: &str) -> Result<VoteOutcome> {
        let name = normalize_summoner_name(summoner_name);
        let vote = Vote {
            match_id,
            player_id,
            summoner_name: name.clone(),
            external_game_id: external_game_id.to_string(),
            voted_at: Utc::now(),
        };
        self.storage.insert_vote(&vote).await?;

        let m = self.storage.load_match(match_id).await?.ok_or(crate::error::CoordinatorError::NotInMatch { match_id })?;
        if m.status == MatchStatus::Completed || m.winner_team.is_some() {
            // Already linked - section 4.10 says subsequent votes are
            // ignored, not just that linking doesn't fire twice.
            return Ok(VoteOutcome::Recorded);
        }
        let votes = self.storage.votes_for_match(match_id).await?;
        self.broadcast_progress(&m, &votes).await;

        if self.special_users.is_special(&name).await {
            self.link(&m, external_game_id, "privileged_voter").await?;
            return Ok(VoteOutcome::Linked { external_game_id: external_game_id.to_string(), reason: "privileged_voter" });
        }

        let tallies = tally(&votes);
        if let Some((winning_id, count)) = tallies.iter().max_by_key(|(_, c)| **c) {
            if *count >= VOTES_TO_LINK {
                self.link(&m, winning_id, "majority_vote").await?;
                return Ok(VoteOutcome::Linked { external_game_id: winning_id.clone(), reason: "majority_vote" });
            }
        }
        Ok(VoteOutcome::Recorded)
    }

    async fn broadcast_progress(&self, m: &Match, votes: &[Vote]) {
        let tallies = tally(votes);
        let voters: Vec<String> = votes.iter().map(|v| v.summoner_name.clone()).collect();
        let targets: Vec<String> = m.all_players().map(|p| p.summoner_name.clone()).collect();
        let _ = self
            .broadcaster
            .send_to(&targets, "match_vote_progress", serde_json::json!({"matchId": m.id, "votes": tallies, "voters": voters}))
            .await;
    }

    /// Fetches the winning external game's payload through any
    /// participant's gateway, derives the winner, and finalizes the match.
    async fn link(&self, m: &Match, external_game_id: &str, reason: &'static str) -> Result<()> {
        let any_participant = m.all_players().next().map(|p| p.summoner_name.clone());
        let Some(participant) = any_participant else {
            warn!(match_id = m.id, "cannot link: match has no participants");
            return Ok(());
        };

        let response = self
            .gateway
            .call_game_client(&participant, "GET", &format!("/lol-match-history/v1/games/{external_game_id}"), serde_json::json!({}), None)
            .await?;

        let external_team_number = response.body.get("teamId").and_then(|v| v.as_i64()).unwrap_or(100) as i32;
        let winner_team = Team::from_external_team_number(external_team_number).unwrap_or(Team::One);

        let mut completed = m.clone();
        completed.status = MatchStatus::Completed;
        completed.winner_team = Some(winner_team);
        completed.linked_external_game_id = Some(external_game_id.to_string());

        self.apply_rating_update(&mut completed, winner_team).await;
        let updated_players = self.updated_players(&completed).await;
        self.storage.finalize_match(&completed, &updated_players).await?;

        self.broadcaster
            .send_to(
                &completed.all_players().map(|p| p.summoner_name.clone()).collect::<Vec<_>>(),
                "match_linked",
                serde_json::json!({"matchId": completed.id, "externalGameId": external_game_id, "winnerTeam": winner_team.as_number(), "reason": reason}),
            )
            .await
    }

    /// Step 2-4 of section 4.10's rating update. Any failure here is
    /// logged and swallowed: rating update must never block finalization.
    async fn apply_rating_update(&self, m: &mut Match, winner_team: Team) {
        let avg = |team: Team| -> i64 {
            let roster = m.team(team);
            if roster.is_empty() { 0 } else { roster.iter().map(|p| p.mmr as i64).sum::<i64>() / roster.len() as i64 }
        };
        let avg_one = avg(Team::One);
        let avg_two = avg(Team::Two);

        let mut lp_changes: HashMap<String, i32> = HashMap::new();
        for (team, roster, opposing_avg) in [(Team::One, m.team(Team::One).to_vec(), avg_two), (Team::Two, m.team(Team::Two).to_vec(), avg_one)] {
            let outcome = if team == winner_team { Outcome::Win } else { Outcome::Loss };
            for player in &roster {
                let lp = lp_delta(player.mmr, opposing_avg as i32, outcome, self.k_factor);
                lp_changes.insert(player.summoner_name.clone(), lp);
            }
        }

        let total_lp: i32 = lp_changes.values().map(|lp| lp.abs()).sum();
        m.lp_changes = lp_changes.into_iter().collect();
        m.total_lp = total_lp;
    }

    /// Loads each participant's persistent `Player` record and applies its
    /// computed LP delta, returning the updated records for the storage
    /// transaction. Missing player records are skipped with a warning
    /// rather than failing finalization.
    async fn updated_players(&self, m: &Match) -> Vec<protocol::Player> {
        let mut updated = Vec::new();
        let won_by = |team_summoners: &[String], name: &str| team_summoners.iter().any(|s| s == name);
        let team_one: Vec<String> = m.team(Team::One).iter().map(|p| p.summoner_name.clone()).collect();

        for player in m.all_players() {
            let lp = match m.lp_changes.get(&player.summoner_name) {
                Some(lp) => *lp,
                None => continue,
            };
            match self.storage.find_player_by_summoner_name(&player.summoner_name).await {
                Ok(Some(mut record)) => {
                    let won = (won_by(&team_one, &player.summoner_name) && m.winner_team == Some(Team::One))
                        || (!won_by(&team_one, &player.summoner_name) && m.winner_team == Some(Team::Two));
                    record.apply_lp_delta(lp, won);
                    updated.push(record);
                }
                Ok(None) => warn!(summoner = %player.summoner_name, "no persistent player record, skipping LP apply"),
                Err(e) => error!(?e, summoner = %player.summoner_name, "failed to load player record for LP apply"),
            }
        }
        updated
    }
}

fn tally(votes: &[Vote]) -> HashMap<String, usize> {
    let mut tallies = HashMap::new();
    for v in votes {
        *tallies.entry(v.external_game_id.clone()).or_insert(0) += 1;
    }
    tallies
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tally_counts_votes_per_external_id() {
        let votes = vec![
            Vote { match_id: 1, player_id: 1, summoner_name: "a".into(), external_game_id: "X".into(), voted_at: Utc::now() },
            Vote { match_id: 1, player_id: 2, summoner_name: "b".into(), external_game_id: "X".into(), voted_at: Utc::now() },
            Vote { match_id: 1, player_id: 3, summoner_name: "c".into(), external_game_id: "Y".into(), voted_at: Utc::now() },
        ];
        let tallies = tally(&votes);
        assert_eq!(tallies["X"], 2);
        assert_eq!(tallies["Y"], 1);
    }
}
