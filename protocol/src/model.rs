//! Persisted and in-flight data model: players, matches, draft state,
//! queue entries and votes, as described in section 3.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A lane position. Ordering here is the canonical lane order used for
/// team rosters and for deriving the draft's acting player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    Top,
    Jungle,
    Mid,
    Bot,
    Support,
}

impl Lane {
    pub const ALL: [Lane; 5] = [Lane::Top, Lane::Jungle, Lane::Mid, Lane::Bot, Lane::Support];
}

/// One of the two sides of a match. `Team::One` is "blue", `Team::Two` is
/// "red" in the draft snapshot and in `winnerTeam` encoding (team 100 =
/// blue = 1, team 200 = red = 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Team {
    One,
    Two,
}

impl Team {
    pub fn other(self) -> Team {
        match self {
            Team::One => Team::Two,
            Team::Two => Team::One,
        }
    }

    pub fn as_color(self) -> &'static str {
        match self {
            Team::One => "blue",
            Team::Two => "red",
        }
    }

    pub fn as_number(self) -> u8 {
        match self {
            Team::One => 1,
            Team::Two => 2,
        }
    }

    /// Decodes the external game-client's team number (100 = blue, 200 =
    /// red) into our `Team`.
    pub fn from_external_team_number(n: i32) -> Option<Team> {
        match n {
            100 => Some(Team::One),
            200 => Some(Team::Two),
            _ => None,
        }
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_number())
    }
}

/// A persistent player identity (section 3, "Player").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: i64,
    /// Normalized (trim+lowercase) summoner name; the case-insensitive key.
    pub summoner_name: String,
    /// Stable external id asserted by the game client's local lockfile.
    pub puuid: String,
    pub region: String,
    pub mmr: i32,
    pub custom_lp: i32,
    pub custom_mmr: i32,
    pub custom_games_played: i32,
    pub custom_wins: i32,
    pub custom_losses: i32,
    pub custom_peak_mmr: i32,
}

impl Player {
    pub const DEFAULT_MMR: i32 = 1000;

    pub fn new(summoner_name: &str, puuid: &str, region: &str) -> Self {
        let summoner_name = crate::names::normalize_summoner_name(summoner_name);
        Player {
            id: 0,
            summoner_name,
            puuid: puuid.to_string(),
            region: region.to_string(),
            mmr: Self::DEFAULT_MMR,
            custom_lp: 0,
            custom_mmr: Self::DEFAULT_MMR,
            custom_games_played: 0,
            custom_wins: 0,
            custom_losses: 0,
            custom_peak_mmr: Self::DEFAULT_MMR,
        }
    }

    /// Applies a computed LP delta to this player's accumulated rating,
    /// per section 4.10's rating update steps.
    pub fn apply_lp_delta(&mut self, lp: i32, won: bool) {
        self.custom_lp += lp;
        self.custom_mmr = self.mmr + self.custom_lp;
        self.custom_games_played += 1;
        if won {
            self.custom_wins += 1;
        } else {
            self.custom_losses += 1;
        }
        if self.custom_mmr > self.custom_peak_mmr {
            self.custom_peak_mmr = self.custom_mmr;
        }
    }
}

/// A player waiting in the matchmaking pool (section 3, "QueueEntry").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub player_id: i64,
    pub summoner_name: String,
    pub region: String,
    pub primary_lane: Lane,
    pub secondary_lane: Lane,
    pub mmr: i32,
    pub joined_at: chrono::DateTime<chrono::Utc>,
}

/// A roster slot: one player assigned a lane on a team.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterPlayer {
    pub summoner_name: String,
    pub player_id: i64,
    pub mmr: i32,
    pub assigned_lane: Lane,
    /// Index within the team (0..5), in lane order. This is the position
    /// used to derive the draft's acting player for a given step.
    pub team_index: u8,
}

/// Status of a [`Match`] as it moves through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    PendingAccept,
    Draft,
    InProgress,
    Completed,
    Cancelled,
}

impl MatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchStatus::PendingAccept => "pending_accept",
            MatchStatus::Draft => "draft",
            MatchStatus::InProgress => "in_progress",
            MatchStatus::Completed => "completed",
            MatchStatus::Cancelled => "cancelled",
        }
    }
}

/// The 10-player cohort, from proposal through completion (section 3,
/// "MatchProposal / Match").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub id: i64,
    pub team_one: Vec<RosterPlayer>,
    pub team_two: Vec<RosterPlayer>,
    pub average_mmr_team_one: i32,
    pub average_mmr_team_two: i32,
    pub status: MatchStatus,
    pub owner_backend_id: Option<String>,
    pub last_heartbeat: Option<chrono::DateTime<chrono::Utc>>,
    /// The draft engine's persisted snapshot (section 3: `pickBanDataJson`),
    /// opaque here - `protocol::draft_order::DraftSnapshot` is its schema.
    pub pick_ban_data: Option<serde_json::Value>,
    pub winner_team: Option<Team>,
    pub linked_external_game_id: Option<String>,
    pub lp_changes: std::collections::BTreeMap<String, i32>,
    pub total_lp: i32,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Match {
    /// All ten participants, team one first, in roster order.
    pub fn all_players(&self) -> impl Iterator<Item = &RosterPlayer> {
        self.team_one.iter().chain(self.team_two.iter())
    }

    pub fn team(&self, team: Team) -> &[RosterPlayer] {
        match team {
            Team::One => &self.team_one,
            Team::Two => &self.team_two,
        }
    }

    pub fn is_participant(&self, summoner_name: &str) -> bool {
        let name = crate::names::normalize_summoner_name(summoner_name);
        self.all_players().any(|p| p.summoner_name == name)
    }

    pub fn participant_team(&self, summoner_name: &str) -> Option<Team> {
        let name = crate::names::normalize_summoner_name(summoner_name);
        if self.team_one.iter().any(|p| p.summoner_name == name) {
            Some(Team::One)
        } else if self.team_two.iter().any(|p| p.summoner_name == name) {
            Some(Team::Two)
        } else {
            None
        }
    }
}

/// A post-game association vote (section 3, "Vote").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub match_id: i64,
    pub player_id: i64,
    pub summoner_name: String,
    pub external_game_id: String,
    pub voted_at: chrono::DateTime<chrono::Utc>,
}
