//! The fixed 20-step ban/pick order (section 3) and the persisted snapshot
//! shape it's recorded into (section 4.8).
//!
//! The exact order is implied rather than spelled out character-for-character
//! in the source material we distilled this from, and two spots in the
//! second ban/pick round read inconsistently across comments there. We pin
//! one concrete order here, as a constant table, rather than re-deriving it
//! per match.

use serde::{Deserialize, Serialize};

use crate::model::{Lane, Team};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Ban,
    Pick,
}

/// One slot of the fixed draft order: which team acts, what kind of action,
/// and which of that team's five roster positions (0..5, lane order) is the
/// one whose turn it is.
#[derive(Debug, Clone, Copy)]
pub struct DraftOrderEntry {
    pub team: Team,
    pub action_type: ActionType,
    pub position: u8,
}

macro_rules! entry {
    ($team:ident, $kind:ident, $pos:expr) => {
        DraftOrderEntry { team: Team::$team, action_type: ActionType::$kind, position: $pos }
    };
}

/// The 20 draft actions in order. Each of a team's five players bans exactly
/// once and picks exactly once; `position` is that player's index into the
/// team roster (lane order: Top, Jungle, Mid, Bot, Support).
pub const DRAFT_ORDER: [DraftOrderEntry; 20] = [
    entry!(One, Ban, 0),   // 0
    entry!(Two, Ban, 0),   // 1
    entry!(One, Ban, 1),   // 2
    entry!(Two, Ban, 1),   // 3
    entry!(One, Ban, 2),   // 4
    entry!(Two, Ban, 2),   // 5
    entry!(One, Pick, 0),  // 6
    entry!(Two, Pick, 0),  // 7
    entry!(Two, Pick, 1),  // 8
    entry!(One, Pick, 1),  // 9
    entry!(One, Pick, 2),  // 10
    entry!(Two, Pick, 2),  // 11
    entry!(One, Ban, 3),   // 12
    entry!(Two, Ban, 3),   // 13
    entry!(One, Ban, 4),   // 14
    entry!(Two, Ban, 4),   // 15
    entry!(Two, Pick, 3),  // 16
    entry!(One, Pick, 3),  // 17
    entry!(Two, Pick, 4),  // 18
    entry!(One, Pick, 4),  // 19
];

pub const DRAFT_LENGTH: usize = DRAFT_ORDER.len();

/// A human/machine readable phase label for a draft index, used in the
/// snapshot and in broadcast payloads.
pub fn phase_for_index(index: usize) -> &'static str {
    match index {
        0..=5 => "ban1",
        6..=11 => "pick1",
        12..=15 => "ban2",
        16..=19 => "pick2",
        _ => "complete",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Completed,
}

/// One entry of a player's `actions[]` list in the persisted snapshot: the
/// single ban or pick assigned to that player.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerActionEntry {
    pub index: usize,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub champion_id: Option<String>,
    pub champion_name: Option<String>,
    pub phase: &'static str,
    pub status: ActionStatus,
}

/// A single roster member as recorded in the snapshot, including the
/// actions assigned to them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub summoner_name: String,
    pub player_id: i64,
    pub mmr: i32,
    pub assigned_lane: Lane,
    pub team_index: u8,
    pub actions: Vec<PlayerActionEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamSnapshot {
    pub name: String,
    pub team_number: u8,
    pub average_mmr: i32,
    pub players: Vec<PlayerSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamsSnapshot {
    pub blue: TeamSnapshot,
    pub red: TeamSnapshot,
}

/// The single authoritative, persisted view of a match's draft - exactly
/// the shape named in section 4.8, nothing more. Downstream components
/// (broadcaster, storage, ownership recovery) consume only this schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftSnapshot {
    pub teams: TeamsSnapshot,
    pub current_index: usize,
    pub current_phase: &'static str,
    pub current_player: Option<String>,
    pub current_team: Option<&'static str>,
    pub current_action_type: Option<ActionType>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_team_position_bans_and_picks_exactly_once() {
        for team in [Team::One, Team::Two] {
            let mut bans = [0u8; 5];
            let mut picks = [0u8; 5];
            for entry in DRAFT_ORDER.iter().filter(|e| e.team == team) {
                match entry.action_type {
                    ActionType::Ban => bans[entry.position as usize] += 1,
                    ActionType::Pick => picks[entry.position as usize] += 1,
                }
            }
            assert_eq!(bans, [1, 1, 1, 1, 1]);
            assert_eq!(picks, [1, 1, 1, 1, 1]);
        }
    }

    #[test]
    fn order_matches_section_3_pattern() {
        let pattern: Vec<(Team, ActionType)> =
            DRAFT_ORDER.iter().map(|e| (e.team, e.action_type)).collect();
        use ActionType::*;
        use Team::*;
        let expected = vec![
            (One, Ban), (Two, Ban), (One, Ban), (Two, Ban), (One, Ban), (Two, Ban),
            (One, Pick), (Two, Pick), (Two, Pick), (One, Pick), (One, Pick), (Two, Pick),
            (One, Ban), (Two, Ban), (One, Ban), (Two, Ban),
            (Two, Pick), (One, Pick), (Two, Pick), (One, Pick),
        ];
        assert_eq!(pattern, expected);
    }

    #[test]
    fn phase_labels_cover_all_indices() {
        assert_eq!(phase_for_index(0), "ban1");
        assert_eq!(phase_for_index(5), "ban1");
        assert_eq!(phase_for_index(6), "pick1");
        assert_eq!(phase_for_index(11), "pick1");
        assert_eq!(phase_for_index(12), "ban2");
        assert_eq!(phase_for_index(15), "ban2");
        assert_eq!(phase_for_index(16), "pick2");
        assert_eq!(phase_for_index(19), "pick2");
    }
}
