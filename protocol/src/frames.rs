//! The gateway message protocol: JSON frames over a persistent bidirectional
//! text channel (section 6). Every frame has a `type` and usually a `data`
//! object; a handful of RPC-shaped frames carry `id`/`method`/`path`/`body`
//! at the top level instead. We model the envelope loosely (a raw `type` +
//! `serde_json::Value`) for inbound parsing, and one concrete struct per
//! outbound frame so the router can't typo a field name.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::draft_order::DraftSnapshot;
use crate::model::{Lane, Team};

/// The generic inbound envelope. The router reads `frame_type` to decide
/// which typed payload to deserialize `data` into.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    #[serde(default)]
    pub data: Value,
    /// Present on RPC-shaped frames (`gameclient_response`,
    /// `identity_confirmed_critical`) instead of nested under `data`.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub body: Option<Value>,
    #[serde(default)]
    pub summoner_name: Option<String>,
    #[serde(default)]
    pub puuid: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdentifyPlayerData {
    pub summoner_name: String,
    pub puuid: String,
    #[serde(default)]
    pub region: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterLcuConnectionData {
    pub port: u16,
    pub auth_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JoinQueueData {
    pub region: String,
    pub primary_lane: Lane,
    pub secondary_lane: Lane,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchIdData {
    pub match_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DraftActionData {
    pub match_id: i64,
    pub action_index: usize,
    pub champion_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DraftConfirmData {
    pub match_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AcknowledgeData {
    pub match_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoteData {
    pub match_id: i64,
    pub external_game_id: String,
}

/// Outbound `queue_status`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatusFrame {
    #[serde(rename = "type")]
    pub frame_type: &'static str,
    pub data: Vec<crate::model::QueueEntry>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl QueueStatusFrame {
    pub fn new(data: Vec<crate::model::QueueEntry>) -> Self {
        QueueStatusFrame { frame_type: "queue_status", data, timestamp: chrono::Utc::now() }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchFoundData {
    pub match_id: i64,
    pub team1: Vec<crate::model::RosterPlayer>,
    pub team2: Vec<crate::model::RosterPlayer>,
    pub avg_mmr_per_team: [i32; 2],
    pub deadline: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchFoundFrame {
    #[serde(rename = "type")]
    pub frame_type: &'static str,
    pub data: MatchFoundData,
    pub target_summoner: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchAcceptanceProgressData {
    pub match_id: i64,
    pub accepted: usize,
    pub total: usize,
    pub progress: f32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchAcceptanceProgressFrame {
    #[serde(rename = "type")]
    pub frame_type: &'static str,
    pub data: MatchAcceptanceProgressData,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchIdFrame {
    #[serde(rename = "type")]
    pub frame_type: &'static str,
    pub data: MatchIdData2,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchIdData2 {
    pub match_id: i64,
}

impl MatchIdFrame {
    pub fn match_accepted(match_id: i64) -> Self {
        MatchIdFrame { frame_type: "match_accepted", data: MatchIdData2 { match_id } }
    }
    pub fn game_ready(match_id: i64) -> Self {
        MatchIdFrame { frame_type: "game_ready", data: MatchIdData2 { match_id } }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchCancelledData {
    pub match_id: i64,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchCancelledFrame {
    #[serde(rename = "type")]
    pub frame_type: &'static str,
    pub data: MatchCancelledData,
}

impl MatchCancelledFrame {
    pub fn new(match_id: i64, reason: impl Into<String>) -> Self {
        MatchCancelledFrame {
            frame_type: "match_cancelled",
            data: MatchCancelledData { match_id, reason: reason.into() },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftUpdatedFrame {
    #[serde(rename = "type")]
    pub frame_type: &'static str,
    pub data: DraftSnapshot,
    pub time_remaining: f32,
}

impl DraftUpdatedFrame {
    pub fn new(data: DraftSnapshot, time_remaining: f32) -> Self {
        DraftUpdatedFrame { frame_type: "draft_updated", data, time_remaining }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStartedData {
    pub match_id: i64,
    pub game_data: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStartedFrame {
    #[serde(rename = "type")]
    pub frame_type: &'static str,
    pub data: GameStartedData,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchVoteProgressData {
    pub match_id: i64,
    pub votes: std::collections::BTreeMap<String, usize>,
    pub voters: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchVoteProgressFrame {
    #[serde(rename = "type")]
    pub frame_type: &'static str,
    pub data: MatchVoteProgressData,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchLinkedData {
    pub match_id: i64,
    pub external_game_id: String,
    pub winner_team: u8,
    pub reason: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchLinkedFrame {
    #[serde(rename = "type")]
    pub frame_type: &'static str,
    pub data: MatchLinkedData,
}

impl MatchLinkedFrame {
    pub fn new(match_id: i64, external_game_id: String, winner_team: Team, reason: &'static str) -> Self {
        MatchLinkedFrame {
            frame_type: "match_linked",
            data: MatchLinkedData { match_id, external_game_id, winner_team: winner_team.as_number(), reason },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreActiveMatchData {
    pub match_id: i64,
    pub status: crate::model::MatchStatus,
    pub match_data: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreActiveMatchFrame {
    #[serde(rename = "type")]
    pub frame_type: &'static str,
    pub data: RestoreActiveMatchData,
}

/// Outbound `gameclient_request` - the RPC bridge's call into a player's
/// local game client, tunnelled through their gateway.
#[derive(Debug, Clone, Serialize)]
pub struct GameClientRequestFrame {
    #[serde(rename = "type")]
    pub frame_type: &'static str,
    pub id: String,
    pub method: String,
    pub path: String,
    pub body: Value,
}

/// Outbound `confirm_identity_critical` - the critical-action confirmation
/// challenge described in section 4.4.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmIdentityCriticalFrame {
    #[serde(rename = "type")]
    pub frame_type: &'static str,
    pub id: String,
    pub expected_summoner: String,
    pub action_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimpleFrame {
    #[serde(rename = "type")]
    pub frame_type: &'static str,
}

impl SimpleFrame {
    pub fn pong() -> Self {
        SimpleFrame { frame_type: "pong" }
    }
    pub fn heartbeat_ack() -> Self {
        SimpleFrame { frame_type: "heartbeat_ack" }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorFrame {
    #[serde(rename = "type")]
    pub frame_type: &'static str,
    pub error: String,
    pub message: String,
}

impl ErrorFrame {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        ErrorFrame { frame_type: "error", error: error.into(), message: message.into() }
    }
}
