//! C6: message router and inbound dispatch (section 4.4). Parses every
//! inbound frame, enforces the two universal preconditions, and dispatches
//! to the component that owns the requested behavior.
//!
//! Grounded on relay-server's `processing_module.rs` single-byte dispatch
//! match, generalized from a fixed binary opcode set to JSON `type` strings,
//! with the precondition checks relay-server leaves to the caller made
//! explicit here as `require_identity`/`validate_participant`.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::Message;
use tokio::sync::{oneshot, Mutex};
use tracing::{error, warn};
use uuid::Uuid;

use crate::acceptance::AcceptanceDecision;
use crate::app::AppState;
use crate::draft::ProcessOutcome;
use crate::error::{CoordinatorError, Result};
use crate::identity::{claims_match, RegisterOutcome};
use crate::outbox::ttl_for_event_type;
use protocol::frames::*;
use protocol::names::{custom_session_id, is_bot_name, normalize_summoner_name};
use protocol::Player;

/// In-flight `confirm_identity_critical` challenges (section 4.4), keyed by
/// request id. Grounded on `gateway.rs`'s oneshot-correlation table,
/// narrowed from "arbitrary RPC response" to a single confirm/deny.
#[derive(Default)]
pub struct CriticalConfirmations {
    pending: Mutex<HashMap<String, oneshot::Sender<()>>>,
}

impl CriticalConfirmations {
    pub fn new() -> Self {
        CriticalConfirmations::default()
    }

    /// Issues the challenge over the caller's own session and blocks up to
    /// the configured timeout for a matching `identity_confirmed_critical`
    /// reply. Callers must skip this for bots themselves (bots never hold
    /// a session to challenge).
    pub async fn require(&self, state: &AppState, random_session_id: &str, summoner_name: &str, action_type: &str) -> bool {
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);

        let challenge = ConfirmIdentityCriticalFrame {
            frame_type: "confirm_identity_critical",
            id: id.clone(),
            expected_summoner: summoner_name.to_string(),
            action_type: action_type.to_string(),
        };
        let text = serde_json::to_string(&challenge).unwrap_or_default();
        if !state.connections.send(random_session_id, Message::Text(text.into())).await {
            self.pending.lock().await.remove(&id);
            return false;
        }

        match tokio::time::timeout(state.settings.critical_confirm_timeout, rx).await {
            Ok(Ok(())) => true,
            _ => {
                self.pending.lock().await.remove(&id);
                false
            }
        }
    }

    /// Completes a pending challenge. A late or unknown id is dropped
    /// silently - the challenger has already observed a timeout.
    pub async fn confirm(&self, id: &str) {
        if let Some(tx) = self.pending.lock().await.remove(id) {
            let _ = tx.send(());
        }
    }
}

/// Parses and dispatches one inbound text frame. Any error surfaces as an
/// `error` wire frame back to the sender, except [`CoordinatorError::AuthMismatch`]
/// which is dropped silently per section 7.
pub async fn dispatch(state: &Arc<AppState>, random_session_id: &str, raw: &str) {
    let frame: InboundFrame = match serde_json::from_str(raw) {
        Ok(f) => f,
        Err(e) => {
            warn!(?e, session = random_session_id, "malformed inbound frame");
            send_error(state, random_session_id, CoordinatorError::ProtocolViolation { reason: "malformed frame".to_string() }).await;
            return;
        }
    };

    if let Err(err) = handle(state, random_session_id, &frame).await {
        if matches!(err, CoordinatorError::AuthMismatch) {
            warn!(session = random_session_id, "dropping message with mismatched identity claim");
            return;
        }
        send_error(state, random_session_id, err).await;
    }
}

async fn send_error(state: &AppState, random_session_id: &str, err: CoordinatorError) {
    error!(?err, session = random_session_id, "inbound handler failed");
    let frame = ErrorFrame::new(err.wire_kind(), err.to_string());
    let text = serde_json::to_string(&frame).unwrap_or_default();
    state.connections.send(random_session_id, Message::Text(text.into())).await;
}

fn parse<T: serde::de::DeserializeOwned>(data: &serde_json::Value) -> Result<T> {
    serde_json::from_value(data.clone()).map_err(|e| CoordinatorError::ProtocolViolation { reason: e.to_string() })
}

fn claimed_summoner(frame: &InboundFrame) -> Result<String> {
    frame
        .summoner_name
        .clone()
        .ok_or_else(|| CoordinatorError::ProtocolViolation { reason: "missing summonerName".to_string() })
}

/// Precondition 1 (anti-spoof): the session's registered identity must
/// match what the message claims. Returns the registered (normalized) name.
async fn require_identity(state: &AppState, random_session_id: &str, claimed: &str) -> Result<String> {
    let registered = state
        .sessions
        .get_summoner_by_session(random_session_id)
        .await?
        .ok_or(CoordinatorError::AuthMismatch)?;
    if !claims_match(&registered, claimed) {
        return Err(CoordinatorError::AuthMismatch);
    }
    Ok(registered)
}

async fn handle(state: &Arc<AppState>, random_session_id: &str, frame: &InboundFrame) -> Result<()> {
    match frame.frame_type.as_str() {
        "identify_player" | "electron_identify" => handle_identify(state, random_session_id, frame).await,
        "register_lcu_connection" => handle_register_lcu(state, random_session_id, frame).await,
        "gameclient_response" => handle_gameclient_response(state, frame).await,
        "heartbeat" | "ping" | "pong" => handle_heartbeat(state, random_session_id, frame).await,
        "join_queue" => handle_join_queue(state, random_session_id, frame).await,
        "leave_queue" => handle_leave_queue(state, random_session_id, frame).await,
        "accept_match" | "decline_match" => handle_accept_decline(state, random_session_id, frame).await,
        "draft_action" => handle_draft_action(state, random_session_id, frame).await,
        "draft_confirm" => handle_draft_confirm(state, random_session_id, frame).await,
        "draft_snapshot" => handle_draft_snapshot(state, random_session_id, frame).await,
        "cast_vote" => handle_cast_vote(state, random_session_id, frame).await,
        "reconnect_check_response" => handle_reconnect_response(state, random_session_id, frame).await,
        "identity_confirmed_critical" => {
            if let Some(id) = &frame.id {
                state.critical.confirm(id).await;
            }
            Ok(())
        }
        other if other.ends_with("_acknowledged") => handle_acknowledged(state, random_session_id, frame).await,
        other => {
            warn!(frame_type = other, "unrecognized inbound frame type");
            Ok(())
        }
    }
}

async fn handle_identify(state: &Arc<AppState>, random_session_id: &str, frame: &InboundFrame) -> Result<()> {
    let payload: IdentifyPlayerData = parse(&frame.data)?;
    let remote_addr = state.connections.get(random_session_id).await.and_then(|c| c.remote_addr.clone());

    match state.sessions.register_session(random_session_id, &payload.summoner_name, remote_addr, None).await? {
        RegisterOutcome::Duplicate { existing_session_id } => {
            return Err(CoordinatorError::DuplicateInstance { existing_session_id });
        }
        RegisterOutcome::Accepted => {}
    }

    let region = payload.region.unwrap_or_else(|| "na".to_string());
    match state.storage.find_player_by_summoner_name(&payload.summoner_name).await? {
        None => {
            // section 4.4's puuid 1-1 constraint: a puuid already bound to a
            // different summoner name can't be claimed by this one.
            if let Some(existing) = state.storage.find_player_by_puuid(&payload.puuid).await? {
                if existing.summoner_name != normalize_summoner_name(&payload.summoner_name) {
                    return Err(CoordinatorError::ProtocolViolation { reason: "puuid already bound to a different summoner name".to_string() });
                }
            }
            let player = Player::new(&payload.summoner_name, &payload.puuid, &region);
            state.storage.upsert_player(&player).await?;
        }
        Some(existing) if existing.puuid != payload.puuid => {
            return Err(CoordinatorError::ProtocolViolation { reason: "puuid does not match this summoner name's recorded identity".to_string() });
        }
        Some(_) => {}
    }

    let custom_id = custom_session_id(&payload.summoner_name);
    for event in state.outbox.get_pending_events(&custom_id).await? {
        let text = serde_json::to_string(&serde_json::json!({"type": event.event_type, "data": event.payload})).unwrap_or_default();
        state.connections.send(random_session_id, Message::Text(text.into())).await;
    }
    state.outbox.clear_pending_events(&custom_id).await?;

    let registered = normalize_summoner_name(&payload.summoner_name);
    if let Some(match_id) = state.storage.find_active_match_for_player(&registered).await? {
        state.supervisor.restore_active_match(&registered, match_id).await?;
    }
    Ok(())
}

async fn handle_register_lcu(state: &Arc<AppState>, random_session_id: &str, frame: &InboundFrame) -> Result<()> {
    let payload: RegisterLcuConnectionData = parse(&frame.data)?;
    let claimed = claimed_summoner(frame)?;
    let registered = require_identity(state, random_session_id, &claimed).await?;
    // The local game-client port/auth token are carried to the caller so it
    // can reach the LCU directly; this backend only needs the exclusion
    // lock, it never dials the LCU itself (that happens over the gateway).
    let _ = (payload.port, &payload.auth_token);
    state.sessions.acquire_player_lock(&registered, random_session_id).await.map(|_| ())
}

async fn handle_gameclient_response(state: &Arc<AppState>, frame: &InboundFrame) -> Result<()> {
    let id = frame.id.clone().ok_or_else(|| CoordinatorError::ProtocolViolation { reason: "missing id".to_string() })?;
    let status = frame.status.unwrap_or(0);
    let body = frame.body.clone().unwrap_or(serde_json::Value::Null);
    state.gateway.handle_game_client_response(GameClientResponse { id, status, body }).await;
    Ok(())
}

async fn handle_heartbeat(state: &Arc<AppState>, random_session_id: &str, frame: &InboundFrame) -> Result<()> {
    state.sessions.update_heartbeat(random_session_id).await?;
    let reply = match frame.frame_type.as_str() {
        "ping" => Some(SimpleFrame::pong()),
        "heartbeat" => Some(SimpleFrame::heartbeat_ack()),
        _ => None,
    };
    if let Some(reply) = reply {
        let text = serde_json::to_string(&reply).unwrap_or_default();
        state.connections.send(random_session_id, Message::Text(text.into())).await;
    }
    Ok(())
}

async fn handle_join_queue(state: &Arc<AppState>, random_session_id: &str, frame: &InboundFrame) -> Result<()> {
    let payload: JoinQueueData = parse(&frame.data)?;
    let claimed = claimed_summoner(frame)?;
    let registered = require_identity(state, random_session_id, &claimed).await?;

    let player = state
        .storage
        .find_player_by_summoner_name(&registered)
        .await?
        .ok_or_else(|| CoordinatorError::ProtocolViolation { reason: "unknown player".to_string() })?;

    let entry = protocol::QueueEntry {
        player_id: player.id,
        summoner_name: registered,
        region: payload.region.clone(),
        primary_lane: payload.primary_lane,
        secondary_lane: payload.secondary_lane,
        mmr: player.custom_mmr,
        joined_at: chrono::Utc::now(),
    };
    state.matchmaking.join_queue(entry).await;
    broadcast_queue_status(state, &payload.region).await?;
    try_form_match_and_announce(state, &payload.region).await
}

async fn handle_leave_queue(state: &Arc<AppState>, random_session_id: &str, frame: &InboundFrame) -> Result<()> {
    let claimed = claimed_summoner(frame)?;
    let registered = require_identity(state, random_session_id, &claimed).await?;
    if let Some(player) = state.storage.find_player_by_summoner_name(&registered).await? {
        let region = frame.data.get("region").and_then(|v| v.as_str()).unwrap_or("na").to_string();
        state.matchmaking.leave_queue(&region, player.id).await;
        broadcast_queue_status(state, &region).await?;
    }
    Ok(())
}

async fn broadcast_queue_status(state: &AppState, region: &str) -> Result<()> {
    let entries = state.matchmaking.queue_status(region).await;
    if entries.is_empty() {
        return Ok(());
    }
    let targets: Vec<String> = entries.iter().map(|e| e.summoner_name.clone()).collect();
    state.broadcaster.send_to(&targets, "queue_status", serde_json::to_value(entries).unwrap_or_default()).await
}

async fn try_form_match_and_announce(state: &Arc<AppState>, region: &str) -> Result<()> {
    let Some(proposal) = state.matchmaking.try_form_match(region).await else {
        return Ok(());
    };

    let mut draft_match = protocol::Match {
        id: 0,
        team_one: proposal.team_one,
        team_two: proposal.team_two,
        average_mmr_team_one: proposal.average_mmr_team_one,
        average_mmr_team_two: proposal.average_mmr_team_two,
        status: protocol::MatchStatus::PendingAccept,
        owner_backend_id: None,
        last_heartbeat: None,
        pick_ban_data: None,
        winner_team: None,
        linked_external_game_id: None,
        lp_changes: Default::default(),
        total_lp: 0,
        created_at: chrono::Utc::now(),
    };
    draft_match.id = state.storage.insert_match(&draft_match).await?;

    let participants: Vec<String> = draft_match.all_players().map(|p| p.summoner_name.clone()).collect();
    state.acceptance.open_window(draft_match.id, &participants).await;

    let deadline = chrono::Utc::now()
        + chrono::Duration::from_std(state.settings.accept_timeout).unwrap_or_else(|_| chrono::Duration::seconds(30));
    let data = MatchFoundData {
        match_id: draft_match.id,
        team1: draft_match.team_one.clone(),
        team2: draft_match.team_two.clone(),
        avg_mmr_per_team: [draft_match.average_mmr_team_one, draft_match.average_mmr_team_two],
        deadline,
    };
    state.broadcaster.send_to(&participants, "match_found", serde_json::to_value(data).unwrap_or_default()).await
}

async fn handle_accept_decline(state: &Arc<AppState>, random_session_id: &str, frame: &InboundFrame) -> Result<()> {
    let payload: MatchIdData = parse(&frame.data)?;
    let claimed = claimed_summoner(frame)?;
    let registered = require_identity(state, random_session_id, &claimed).await?;
    let m = state.supervisor.validate_participant(payload.match_id, &registered).await?;

    if frame.frame_type == "accept_match" {
        let decision = state.acceptance.accept(payload.match_id, &registered, &m.team_one, &m.team_two).await?;
        if matches!(decision, AcceptanceDecision::AllAccepted) {
            state.supervisor.claim_match_ownership(payload.match_id).await?;
            let targets: Vec<String> = m.all_players().map(|p| p.summoner_name.clone()).collect();
            state.broadcaster.send_to(&targets, "match_accepted", serde_json::json!({"matchId": payload.match_id})).await?;
        }
    } else {
        let non_decliners = state.acceptance.decline(payload.match_id, &registered).await?;
        if let Some(mut cancelled) = state.storage.load_match(payload.match_id).await? {
            cancelled.status = protocol::MatchStatus::Cancelled;
            state.storage.save_match(&cancelled).await?;
            requeue_non_decliners(state, &cancelled, &non_decliners).await;
        }
    }
    Ok(())
}

/// Returns every non-declining participant to their region's queue ahead
/// of new arrivals (section 4.7). Lane preference narrows to the roster's
/// assigned lane - the original primary/secondary split is gone once a
/// cohort forms - and region/mmr are re-read from the player's record.
async fn requeue_non_decliners(state: &Arc<AppState>, cancelled_match: &protocol::Match, non_decliners: &[String]) {
    for name in non_decliners {
        let Some(roster_player) = cancelled_match.all_players().find(|p| &p.summoner_name == name) else { continue };
        let player = match state.storage.find_player_by_summoner_name(name).await {
            Ok(Some(player)) => player,
            _ => continue,
        };
        let entry = protocol::QueueEntry {
            player_id: roster_player.player_id,
            summoner_name: name.clone(),
            region: player.region.clone(),
            primary_lane: roster_player.assigned_lane,
            secondary_lane: roster_player.assigned_lane,
            mmr: roster_player.mmr,
            joined_at: chrono::Utc::now(),
        };
        let region = entry.region.clone();
        state.matchmaking.join_queue(entry).await;
        let _ = broadcast_queue_status(state, &region).await;
    }
}

async fn handle_draft_action(state: &Arc<AppState>, random_session_id: &str, frame: &InboundFrame) -> Result<()> {
    let payload: DraftActionData = parse(&frame.data)?;
    let claimed = claimed_summoner(frame)?;
    let registered = require_identity(state, random_session_id, &claimed).await?;
    state.supervisor.validate_participant(payload.match_id, &registered).await?;

    // No champion catalog in scope (spec Non-goal); the client sends only
    // the champion id, so the display name mirrors it.
    match state
        .draft
        .process_action(payload.match_id, payload.action_index, &payload.champion_id, &payload.champion_id, &registered)
        .await?
    {
        ProcessOutcome::Accepted => Ok(()),
        ProcessOutcome::Rejected(reason) => Err(CoordinatorError::ProtocolViolation { reason: reason.to_string() }),
    }
}

async fn handle_draft_confirm(state: &Arc<AppState>, random_session_id: &str, frame: &InboundFrame) -> Result<()> {
    let payload: DraftConfirmData = parse(&frame.data)?;
    let claimed = claimed_summoner(frame)?;
    let registered = require_identity(state, random_session_id, &claimed).await?;
    state.supervisor.validate_participant(payload.match_id, &registered).await?;
    state.draft.confirm_draft(payload.match_id, &registered).await.map(|_| ())
}

async fn handle_draft_snapshot(state: &Arc<AppState>, random_session_id: &str, frame: &InboundFrame) -> Result<()> {
    let payload: MatchIdData = parse(&frame.data)?;
    let claimed = claimed_summoner(frame)?;
    let registered = require_identity(state, random_session_id, &claimed).await?;
    state.supervisor.validate_participant(payload.match_id, &registered).await?;

    let (snapshot, remaining) = state.draft.snapshot(payload.match_id).await?;
    let reply = DraftUpdatedFrame::new(snapshot, remaining.as_secs_f32());
    let text = serde_json::to_string(&reply).unwrap_or_default();
    state.connections.send(random_session_id, Message::Text(text.into())).await;
    Ok(())
}

async fn handle_cast_vote(state: &Arc<AppState>, random_session_id: &str, frame: &InboundFrame) -> Result<()> {
    let payload: VoteData = parse(&frame.data)?;
    let claimed = claimed_summoner(frame)?;
    let registered = require_identity(state, random_session_id, &claimed).await?;
    state.supervisor.validate_participant(payload.match_id, &registered).await?;

    if !is_bot_name(&registered) {
        let confirmed = state.critical.require(state, random_session_id, &registered, "cast_vote").await;
        if !confirmed {
            return Err(CoordinatorError::Timeout { context: "critical confirmation for cast_vote".to_string() });
        }
    }

    let player = state
        .storage
        .find_player_by_summoner_name(&registered)
        .await?
        .ok_or_else(|| CoordinatorError::ProtocolViolation { reason: "unknown player".to_string() })?;
    state.voting.cast_vote(payload.match_id, player.id, &registered, &payload.external_game_id).await.map(|_| ())
}

async fn handle_reconnect_response(state: &Arc<AppState>, random_session_id: &str, frame: &InboundFrame) -> Result<()> {
    let payload: MatchIdData = parse(&frame.data)?;
    let claimed = claimed_summoner(frame)?;
    let registered = require_identity(state, random_session_id, &claimed).await?;
    state.supervisor.restore_active_match(&registered, payload.match_id).await
}

async fn handle_acknowledged(state: &Arc<AppState>, random_session_id: &str, frame: &InboundFrame) -> Result<()> {
    let payload: AcknowledgeData = parse(&frame.data)?;
    let claimed = claimed_summoner(frame)?;
    let registered = require_identity(state, random_session_id, &claimed).await?;

    let base_event = frame.frame_type.trim_end_matches("_acknowledged");
    let key = format!("ack:{}:{}", custom_session_id(&registered), payload.match_id);
    state.kv.hset(&key, base_event, &chrono::Utc::now().to_rfc3339()).await?;
    state.kv.expire(&key, ttl_for_event_type(base_event) as u64).await
}
