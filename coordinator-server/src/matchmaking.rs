//! C8: queue and matchmaking (section 4.6). Maintains the per-region
//! waiting pool and forms 10-player cohorts with balanced teams and lane
//! assignments.
//!
//! Queue membership has no entry in section 6's KV key layout or persisted
//! state layout (unlike sessions, outbox, or ownership) - it's ephemeral
//! and cheaply rebuilt by a rejoin, so it's kept in an in-process table
//! rather than round-tripping the KV store on every join/leave. The table
//! shape (a name-keyed map behind a single lock) follows relay-server's
//! `lobby.rs` `AppState` registry.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use protocol::{Lane, QueueEntry, RosterPlayer};

#[derive(Debug, Clone)]
pub struct MatchProposal {
    pub team_one: Vec<RosterPlayer>,
    pub team_two: Vec<RosterPlayer>,
    pub average_mmr_team_one: i32,
    pub average_mmr_team_two: i32,
}

#[derive(Default)]
pub struct MatchmakingQueue {
    /// region -> waiting entries, in join order.
    pools: Mutex<HashMap<String, Vec<QueueEntry>>>,
}

impl MatchmakingQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(MatchmakingQueue::default())
    }

    /// `joinQueue` - idempotent; replaces any existing entry for the
    /// player in their region.
    pub async fn join_queue(&self, entry: QueueEntry) {
        let mut pools = self.pools.lock().await;
        let pool = pools.entry(entry.region.clone()).or_default();
        pool.retain(|e| e.player_id != entry.player_id);
        pool.push(entry);
    }

    /// `leaveQueue` - idempotent.
    pub async fn leave_queue(&self, region: &str, player_id: i64) {
        let mut pools = self.pools.lock().await;
        if let Some(pool) = pools.get_mut(region) {
            pool.retain(|e| e.player_id != player_id);
        }
    }

    pub async fn queue_status(&self, region: &str) -> Vec<QueueEntry> {
        self.pools.lock().await.get(region).cloned().unwrap_or_default()
    }

    /// Attempts to form a cohort for `region`. Removes the chosen ten
    /// players from the pool on success.
    pub async fn try_form_match(&self, region: &str) -> Option<MatchProposal> {
        let mut pools = self.pools.lock().await;
        let pool = pools.get(region)?;
        if pool.len() < 10 {
            return None;
        }

        let (chosen, proposal) = form_cohort(pool)?;
        if let Some(pool) = pools.get_mut(region) {
            pool.retain(|e| !chosen.contains(&e.player_id));
        }
        Some(proposal)
    }
}

/// Picks two candidates per lane (preferring primary, then secondary, then
/// autofill from whoever's left, earliest-join first in every tier), then
/// searches the 2^5 lane-to-team assignments for the one minimizing
/// `|avgMmr(team1) - avgMmr(team2)|`.
fn form_cohort(pool: &[QueueEntry]) -> Option<(Vec<i64>, MatchProposal)> {
    let mut by_join: Vec<&QueueEntry> = pool.iter().collect();
    by_join.sort_by_key(|e| e.joined_at);

    let mut assigned: Vec<i64> = Vec::new();
    let mut per_lane: HashMap<Lane, Vec<&QueueEntry>> = HashMap::new();

    for lane in Lane::ALL {
        let mut candidates: Vec<&QueueEntry> = by_join
            .iter()
            .copied()
            .filter(|e| !assigned.contains(&e.player_id) && e.primary_lane == lane)
            .collect();
        if candidates.len() < 2 {
            let secondary: Vec<&QueueEntry> = by_join
                .iter()
                .copied()
                .filter(|e| !assigned.contains(&e.player_id) && e.secondary_lane == lane && !candidates.iter().any(|c| c.player_id == e.player_id))
                .collect();
            candidates.extend(secondary);
        }
        candidates.truncate(2);
        for c in &candidates {
            assigned.push(c.player_id);
        }
        per_lane.insert(lane, candidates);
    }

    // Autofill any lane short of two from whoever remains unassigned.
    let mut leftover: Vec<&QueueEntry> = by_join.iter().copied().filter(|e| !assigned.contains(&e.player_id)).collect();
    for lane in Lane::ALL {
        let slot = per_lane.get_mut(&lane).unwrap();
        while slot.len() < 2 {
            match leftover.pop() {
                Some(player) => {
                    assigned.push(player.player_id);
                    slot.push(player);
                }
                None => return None,
            }
        }
    }

    // Exactly two per lane, ten total.
    let pairs: Vec<(&QueueEntry, &QueueEntry)> = Lane::ALL.iter().map(|lane| {
        let slot = &per_lane[lane];
        (slot[0], slot[1])
    }).collect();

    let mut best: Option<(i32, [bool; 5])> = None;
    for mask in 0u8..32 {
        let bits = [
            mask & 0b00001 != 0,
            mask & 0b00010 != 0,
            mask & 0b00100 != 0,
            mask & 0b01000 != 0,
            mask & 0b10000 != 0,
        ];
        let mut sum1 = 0i64;
        let mut sum2 = 0i64;
        for (i, (a, b)) in pairs.iter().enumerate() {
            let (to_one, to_two) = if bits[i] { (*a, *b) } else { (*b, *a) };
            sum1 += to_one.mmr as i64;
            sum2 += to_two.mmr as i64;
        }
        let diff = (sum1 - sum2).unsigned_abs() as i32;
        if best.is_none_or(|(best_diff, _)| diff < best_diff) {
            best = Some((diff, bits));
        }
    }
    let (_, bits) = best?;

    let mut team_one = Vec::with_capacity(5);
    let mut team_two = Vec::with_capacity(5);
    for (i, lane) in Lane::ALL.iter().enumerate() {
        let (a, b) = pairs[i];
        let (one, two) = if bits[i] { (a, b) } else { (b, a) };
        team_one.push(RosterPlayer { summoner_name: one.summoner_name.clone(), player_id: one.player_id, mmr: one.mmr, assigned_lane: *lane, team_index: i as u8 });
        team_two.push(RosterPlayer { summoner_name: two.summoner_name.clone(), player_id: two.player_id, mmr: two.mmr, assigned_lane: *lane, team_index: i as u8 });
    }

    let average_mmr_team_one = (team_one.iter().map(|p| p.mmr as i64).sum::<i64>() / 5) as i32;
    let average_mmr_team_two = (team_two.iter().map(|p| p.mmr as i64).sum::<i64>() / 5) as i32;

    Some((
        assigned,
        MatchProposal { team_one, team_two, average_mmr_team_one, average_mmr_team_two },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(id: i64, primary: Lane, secondary: Lane, mmr: i32) -> QueueEntry {
        QueueEntry {
            player_id: id,
            summoner_name: format!("player{id}"),
            region: "na".to_string(),
            primary_lane: primary,
            secondary_lane: secondary,
            mmr,
            joined_at: Utc::now() + chrono::Duration::milliseconds(id),
        }
    }

    fn full_pool() -> Vec<QueueEntry> {
        let lanes = Lane::ALL;
        (0..10)
            .map(|i| entry(i, lanes[i as usize % 5], lanes[(i as usize + 1) % 5], 1000 + i as i32 * 10))
            .collect()
    }

    #[tokio::test]
    async fn join_queue_replaces_existing_entry_for_same_player() {
        let queue = MatchmakingQueue::new();
        queue.join_queue(entry(1, Lane::Top, Lane::Jungle, 1000)).await;
        queue.join_queue(entry(1, Lane::Mid, Lane::Bot, 1200)).await;
        let status = queue.queue_status("na").await;
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].mmr, 1200);
    }

    #[tokio::test]
    async fn forms_cohort_once_ten_compatible_players_present() {
        let queue = MatchmakingQueue::new();
        for e in full_pool() {
            queue.join_queue(e).await;
        }
        let proposal = queue.try_form_match("na").await.expect("cohort should form");
        assert_eq!(proposal.team_one.len(), 5);
        assert_eq!(proposal.team_two.len(), 5);
        assert!(queue.queue_status("na").await.is_empty());
    }

    #[tokio::test]
    async fn no_cohort_below_ten_players() {
        let queue = MatchmakingQueue::new();
        for e in full_pool().into_iter().take(9) {
            queue.join_queue(e).await;
        }
        assert!(queue.try_form_match("na").await.is_none());
    }
}
