//! C2: the persistent store (section 4, component table) - player records,
//! in-flight/completed matches, and votes, each multi-record write wrapped
//! in a transaction per spec section 5 ("state transitions that touch more
//! than one durable record are wrapped in a single transaction").
//!
//! The `matches` table mirrors `protocol::Match` as a JSONB blob alongside a
//! handful of indexed columns used for the ownership/restoration queries -
//! the hybrid-row shape follows the `sqlx` + Postgres JSON usage carried by
//! the wider pack (`PocketRelay-Server`, `rivet-dev-engine` manifests in
//! other_examples); relay-server has no persistent store of its own.

use sqlx::{PgPool, Row};

use crate::error::Result;
use protocol::{Match, MatchStatus, Player, Vote};

#[derive(Clone)]
pub struct Storage {
    pool: PgPool,
}

impl Storage {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Storage { pool })
    }

    /// Runs the embedded schema migrations. Idempotent.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS players (
                id BIGSERIAL PRIMARY KEY,
                summoner_name TEXT NOT NULL UNIQUE,
                puuid TEXT NOT NULL UNIQUE,
                region TEXT NOT NULL,
                mmr INTEGER NOT NULL,
                custom_lp INTEGER NOT NULL DEFAULT 0,
                custom_mmr INTEGER NOT NULL,
                custom_games_played INTEGER NOT NULL DEFAULT 0,
                custom_wins INTEGER NOT NULL DEFAULT 0,
                custom_losses INTEGER NOT NULL DEFAULT 0,
                custom_peak_mmr INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS matches (
                id BIGSERIAL PRIMARY KEY,
                status TEXT NOT NULL,
                owner_backend_id TEXT,
                created_at TIMESTAMPTZ NOT NULL,
                data JSONB NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS matches_owner_idx ON matches (owner_backend_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS votes (
                match_id BIGINT NOT NULL REFERENCES matches(id),
                player_id BIGINT NOT NULL,
                summoner_name TEXT NOT NULL,
                external_game_id TEXT NOT NULL,
                voted_at TIMESTAMPTZ NOT NULL,
                PRIMARY KEY (match_id, player_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn find_player_by_summoner_name(&self, summoner_name: &str) -> Result<Option<Player>> {
        let row = sqlx::query(
            "SELECT id, summoner_name, puuid, region, mmr, custom_lp, custom_mmr, \
             custom_games_played, custom_wins, custom_losses, custom_peak_mmr \
             FROM players WHERE summoner_name = $1",
        )
        .bind(summoner_name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Player {
            id: r.get("id"),
            summoner_name: r.get("summoner_name"),
            puuid: r.get("puuid"),
            region: r.get("region"),
            mmr: r.get("mmr"),
            custom_lp: r.get("custom_lp"),
            custom_mmr: r.get("custom_mmr"),
            custom_games_played: r.get("custom_games_played"),
            custom_wins: r.get("custom_wins"),
            custom_losses: r.get("custom_losses"),
            custom_peak_mmr: r.get("custom_peak_mmr"),
        }))
    }

    pub async fn upsert_player(&self, player: &Player) -> Result<i64> {
        let row = sqlx::query(
            "INSERT INTO players (summoner_name, puuid, region, mmr, custom_lp, custom_mmr, \
             custom_games_played, custom_wins, custom_losses, custom_peak_mmr) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (summoner_name) DO UPDATE SET \
             puuid = EXCLUDED.puuid, region = EXCLUDED.region, mmr = EXCLUDED.mmr, \
             custom_lp = EXCLUDED.custom_lp, custom_mmr = EXCLUDED.custom_mmr, \
             custom_games_played = EXCLUDED.custom_games_played, \
             custom_wins = EXCLUDED.custom_wins, custom_losses = EXCLUDED.custom_losses, \
             custom_peak_mmr = EXCLUDED.custom_peak_mmr \
             RETURNING id",
        )
        .bind(&player.summoner_name)
        .bind(&player.puuid)
        .bind(&player.region)
        .bind(player.mmr)
        .bind(player.custom_lp)
        .bind(player.custom_mmr)
        .bind(player.custom_games_played)
        .bind(player.custom_wins)
        .bind(player.custom_losses)
        .bind(player.custom_peak_mmr)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("id"))
    }

    /// Persists a freshly formed match, returning its durable id. The
    /// caller is expected to set `completed_match.id` from the result.
    pub async fn insert_match(&self, draft_match: &Match) -> Result<i64> {
        let row = sqlx::query(
            "INSERT INTO matches (status, owner_backend_id, created_at, data) \
             VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(draft_match.status.as_str())
        .bind(&draft_match.owner_backend_id)
        .bind(draft_match.created_at)
        .bind(serde_json::to_value(draft_match).unwrap_or_default())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("id"))
    }

    pub async fn load_match(&self, match_id: i64) -> Result<Option<Match>> {
        let row = sqlx::query("SELECT data FROM matches WHERE id = $1")
            .bind(match_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(match row {
            Some(r) => {
                let data: serde_json::Value = r.get("data");
                serde_json::from_value(data).ok()
            }
            None => None,
        })
    }

    /// Overwrites the full match record - used after every state-machine
    /// transition (draft step, accept/decline, ownership change) so `data`
    /// stays the source of truth for reconnect restoration.
    pub async fn save_match(&self, saved_match: &Match) -> Result<()> {
        sqlx::query(
            "UPDATE matches SET status = $1, owner_backend_id = $2, data = $3 WHERE id = $4",
        )
        .bind(saved_match.status.as_str())
        .bind(&saved_match.owner_backend_id)
        .bind(serde_json::to_value(saved_match).unwrap_or_default())
        .bind(saved_match.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Finalizes a match and applies every participant's LP change as a
    /// single transaction, per spec section 5's multi-record requirement.
    pub async fn finalize_match(&self, completed_match: &Match, updated_players: &[Player]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE matches SET status = $1, owner_backend_id = NULL, data = $2 WHERE id = $3")
            .bind(MatchStatus::Completed.as_str())
            .bind(serde_json::to_value(completed_match).unwrap_or_default())
            .bind(completed_match.id)
            .execute(&mut *tx)
            .await?;

        for player in updated_players {
            sqlx::query(
                "UPDATE players SET custom_lp = $1, custom_mmr = $2, custom_games_played = $3, \
                 custom_wins = $4, custom_losses = $5, custom_peak_mmr = $6 WHERE id = $7",
            )
            .bind(player.custom_lp)
            .bind(player.custom_mmr)
            .bind(player.custom_games_played)
            .bind(player.custom_wins)
            .bind(player.custom_losses)
            .bind(player.custom_peak_mmr)
            .bind(player.id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Match ids currently owned by a backend, for graceful-shutdown
    /// release and for the reconnect restoration path.
    pub async fn match_ids_owned_by(&self, backend_id: &str) -> Result<Vec<i64>> {
        let rows = sqlx::query("SELECT id FROM matches WHERE owner_backend_id = $1")
            .bind(backend_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|r| r.get("id")).collect())
    }

    /// The player's current non-terminal match, if any - section 4.9's
    /// reconnect restoration needs this without a caller-supplied match id.
    /// Most recent match wins if more than one somehow matches.
    pub async fn find_active_match_for_player(&self, summoner_name: &str) -> Result<Option<i64>> {
        let row = sqlx::query(
            "SELECT id FROM matches \
             WHERE status NOT IN ('completed', 'cancelled') \
             AND ( \
                 EXISTS (SELECT 1 FROM jsonb_array_elements(data->'team_one') AS p WHERE p->>'summoner_name' = $1) \
                 OR EXISTS (SELECT 1 FROM jsonb_array_elements(data->'team_two') AS p WHERE p->>'summoner_name' = $1) \
             ) \
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(summoner_name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.get("id")))
    }

    pub async fn find_player_by_puuid(&self, puuid: &str) -> Result<Option<Player>> {
        let row = sqlx::query(
            "SELECT id, summoner_name, puuid, region, mmr, custom_lp, custom_mmr, \
             custom_games_played, custom_wins, custom_losses, custom_peak_mmr \
             FROM players WHERE puuid = $1",
        )
        .bind(puuid)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Player {
            id: r.get("id"),
            summoner_name: r.get("summoner_name"),
            puuid: r.get("puuid"),
            region: r.get("region"),
            mmr: r.get("mmr"),
            custom_lp: r.get("custom_lp"),
            custom_mmr: r.get("custom_mmr"),
            custom_games_played: r.get("custom_games_played"),
            custom_wins: r.get("custom_wins"),
            custom_losses: r.get("custom_losses"),
            custom_peak_mmr: r.get("custom_peak_mmr"),
        }))
    }

    pub async fn insert_vote(&self, vote: &Vote) -> Result<()> {
        sqlx::query(
            "INSERT INTO votes (match_id, player_id, summoner_name, external_game_id, voted_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (match_id, player_id) DO UPDATE SET \
             external_game_id = EXCLUDED.external_game_id, voted_at = EXCLUDED.voted_at",
        )
        .bind(vote.match_id)
        .bind(vote.player_id)
        .bind(&vote.summoner_name)
        .bind(&vote.external_game_id)
        .bind(vote.voted_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn votes_for_match(&self, match_id: i64) -> Result<Vec<Vote>> {
        let rows = sqlx::query(
            "SELECT match_id, player_id, summoner_name, external_game_id, voted_at \
             FROM votes WHERE match_id = $1",
        )
        .bind(match_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| Vote {
                match_id: r.get("match_id"),
                player_id: r.get("player_id"),
                summoner_name: r.get("summoner_name"),
                external_game_id: r.get("external_game_id"),
                voted_at: r.get("voted_at"),
            })
            .collect())
    }
}
