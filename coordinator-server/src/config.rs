//! Layered startup configuration (`SPEC_FULL.md` section C), holding the
//! "Configurable options" enumerated in spec section 6.

use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub struct Settings {
    pub backend_id: String,
    pub bind_addr: String,
    pub redis_url: String,
    pub database_url: String,

    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
    pub rpc_timeout: Duration,
    pub critical_confirm_timeout: Duration,
    pub draft_step_timeout: Duration,
    pub accept_timeout: Duration,
    pub max_pending_events_per_player: usize,
    pub k_factor: f64,
    pub default_mmr: i32,
    pub ownership_ttl: Duration,
    pub special_users: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            backend_id: format!("backend-{}", uuid::Uuid::new_v4()),
            bind_addr: "0.0.0.0:8080".to_string(),
            redis_url: "redis://127.0.0.1:6379".to_string(),
            database_url: "postgres://localhost/coordinator".to_string(),
            heartbeat_interval: Duration::from_secs(60),
            heartbeat_timeout: Duration::from_secs(120),
            rpc_timeout: Duration::from_secs(5),
            critical_confirm_timeout: Duration::from_secs(8),
            draft_step_timeout: Duration::from_secs(30),
            accept_timeout: Duration::from_secs(30),
            max_pending_events_per_player: 100,
            k_factor: 32.0,
            default_mmr: 1000,
            ownership_ttl: Duration::from_secs(60),
            special_users: Vec::new(),
        }
    }
}

impl Settings {
    /// Loads settings from `COORD_`-prefixed environment variables, falling
    /// back to [`Settings::default`] for anything unset.
    pub fn load() -> Self {
        let mut settings = Settings::default();
        if let Ok(v) = std::env::var("COORD_BACKEND_ID") {
            settings.backend_id = v;
        }
        if let Ok(v) = std::env::var("COORD_BIND_ADDR") {
            settings.bind_addr = v;
        }
        if let Ok(v) = std::env::var("COORD_REDIS_URL") {
            settings.redis_url = v;
        }
        if let Ok(v) = std::env::var("COORD_DATABASE_URL") {
            settings.database_url = v;
        }
        if let Ok(v) = std::env::var("COORD_K_FACTOR").ok().and_then(|s| s.parse().ok()) {
            settings.k_factor = v;
        }
        if let Ok(v) = std::env::var("COORD_DEFAULT_MMR").ok().and_then(|s| s.parse().ok()) {
            settings.default_mmr = v;
        }
        if let Ok(v) = std::env::var("COORD_SPECIAL_USERS") {
            settings.special_users = v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
        }
        settings
    }
}

/// The configured set of privileged voter names (section 4.10, "Privileged
/// voter shortcut"), reloadable at runtime per section 9. Normalized
/// identically to the session registry so lookups are a plain set
/// membership check.
#[derive(Debug, Default)]
pub struct SpecialUsers {
    names: RwLock<std::collections::HashSet<String>>,
}

impl SpecialUsers {
    pub fn new(initial: impl IntoIterator<Item = String>) -> Self {
        let names = initial.into_iter().map(|n| protocol::names::normalize_summoner_name(&n)).collect();
        SpecialUsers { names: RwLock::new(names) }
    }

    pub async fn is_special(&self, summoner_name: &str) -> bool {
        let name = protocol::names::normalize_summoner_name(summoner_name);
        self.names.read().await.contains(&name)
    }

    /// Re-reads the configured list, replacing the current set wholesale.
    pub async fn reload(&self, updated: impl IntoIterator<Item = String>) {
        let mut guard = self.names.write().await;
        *guard = updated.into_iter().map(|n| protocol::names::normalize_summoner_name(&n)).collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn special_users_normalize_on_insert_and_lookup() {
        let special = SpecialUsers::new(["Special#1".to_string()]);
        assert!(special.is_special("  SPECIAL#1  ").await);
        assert!(!special.is_special("somebody_else").await);
    }

    #[tokio::test]
    async fn special_users_reload_replaces_set() {
        let special = SpecialUsers::new(["alpha".to_string()]);
        special.reload(["bravo".to_string()]).await;
        assert!(!special.is_special("alpha").await);
        assert!(special.is_special("bravo").await);
    }
}
