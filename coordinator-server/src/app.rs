//! Shared application state: every component wired together in one place
//! and handed to the axum router as an `Arc<AppState>`.
//!
//! Grounded on relay-server's `lobby.rs` `AppState`, generalized from a
//! handful of bare registries behind independent locks to the full C1-C12
//! component graph, each component already owning its own concurrency.

use std::sync::Arc;

use tracing::info;

use crate::acceptance::{AcceptanceTracker, DraftHandoff};
use crate::broadcast::Broadcaster;
use crate::config::{Settings, SpecialUsers};
use crate::connections::ConnectionTable;
use crate::draft::DraftEngine;
use crate::error::Result;
use crate::gateway::GatewayBridge;
use crate::identity::SessionRegistry;
use crate::kv::KvStore;
use crate::matchmaking::MatchmakingQueue;
use crate::outbox::EventOutbox;
use crate::router::CriticalConfirmations;
use crate::storage::Storage;
use crate::supervisor::Supervisor;
use crate::voting::VotingService;

pub struct AppState {
    pub settings: Settings,
    pub kv: KvStore,
    pub storage: Storage,
    pub sessions: Arc<SessionRegistry>,
    pub outbox: EventOutbox,
    pub connections: ConnectionTable,
    pub gateway: Arc<GatewayBridge>,
    pub broadcaster: Broadcaster,
    pub matchmaking: Arc<MatchmakingQueue>,
    pub acceptance: Arc<AcceptanceTracker>,
    pub draft: Arc<DraftEngine>,
    pub supervisor: Arc<Supervisor>,
    pub special_users: Arc<SpecialUsers>,
    pub voting: Arc<VotingService>,
    pub critical: CriticalConfirmations,
}

impl AppState {
    /// Connects every external store and wires the component graph in
    /// dependency order. Any connection failure here is fatal - there is
    /// no degraded mode for a backend that can't reach its KV store or
    /// Postgres.
    pub async fn new(settings: Settings) -> Result<Arc<Self>> {
        info!(backend_id = %settings.backend_id, "connecting to KV store");
        let kv = KvStore::connect(&settings.redis_url).await?;

        info!("connecting to Postgres");
        let storage = Storage::connect(&settings.database_url).await?;
        storage.migrate().await?;

        let sessions = Arc::new(SessionRegistry::new(kv.clone()));
        let outbox = EventOutbox::new(kv.clone());
        let connections = ConnectionTable::new();
        let gateway = Arc::new(GatewayBridge::new(connections.clone(), sessions.clone(), settings.rpc_timeout));
        let broadcaster = Broadcaster::new(connections.clone(), sessions.clone(), outbox.clone());

        let draft = DraftEngine::new(storage.clone(), broadcaster.clone(), settings.draft_step_timeout);
        let acceptance = Arc::new(AcceptanceTracker::new(
            broadcaster.clone(),
            draft.clone() as Arc<dyn DraftHandoff>,
            settings.accept_timeout,
        ));
        let matchmaking = MatchmakingQueue::new();
        let supervisor = Arc::new(Supervisor::new(
            kv.clone(),
            storage.clone(),
            broadcaster.clone(),
            settings.backend_id.clone(),
            settings.ownership_ttl,
        ));
        let special_users = Arc::new(SpecialUsers::new(settings.special_users.clone()));
        let voting = Arc::new(VotingService::new(
            storage.clone(),
            broadcaster.clone(),
            gateway.clone(),
            special_users.clone(),
            settings.k_factor,
        ));

        Ok(Arc::new(AppState {
            settings,
            kv,
            storage,
            sessions,
            outbox,
            connections,
            gateway,
            broadcaster,
            matchmaking,
            acceptance,
            draft,
            supervisor,
            special_users,
            voting,
            critical: CriticalConfirmations::new(),
        }))
    }
}
