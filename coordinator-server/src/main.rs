mod acceptance;
mod app;
mod broadcast;
mod config;
mod connections;
mod draft;
mod error;
mod gateway;
mod identity;
mod kv;
mod matchmaking;
mod outbox;
mod router;
mod storage;
mod supervisor;
mod voting;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{ConnectInfo, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::app::AppState;
use crate::config::Settings;
use protocol::frames::MatchCancelledFrame;

/// Deterministic filler pool for timed-out draft steps (section 9 open
/// question, decided in `DESIGN.md`): lowest ids first, exhausted in order.
const FILLER_CHAMPION_POOL: &[&str] = &["1", "2", "3", "4", "5", "6", "7", "8", "9", "10"];

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=info", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true),
        )
        .init();

    let settings = Settings::load();
    let bind_addr = settings.bind_addr.clone();
    let backend_id = settings.backend_id.clone();

    let state = match AppState::new(settings).await {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(?e, "failed to initialize application state");
            std::process::exit(1);
        }
    };

    spawn_ownership_heartbeat(state.clone());
    spawn_idle_reaper(state.clone());
    spawn_draft_sweeper(state.clone());
    spawn_acceptance_sweeper(state.clone());

    let app = Router::new()
        .route("/ws", get(websocket_handler))
        .route("/healthz", get(healthz))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind(&bind_addr).await.unwrap_or_else(|e| {
        tracing::error!(?e, addr = %bind_addr, "failed to bind listener");
        std::process::exit(1);
    });

    tracing::info!(backend_id = %backend_id, addr = %bind_addr, "coordinator listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal(state))
        .await
        .unwrap();
}

async fn shutdown_signal(state: Arc<AppState>) {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received, releasing owned matches");
    if let Err(e) = state.supervisor.release_all_owned_matches().await {
        tracing::error!(?e, "failed to release owned matches during shutdown");
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| websocket(socket, state, addr))
}

/// Owns one accepted connection end to end: registers it in the
/// [`connections::ConnectionTable`], races a send task against a receive
/// task, and cleans up on whichever side finishes first.
async fn websocket(stream: WebSocket, state: Arc<AppState>, addr: SocketAddr) {
    let (sink, receiver) = stream.split();
    let random_session_id = uuid::Uuid::new_v4().to_string();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    state.connections.insert(random_session_id.clone(), tx, Some(addr.to_string()), now_unix()).await;

    let send_task = tokio::spawn(send_loop(sink, rx));
    let receive_task = tokio::spawn(receive_loop(state.clone(), random_session_id.clone(), receiver));

    tokio::select! {
        _ = send_task => { receive_task.abort(); }
        _ = receive_task => { send_task.abort(); }
    }

    tracing::info!(session = %random_session_id, "connection closed, cleaning up");
    state.connections.remove(&random_session_id).await;
    let _ = state.sessions.remove_session(&random_session_id).await;
}

async fn send_loop(mut sink: SplitSink<WebSocket, Message>, mut rx: mpsc::UnboundedReceiver<Message>) {
    while let Some(message) = rx.recv().await {
        if sink.send(message).await.is_err() {
            return;
        }
    }
}

async fn receive_loop(state: Arc<AppState>, random_session_id: String, mut receiver: SplitStream<WebSocket>) {
    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                state.connections.get(&random_session_id).await.map(|c| c.touch(now_unix()));
                router::dispatch(&state, &random_session_id, &text).await;
            }
            Ok(Message::Close(_)) => return,
            Ok(_) => {
                state.connections.get(&random_session_id).await.map(|c| c.touch(now_unix()));
            }
            Err(e) => {
                tracing::warn!(?e, session = %random_session_id, "websocket receive error");
                return;
            }
        }
    }
}

fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Refreshes this backend's liveness record and its owned matches' lease
/// at half the ownership TTL, per `SPEC_FULL.md` section E.
fn spawn_ownership_heartbeat(state: Arc<AppState>) {
    let period = state.settings.ownership_ttl / 2;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period.max(Duration::from_secs(1)));
        loop {
            interval.tick().await;
            if let Err(e) = state.supervisor.heartbeat().await {
                tracing::error!(?e, "ownership heartbeat failed");
            }
        }
    });
}

/// Drops connections that haven't sent or received anything within the
/// configured heartbeat timeout.
fn spawn_idle_reaper(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        loop {
            interval.tick().await;
            let cutoff = now_unix() - state.settings.heartbeat_timeout.as_secs() as i64;
            for session_id in state.connections.all_session_ids().await {
                let Some(conn) = state.connections.get(&session_id).await else { continue };
                if conn.last_activity_unix() < cutoff {
                    tracing::info!(session = %session_id, "reaping idle connection");
                    state.connections.remove(&session_id).await;
                    let _ = state.sessions.remove_session(&session_id).await;
                }
            }
        }
    });
}

/// Resolves any draft step whose timer has lapsed with the deterministic
/// filler policy (section 9 open question).
fn spawn_draft_sweeper(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        loop {
            interval.tick().await;
            let resolved = state.draft.resolve_expired_steps(FILLER_CHAMPION_POOL).await;
            if !resolved.is_empty() {
                tracing::info!(matches = ?resolved, "resolved timed-out draft steps");
            }
        }
    });
}

/// Cancels any acceptance window that ran past its deadline without all
/// ten players accepting, and broadcasts the cancellation.
fn spawn_acceptance_sweeper(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        loop {
            interval.tick().await;
            for match_id in state.acceptance.expire_overdue().await {
                let Ok(Some(mut m)) = state.storage.load_match(match_id).await else { continue };
                m.status = protocol::MatchStatus::Cancelled;
                if let Err(e) = state.storage.save_match(&m).await {
                    tracing::error!(?e, match_id, "failed to persist acceptance timeout cancellation");
                    continue;
                }
                let targets: Vec<String> = m.all_players().map(|p| p.summoner_name.clone()).collect();
                let frame = MatchCancelledFrame::new(match_id, "timeout");
                let _ = state.broadcaster.send_to(&targets, "match_cancelled", serde_json::to_value(&frame.data).unwrap_or_default()).await;
            }
        }
    });
}
