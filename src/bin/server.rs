use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use fire_scan_sim::activity_store::ActivityStore;
use fire_scan_sim::constants::TICK_MS;
use fire_scan_sim::engine::{MissionEngine, MissionOptions};
use fire_scan_sim::error::{ActionError, UplinkError};
use fire_scan_sim::probability::SpreadModel;
use fire_scan_sim::server_protocol::{
    parse_client_message, parse_process_action, ParsedClientMessage,
};
use fire_scan_sim::server_utils::{
    normalize_distance, normalize_seed, parse_activity_limit, sanitize_node_id, session_order_key,
};
use fire_scan_sim::types::{ActionCode, ProbabilityRequest, Variant};
use futures_util::{SinkExt, StreamExt};
use rand::distr::Alphanumeric;
use rand::Rng;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use tower_http::services::{ServeDir, ServeFile};
use tracing_subscriber::EnvFilter;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);
const ACTIVITY_FLUSH_INTERVAL: Duration = Duration::from_secs(2);

type SharedState = Arc<Mutex<ServerState>>;

struct MissionSession {
    session_id: String,
    engine: MissionEngine,
}

struct ClientContext {
    tx: mpsc::Sender<OutboundMessage>,
    mission: Option<MissionSession>,
}

#[derive(Clone, Debug)]
enum OutboundMessage {
    Text(String),
    Close { code: u16, reason: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum QueuePolicy {
    DropOnFull,
    DisconnectOnFull,
}

struct ServerState {
    clients: HashMap<String, ClientContext>,
    activity_store: ActivityStore,
    model: SpreadModel,
}

impl ServerState {
    fn new(activity_store: ActivityStore) -> Self {
        Self {
            clients: HashMap::new(),
            activity_store,
            model: SpreadModel::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ActivityQuery {
    limit: Option<String>,
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let port = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let activity_path = std::env::var("ACTIVITY_LOG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(".data/activity.json"));

    let state = Arc::new(Mutex::new(ServerState::new(ActivityStore::new(
        activity_path,
    ))));
    start_tick_loop(state.clone());
    start_activity_flush_loop(state.clone());

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/process_action", post(process_action_handler))
        .route("/api/activity", get(activity_handler))
        .route("/ws", get(ws_handler))
        .with_state(state);

    let app = if let Some(static_dir) = resolve_static_dir() {
        let index_file = static_dir.join("index.html");
        tracing::info!(root = %static_dir.display(), "serving static files");
        app.fallback_service(
            ServeDir::new(static_dir).not_found_service(ServeFile::new(index_file)),
        )
    } else {
        tracing::warn!("static file root not found; set STATIC_DIR to serve the client");
        app
    };

    let bind_addr = format!("0.0.0.0:{port}");
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(error) => {
            tracing::error!(%bind_addr, %error, "failed to bind server socket");
            std::process::exit(1);
        }
    };

    tracing::info!(port, "listening");
    if let Err(error) = axum::serve(listener, app).await {
        tracing::error!(%error, "server runtime failed");
        std::process::exit(1);
    }
}

fn resolve_static_dir() -> Option<PathBuf> {
    if let Ok(raw) = std::env::var("STATIC_DIR") {
        let path = PathBuf::from(raw);
        if path.join("index.html").is_file() {
            return Some(path);
        }
    }

    let candidates = [PathBuf::from("public"), PathBuf::from("dist/client")];
    candidates
        .into_iter()
        .find(|path| path.join("index.html").is_file())
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

async fn activity_handler(
    State(state): State<SharedState>,
    Query(query): Query<ActivityQuery>,
) -> impl IntoResponse {
    let guard = state.lock().await;
    Json(
        guard
            .activity_store
            .build_response(parse_activity_limit(query.limit.as_deref())),
    )
}

/// Stateless probability lookup for clients that run the mission locally.
async fn process_action_handler(
    State(state): State<SharedState>,
    Json(body): Json<Value>,
) -> Response {
    let Some(parsed) = parse_process_action(&body) else {
        return error_response(StatusCode::BAD_REQUEST, "invalid request body");
    };
    let Some(value) = u8::try_from(parsed.value)
        .ok()
        .filter(|code| ActionCode::from_code(i64::from(*code)).is_some())
    else {
        let error = ActionError::InvalidAction(parsed.value);
        return error_response(StatusCode::BAD_REQUEST, &error.to_string());
    };
    let request = ProbabilityRequest {
        node_id: sanitize_node_id(&parsed.node_id),
        value,
        distance: normalize_distance(parsed.distance),
    };

    let mut guard = state.lock().await;
    match guard.model.evaluate(&request) {
        Ok(response) => {
            if let Some(action) = ActionCode::from_code(i64::from(value)) {
                record_activity(&mut guard, "", action, &request.node_id);
            }
            Json(response).into_response()
        }
        Err(error) => {
            tracing::warn!(node_id = %request.node_id, %error, "probability evaluation failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &error.to_string())
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(json!({
            "status": "error",
            "message": message,
        })),
    )
        .into_response()
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: SharedState, socket: WebSocket) {
    let client_id = make_id("client");
    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(256);

    {
        let mut guard = state.lock().await;
        guard.clients.insert(
            client_id.clone(),
            ClientContext {
                tx: tx.clone(),
                mission: None,
            },
        );
    }
    tracing::debug!(%client_id, "client connected");

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let writer = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            let should_close = matches!(outbound, OutboundMessage::Close { .. });
            let result = match outbound {
                OutboundMessage::Text(payload) => {
                    ws_sender.send(Message::Text(payload.into())).await
                }
                OutboundMessage::Close { code, reason } => {
                    let frame = CloseFrame {
                        code,
                        reason: reason.into(),
                    };
                    ws_sender.send(Message::Close(Some(frame))).await
                }
            };
            if result.is_err() || should_close {
                break;
            }
        }
    });

    while let Some(received) = ws_receiver.next().await {
        let Ok(message) = received else {
            break;
        };

        match message {
            Message::Text(raw) => {
                handle_client_message(state.clone(), &client_id, raw.to_string()).await;
            }
            Message::Binary(raw) => {
                if let Ok(text) = String::from_utf8(raw.to_vec()) {
                    handle_client_message(state.clone(), &client_id, text).await;
                } else {
                    send_error_to_client(&state, &client_id, "invalid_message", "invalid utf8 message")
                        .await;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    {
        let mut guard = state.lock().await;
        guard.clients.remove(&client_id);
    }
    tracing::debug!(%client_id, "client disconnected");
    drop(tx);
    let _ = writer.await;
}

async fn handle_client_message(state: SharedState, client_id: &str, raw: String) {
    let Some(message) = parse_client_message(&raw) else {
        send_error_to_client(&state, client_id, "invalid_message", "invalid message").await;
        return;
    };

    let mut guard = state.lock().await;
    match message {
        ParsedClientMessage::Start { variant, seed } => {
            handle_start(&mut guard, client_id, variant, normalize_seed(seed));
        }
        ParsedClientMessage::SelectNode { node_id } => {
            let node_id = sanitize_node_id(&node_id);
            let result = match mission_mut(&mut guard, client_id) {
                Some(mission) => mission.engine.open_action_menu(&node_id),
                None => Err(ActionError::MissionEnded),
            };
            match result {
                Ok(menu) => send_to_client(
                    &mut guard,
                    client_id,
                    &json!({
                        "type": "action_menu",
                        "menu": menu,
                    }),
                    QueuePolicy::DisconnectOnFull,
                ),
                Err(error) => send_action_error(&mut guard, client_id, &error),
            }
        }
        ParsedClientMessage::Action {
            node_id,
            value,
            distance,
        } => {
            handle_action(
                &mut guard,
                client_id,
                &sanitize_node_id(&node_id),
                value,
                normalize_distance(distance),
            );
        }
        ParsedClientMessage::Ping { t } => {
            send_to_client(
                &mut guard,
                client_id,
                &json!({
                    "type": "pong",
                    "t": t,
                }),
                QueuePolicy::DropOnFull,
            );
        }
    }
}

fn handle_start(
    state: &mut ServerState,
    client_id: &str,
    variant: Option<Variant>,
    seed: Option<u32>,
) {
    let variant = variant.unwrap_or(Variant::HumanOnly);
    let seed = seed.unwrap_or_else(rand::random::<u32>);
    let mut engine = MissionEngine::new(variant, seed, MissionOptions::default());
    let session_id = make_session_id();
    let world = engine.get_world_init();
    let snapshot = engine.build_snapshot(true);
    tracing::info!(%client_id, %session_id, variant = variant.key(), seed, "mission started");

    let Some(client) = state.clients.get_mut(client_id) else {
        return;
    };
    client.mission = Some(MissionSession {
        session_id: session_id.clone(),
        engine,
    });

    send_to_client(
        state,
        client_id,
        &json!({
            "type": "welcome",
            "sessionId": session_id,
            "seed": seed,
            "world": world,
        }),
        QueuePolicy::DisconnectOnFull,
    );
    send_to_client(
        state,
        client_id,
        &json!({
            "type": "state",
            "snapshot": snapshot,
        }),
        QueuePolicy::DropOnFull,
    );
}

fn handle_action(
    state: &mut ServerState,
    client_id: &str,
    node_id: &str,
    value: i64,
    distance: Option<f32>,
) {
    let Some(action) = ActionCode::from_code(value) else {
        send_action_error(state, client_id, &ActionError::InvalidAction(value));
        return;
    };

    let model = state.model.clone();
    let resolved = match mission_mut(state, client_id) {
        Some(mission) => mission
            .engine
            .handle_action(node_id, action, distance)
            .map(|outcome| {
                let feedback = model
                    .evaluate(&outcome.probability_request)
                    .map_err(|error| UplinkError::Malformed(error.to_string()));
                let probability = feedback.as_ref().ok().cloned();
                let new_fires = mission.engine.apply_probability_feedback(feedback);
                (mission.session_id.clone(), outcome, probability, new_fires)
            }),
        None => Err(ActionError::MissionEnded),
    };

    match resolved {
        Ok((session_id, outcome, probability, new_fires)) => {
            record_activity(state, &session_id, action, node_id);
            send_to_client(
                state,
                client_id,
                &json!({
                    "type": "action_result",
                    "outcome": outcome,
                    "probability": probability,
                    "newFires": new_fires,
                }),
                QueuePolicy::DisconnectOnFull,
            );
        }
        Err(error) => send_action_error(state, client_id, &error),
    }
}

fn record_activity(state: &mut ServerState, session_id: &str, action: ActionCode, node_id: &str) {
    if action.queries_network() {
        state.activity_store.record(session_id, action, node_id);
    }
}

fn mission_mut<'a>(state: &'a mut ServerState, client_id: &str) -> Option<&'a mut MissionSession> {
    state
        .clients
        .get_mut(client_id)
        .and_then(|client| client.mission.as_mut())
}

fn start_tick_loop(state: SharedState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(TICK_MS));
        loop {
            interval.tick().await;
            let mut guard = state.lock().await;
            tick_missions(&mut guard);
        }
    });
}

/// Persists the activity log off the request path; the file write happens
/// without holding the state lock.
fn start_activity_flush_loop(state: SharedState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(ACTIVITY_FLUSH_INTERVAL);
        loop {
            interval.tick().await;
            let Some(pending) = state.lock().await.activity_store.take_pending_write() else {
                continue;
            };
            let result = match pending.path.parent() {
                Some(parent) => tokio::fs::create_dir_all(parent).await,
                None => Ok(()),
            };
            let result = match result {
                Ok(()) => tokio::fs::write(&pending.path, &pending.text).await,
                Err(error) => Err(error),
            };
            if let Err(error) = result {
                tracing::warn!(path = %pending.path.display(), %error, "activity store: failed to write");
                state.lock().await.activity_store.restore_pending();
            }
        }
    });
}

fn tick_missions(state: &mut ServerState) {
    let mut client_ids: Vec<String> = state
        .clients
        .iter()
        .filter(|(_, client)| client.mission.is_some())
        .map(|(client_id, _)| client_id.clone())
        .collect();
    client_ids.sort_by_key(|client_id| session_order_key(client_id));

    for client_id in client_ids {
        let (snapshot, summary) = {
            let Some(mission) = mission_mut(state, &client_id) else {
                continue;
            };
            mission.engine.step(TICK_MS);
            let snapshot = mission.engine.build_snapshot(true);
            let summary = mission
                .engine
                .is_ended()
                .then(|| mission.engine.build_summary());
            (snapshot, summary)
        };

        send_to_client(
            state,
            &client_id,
            &json!({
                "type": "state",
                "snapshot": snapshot,
            }),
            QueuePolicy::DropOnFull,
        );

        if let Some(summary) = summary {
            tracing::info!(
                %client_id,
                state = summary.state.key(),
                elapsed_ms = summary.elapsed_ms,
                actions = summary.actions_taken,
                "mission finished"
            );
            send_to_client(
                state,
                &client_id,
                &json!({
                    "type": "game_over",
                    "summary": summary,
                }),
                QueuePolicy::DisconnectOnFull,
            );
            if let Some(client) = state.clients.get_mut(&client_id) {
                client.mission = None;
            }
        }
    }
}

fn send_to_client(state: &mut ServerState, client_id: &str, message: &Value, policy: QueuePolicy) {
    let send_failed = if let Some(client) = state.clients.get(client_id) {
        client
            .tx
            .try_send(OutboundMessage::Text(message.to_string()))
            .is_err()
    } else {
        false
    };
    if send_failed && policy == QueuePolicy::DisconnectOnFull {
        disconnect_client_internal(state, client_id);
    }
}

fn disconnect_client_internal(state: &mut ServerState, client_id: &str) {
    let Some(client) = state.clients.remove(client_id) else {
        return;
    };
    tracing::warn!(%client_id, "outbound queue full; closing connection");
    let _ = client.tx.try_send(OutboundMessage::Close {
        code: 1013,
        reason: "slow consumer".to_string(),
    });
}

fn send_action_error(state: &mut ServerState, client_id: &str, error: &ActionError) {
    tracing::debug!(%client_id, code = error.code(), "decision rejected");
    send_to_client(
        state,
        client_id,
        &error_message(error.code(), &error.to_string()),
        QueuePolicy::DisconnectOnFull,
    );
}

async fn send_error_to_client(state: &SharedState, client_id: &str, code: &str, message: &str) {
    let mut guard = state.lock().await;
    send_to_client(
        &mut guard,
        client_id,
        &error_message(code, message),
        QueuePolicy::DisconnectOnFull,
    );
}

fn error_message(code: &str, message: &str) -> Value {
    json!({
        "type": "error",
        "code": code,
        "message": message,
    })
}

fn make_id(prefix: &str) -> String {
    let seq = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_{seq}")
}

fn make_session_id() -> String {
    let suffix: String = rand::rng()
        .sample_iter(Alphanumeric)
        .take(12)
        .map(char::from)
        .collect();
    format!("session-{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_client(client_id: &str) -> (ServerState, mpsc::Receiver<OutboundMessage>) {
        let path = std::env::temp_dir()
            .join(format!("fire-scan-server-{}", rand::random::<u32>()))
            .join("activity.json");
        let mut state = ServerState::new(ActivityStore::new(path));
        let (tx, rx) = mpsc::channel(64);
        state.clients.insert(
            client_id.to_string(),
            ClientContext { tx, mission: None },
        );
        (state, rx)
    }

    fn next_message(rx: &mut mpsc::Receiver<OutboundMessage>) -> Value {
        match rx.try_recv().expect("message queued") {
            OutboundMessage::Text(text) => serde_json::from_str(&text).expect("valid json"),
            OutboundMessage::Close { .. } => panic!("unexpected close"),
        }
    }

    #[test]
    fn start_sends_welcome_then_state() {
        let (mut state, mut rx) = state_with_client("client_1");
        handle_start(&mut state, "client_1", Some(Variant::HumanCdn), Some(9));

        let welcome = next_message(&mut rx);
        assert_eq!(welcome["type"], "welcome");
        assert_eq!(welcome["seed"], 9);
        assert_eq!(welcome["world"]["config"]["variant"], "human_cdn");
        assert_eq!(next_message(&mut rx)["type"], "state");
    }

    #[test]
    fn action_without_mission_reports_error_code() {
        let (mut state, mut rx) = state_with_client("client_1");
        handle_action(&mut state, "client_1", "ACT-0", 1, None);
        let message = next_message(&mut rx);
        assert_eq!(message["type"], "error");
        assert_eq!(message["code"], ActionError::MissionEnded.code());

        handle_action(&mut state, "client_1", "ACT-0", 9, None);
        assert_eq!(
            next_message(&mut rx)["code"],
            ActionError::InvalidAction(9).code()
        );
    }

    #[test]
    fn unknown_node_is_rejected_after_start() {
        let (mut state, mut rx) = state_with_client("client_1");
        handle_start(&mut state, "client_1", None, Some(3));
        let _ = next_message(&mut rx);
        let _ = next_message(&mut rx);

        handle_action(&mut state, "client_1", "missing-node", 2, None);
        let message = next_message(&mut rx);
        assert_eq!(message["type"], "error");
        assert_eq!(
            message["code"],
            ActionError::UnknownNode("missing-node".to_string()).code()
        );
        assert!(state.activity_store.build_response(None).entries.is_empty());
    }

    fn reachable_node(state: &mut ServerState, client_id: &str) -> String {
        mission_mut(state, client_id)
            .and_then(|mission| {
                mission
                    .engine
                    .build_snapshot(false)
                    .nodes
                    .iter()
                    .find(|node| !node.compromised)
                    .map(|node| node.id.clone())
            })
            .expect("reachable node")
    }

    #[test]
    fn only_network_decisions_are_logged() {
        let (mut state, mut rx) = state_with_client("client_1");
        let (tx_2, mut rx_2) = mpsc::channel(64);
        state.clients.insert(
            "client_2".to_string(),
            ClientContext { tx: tx_2, mission: None },
        );
        for (client_id, rx) in [("client_1", &mut rx), ("client_2", &mut rx_2)] {
            handle_start(&mut state, client_id, Some(Variant::HumanOnly), Some(3));
            let _ = next_message(rx);
            let _ = next_message(rx);
        }

        let node_id = reachable_node(&mut state, "client_1");
        handle_action(&mut state, "client_1", &node_id, 2, None);
        let scanned = next_message(&mut rx);
        assert_eq!(scanned["type"], "action_result");
        assert!(scanned["newFires"].is_u64());
        handle_action(&mut state, "client_1", &node_id, 3, None);
        let _ = next_message(&mut rx);
        assert!(state.activity_store.build_response(None).entries.is_empty());

        let node_id = reachable_node(&mut state, "client_2");
        handle_action(&mut state, "client_2", &node_id, 1, None);
        let suppressed = next_message(&mut rx_2);
        assert_eq!(suppressed["type"], "action_result");
        let entries = state.activity_store.build_response(None).entries;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].node_id, node_id);
        assert_eq!(entries[0].action_performed, "Suppression");
    }

    #[test]
    fn session_ids_are_prefixed_and_random() {
        let first = make_session_id();
        assert!(first.starts_with("session-"));
        assert_eq!(first.len(), "session-".len() + 12);
        assert_ne!(first, make_session_id());
    }
}
