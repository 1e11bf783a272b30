/**
 * API REST NODEWARDEN - Serveur HTTP du kernel
 *
 * RÔLE :
 * Expose le contrat heartbeat côté nodes et l'API d'administration
 * consommée par le front (chat/dashboard).
 *
 * ROUTES :
 * - POST /api/heartbeat : contrat wire des nodes (auth par token)
 * - GET  /health : liveness du kernel lui-même
 * - GET  /nodes, POST /nodes, GET/DELETE /nodes/{token},
 *   POST /nodes/{token}/commands : administration (header x-api-key)
 *
 * SÉCURITÉ :
 * - x-api-key obligatoire sur les routes admin
 * - /health et /api/heartbeat exemptés : le heartbeat est authentifié par
 *   le token bearer du node (401 absent, 403 inconnu), sans effet de bord
 *   en cas de rejet
 */

use crate::config::KernelConfig;
use crate::liveness;
use crate::models::{HeartbeatIn, NodeRecord, StatsMap};
use crate::notify::{Alert, AlertCategory, AlertSink};
use crate::registry::{now_epoch, RegistryError, SharedNodeRegistry};
use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub registry: SharedNodeRegistry,
    pub sink: Arc<dyn AlertSink>,
    pub cfg: KernelConfig,
}

async fn require_api_key(req: Request, next: Next) -> Result<Response, StatusCode> {
    let path = req.uri().path();

    // health check et heartbeat toujours accessibles (auth par token node)
    if path.starts_with("/health") || path.starts_with("/api/heartbeat") {
        return Ok(next.run(req).await);
    }

    let expected = std::env::var("WARDEN_API_KEY").unwrap_or_default();
    if expected.is_empty() {
        eprintln!("SECURITY: WARDEN_API_KEY not set - admin API access denied");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let ok = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == expected)
        .unwrap_or(false);

    if !ok {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/heartbeat", post(heartbeat))
        .route("/nodes", get(list_nodes).post(create_node))
        .route("/nodes/{token}", get(get_node).delete(delete_node))
        .route("/nodes/{token}/commands", post(enqueue_command))
        .with_state(app_state)
        .layer(middleware::from_fn(require_api_key))
}

// POST /api/heartbeat (contrat wire des nodes)
async fn heartbeat(
    State(app): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    payload: Result<Json<HeartbeatIn>, JsonRejection>,
) -> (StatusCode, Json<serde_json::Value>) {
    let Ok(Json(body)) = payload else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "Invalid JSON" })),
        );
    };

    let token = match body.token.as_deref() {
        Some(t) if !t.is_empty() => t,
        _ => {
            return (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({ "error": "Token required" })),
            )
        }
    };

    let ip = peer.ip().to_string();
    let tasks = match app.registry.apply_heartbeat(token, &ip, body.stats, &body.results) {
        Ok(tasks) => tasks,
        Err(RegistryError::UnknownToken) => {
            return (
                StatusCode::FORBIDDEN,
                Json(serde_json::json!({ "error": "Invalid token" })),
            )
        }
        Err(e) => {
            eprintln!("[http] heartbeat failed: {e}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "internal error" })),
            );
        }
    };

    // Émission best-effort, après la mutation d'état : une notification par
    // résultat, ordre du batch préservé, jamais bloquant pour la réponse
    let node_name = app
        .registry
        .get(token)
        .map(|n| n.name)
        .unwrap_or_else(|| "?".to_string());
    for result in &body.results {
        app.sink.deliver(Alert {
            category: AlertCategory::CommandResult,
            message: format!(
                "[{}] {} (user {}): {}",
                node_name, result.command, result.user_id, result.result
            ),
        });
    }

    (
        StatusCode::OK,
        Json(serde_json::json!({ "status": "ok", "tasks": tasks })),
    )
}

#[derive(serde::Serialize)]
struct NodeView {
    token: String,
    name: String,
    status: &'static str,
    last_seen: i64,
    seen_ago_seconds: Option<i64>,
    ip: String,
    pending_tasks: usize,
    stats: StatsMap,
}

fn to_view(token: String, node: &NodeRecord, now: i64, offline_timeout: i64) -> NodeView {
    NodeView {
        name: node.name.clone(),
        status: liveness::classify(node, now, offline_timeout).as_str(),
        last_seen: node.last_seen,
        seen_ago_seconds: (node.last_seen > 0).then(|| (now - node.last_seen).max(0)),
        ip: node.ip.clone(),
        pending_tasks: node.tasks.len(),
        stats: node.stats.clone(),
        token,
    }
}

// GET /nodes (liste)
async fn list_nodes(State(app): State<AppState>) -> Json<Vec<NodeView>> {
    let now = now_epoch();
    let list = app
        .registry
        .snapshot()
        .into_iter()
        .map(|(token, node)| to_view(token, &node, now, app.cfg.offline_timeout))
        .collect();
    Json(list)
}

// GET /nodes/{token} (détail)
async fn get_node(
    State(app): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<NodeView>, StatusCode> {
    let node = app.registry.get(&token).ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(to_view(token, &node, now_epoch(), app.cfg.offline_timeout)))
}

#[derive(Debug, Deserialize)]
struct CreateNodeIn {
    name: String,
}

// POST /nodes (création, retourne le token du node)
async fn create_node(
    State(app): State<AppState>,
    Json(body): Json<CreateNodeIn>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    match app.registry.create(&body.name).await {
        Ok(token) => Ok(Json(serde_json::json!({
            "token": token,
            "name": body.name,
            "status": "created",
        }))),
        Err(e) => {
            eprintln!("[http] failed to create node {}: {e}", body.name);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

// DELETE /nodes/{token}
async fn delete_node(
    State(app): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    match app.registry.delete(&token).await {
        Ok(true) => Ok(Json(serde_json::json!({ "status": "deleted" }))),
        Ok(false) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            eprintln!("[http] failed to delete node: {e}");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

#[derive(Debug, Deserialize)]
struct EnqueueCommandIn {
    command: String,
    user_id: i64,
}

// POST /nodes/{token}/commands (mise en file, livraison au prochain heartbeat)
async fn enqueue_command(
    State(app): State<AppState>,
    Path(token): Path<String>,
    Json(body): Json<EnqueueCommandIn>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    match app.registry.enqueue_task(&token, &body.command, body.user_id) {
        Ok(()) => Ok(Json(serde_json::json!({ "status": "queued" }))),
        Err(RegistryError::UnknownToken) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            eprintln!("[http] failed to enqueue command: {e}");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
