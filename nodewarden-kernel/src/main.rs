/**
 * NODEWARDEN KERNEL - Point d'entrée du serveur central
 *
 * RÔLE : Orchestration des modules : config, registre, moniteur, HTTP.
 * Les nodes se signalent sur /api/heartbeat ; le moniteur classifie la
 * flotte et émet les alertes down/up vers le sink de notification.
 *
 * ARCHITECTURE : Registre unique mutex-gardé + endpoint heartbeat +
 * moniteur périodique + API REST d'administration.
 */

mod config;
mod http;
mod liveness;
mod models;
mod monitor;
mod notify;
mod registry;

use crate::config::KernelConfig;
use crate::http::AppState;
use crate::notify::{AlertSink, LogSink};
use crate::registry::{NodeRegistry, SharedNodeRegistry};

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    let cfg = KernelConfig::from_env();

    // registre des nodes avec persistance JSON
    let registry: SharedNodeRegistry = Arc::new(NodeRegistry::new(&cfg.data_file));
    if let Err(e) = registry.load().await {
        eprintln!("[kernel] failed to load nodes file: {e}");
    }
    println!("[kernel] tracking {} nodes", registry.len());

    // sink de notification (un front chat/webhook se branche ici)
    let sink: Arc<dyn AlertSink> = Arc::new(LogSink);

    // moniteur de liveness edge-triggered
    monitor::spawn_monitor(
        registry.clone(),
        sink.clone(),
        cfg.offline_timeout,
        cfg.monitor_interval_secs,
    );

    // fabrique l'état unique pour Axum
    let app_state = AppState {
        registry,
        sink,
        cfg: cfg.clone(),
    };

    // HTTP (connect-info requis : l'IP source est enregistrée à chaque heartbeat)
    let app = http::build_router(app_state);

    let addr = SocketAddr::new(cfg.http_host, cfg.http_port);
    println!("[kernel] listening on http://{addr}");
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("http server terminated")?;
    Ok(())
}
