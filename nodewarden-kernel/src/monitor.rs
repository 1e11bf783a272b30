/**
 * MONITOR - Passe périodique de liveness sur le registre
 *
 * RÔLE :
 * Classifie chaque node à intervalle fixe (indépendant de la cadence de
 * heartbeat individuelle), émet les alertes down/up edge-triggered et
 * nettoie les flags restarting périmés.
 *
 * FONCTIONNEMENT :
 * - Itère un snapshot stable pris en début de passe : le registre peut
 *   changer de taille pendant le traitement
 * - Les décisions par node viennent des fonctions pures de liveness.rs ;
 *   un problème sur un node n'avorte jamais le reste de la passe
 * - Aucun ordre défini entre nodes : le protocole n'en dépend pas
 */

use crate::liveness::{self, Edge};
use crate::notify::{Alert, AlertCategory, AlertSink};
use crate::registry::{now_epoch, SharedNodeRegistry};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;

/// Délai avant la première passe, le temps que les nodes se re-signalent
/// après un démarrage du kernel
const SETTLE_DELAY_SECS: u64 = 10;

pub fn spawn_monitor(
    registry: SharedNodeRegistry,
    sink: Arc<dyn AlertSink>,
    offline_timeout: i64,
    poll_interval_secs: u64,
) {
    println!(
        "[monitor] started (timeout: {}s, poll: {}s)",
        offline_timeout, poll_interval_secs
    );

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(SETTLE_DELAY_SECS)).await;
        let mut interval = tokio::time::interval(Duration::from_secs(poll_interval_secs));

        loop {
            interval.tick().await;
            run_pass(&registry, sink.as_ref(), offline_timeout, now_epoch());
        }
    });
}

/// Une passe complète du moniteur à l'instant `now`
pub fn run_pass(
    registry: &SharedNodeRegistry,
    sink: &dyn AlertSink,
    offline_timeout: i64,
    now: i64,
) {
    for (token, node) in registry.snapshot() {
        let outcome = liveness::evaluate(&node, now, offline_timeout);

        match outcome.edge {
            Some(Edge::Down) => {
                sink.deliver(Alert {
                    category: AlertCategory::Downtime,
                    message: format!(
                        "Node {} is DOWN (last seen at {})",
                        node.name,
                        format_clock(node.last_seen)
                    ),
                });
                eprintln!("[monitor] node {} is DOWN, alert sent", node.name);
            }
            Some(Edge::Up) => {
                sink.deliver(Alert {
                    category: AlertCategory::Downtime,
                    message: format!("Node {} recovered", node.name),
                });
                println!("[monitor] node {} recovered, alert sent", node.name);
            }
            None => {}
        }

        if outcome.alert_latched != node.is_offline_alert_sent
            || outcome.is_restarting != node.is_restarting
        {
            // écriture conditionnelle : un flag modifié entre le snapshot
            // et cette passe (dispatch reboot, heartbeat) reste intact
            registry.apply_liveness(&token, &node, outcome.alert_latched, outcome.is_restarting);
        }
    }
}

fn format_clock(epoch: i64) -> String {
    let fmt = time::macros::format_description!("[hour]:[minute]:[second]");
    OffsetDateTime::from_unix_timestamp(epoch)
        .ok()
        .and_then(|t| t.format(&fmt).ok())
        .unwrap_or_else(|| "?".to_string())
}
