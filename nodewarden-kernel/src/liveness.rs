/**
 * LIVENESS - Machine à états online/offline/restarting des nodes
 *
 * RÔLE :
 * Fonctions pures de classification et de transition, isolées du timing
 * et du registre pour rester testables sans horloge réelle.
 *
 * RÈGLES :
 * - Un node est mort si (now - last_seen >= timeout) ET last_seen > 0 ;
 *   un node jamais vu reste "unknown", jamais alerté
 * - Alerte down : mort, latch non posé, pas en fenêtre de reboot
 * - Alerte up : vivant alors que le latch était posé
 * - Nettoyage : vivant avec flag restarting -> flag retiré en silence
 */

use crate::models::NodeRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessState {
    Unknown,
    Online,
    Offline,
    Restarting,
}

impl LivenessState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LivenessState::Unknown => "unknown",
            LivenessState::Online => "online",
            LivenessState::Offline => "offline",
            LivenessState::Restarting => "restarting",
        }
    }
}

/// Front de transition détecté pendant une passe du moniteur
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Down,
    Up,
}

/// Résultat d'une passe pour un node : front éventuel + nouveaux flags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassOutcome {
    pub edge: Option<Edge>,
    pub alert_latched: bool,
    pub is_restarting: bool,
}

pub fn is_dead(node: &NodeRecord, now: i64, offline_timeout: i64) -> bool {
    node.last_seen > 0 && now - node.last_seen >= offline_timeout
}

/// Statut affichable d'un node (vues API)
pub fn classify(node: &NodeRecord, now: i64, offline_timeout: i64) -> LivenessState {
    if node.is_restarting {
        return LivenessState::Restarting;
    }
    if node.last_seen == 0 {
        return LivenessState::Unknown;
    }
    if is_dead(node, now, offline_timeout) {
        LivenessState::Offline
    } else {
        LivenessState::Online
    }
}

/// Évalue les trois règles du moniteur pour un node.
/// Les trois contrôles sont indépendants : une même passe peut retirer un
/// flag restarting périmé et constater que le node est vivant.
pub fn evaluate(node: &NodeRecord, now: i64, offline_timeout: i64) -> PassOutcome {
    let dead = is_dead(node, now, offline_timeout);

    let mut outcome = PassOutcome {
        edge: None,
        alert_latched: node.is_offline_alert_sent,
        is_restarting: node.is_restarting,
    };

    if dead && !node.is_offline_alert_sent && !node.is_restarting {
        outcome.edge = Some(Edge::Down);
        outcome.alert_latched = true;
    } else if !dead && node.is_offline_alert_sent {
        outcome.edge = Some(Edge::Up);
        outcome.alert_latched = false;
    }

    if !dead && node.is_restarting {
        outcome.is_restarting = false;
    }

    outcome
}
