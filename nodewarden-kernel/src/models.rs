use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Stats remontées par un node : opaques pour le kernel, seule la liveness compte
pub type StatsMap = HashMap<String, serde_json::Value>;

/// Commande en attente de livraison vers un node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub command: String,
    pub user_id: i64,
}

/// Résultat d'une commande exécutée côté node, remonté dans le heartbeat suivant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    pub command: String,
    pub user_id: i64,
    pub result: String,
}

/// Fiche d'un node enregistré, indexée par token opaque
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub name: String,
    pub created_at: i64,
    /// Epoch secondes du dernier heartbeat accepté ; 0 = jamais contacté
    #[serde(default)]
    pub last_seen: i64,
    #[serde(default = "default_ip")]
    pub ip: String,
    #[serde(default)]
    pub stats: StatsMap,
    /// FIFO des commandes en attente (drainée par le heartbeat)
    #[serde(default)]
    pub tasks: Vec<Task>,
    /// Fenêtre de reboot planifié : supprime l'alerte down pendant le restart
    #[serde(default)]
    pub is_restarting: bool,
    /// Latch edge-triggered : true une fois l'alerte down émise pour la panne courante
    #[serde(default)]
    pub is_offline_alert_sent: bool,
}

fn default_ip() -> String {
    "Unknown".to_string()
}

pub type NodesMap = HashMap<String, NodeRecord>;

/// Corps du POST /api/heartbeat
#[derive(Debug, Deserialize)]
pub struct HeartbeatIn {
    pub token: Option<String>,
    #[serde(default)]
    pub stats: StatsMap,
    #[serde(default)]
    pub results: Vec<CommandResult>,
}
