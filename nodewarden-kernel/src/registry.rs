/**
 * NODE REGISTRY - Table centrale des nodes supervisés
 *
 * RÔLE :
 * Propriétaire exclusif de l'état des nodes : création/suppression durables,
 * heartbeats, file de commandes par node, flags de liveness.
 *
 * FONCTIONNEMENT :
 * - Map token -> NodeRecord derrière un Mutex (jamais exposée brute)
 * - create/delete persistés en JSON par écriture atomique (tmp + fsync + rename)
 * - Mutations de heartbeat (last_seen, ip, stats, drain, flags) en mémoire
 *   seulement : elles se reconstruisent en un intervalle après redémarrage
 *
 * CONCURRENCE :
 * Toutes les opérations sur un même token sont linéarisées par le Mutex ;
 * le verrou n'est jamais tenu au travers d'un await.
 */

use crate::models::{CommandResult, NodeRecord, NodesMap, StatsMap, Task};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Commande de classe reboot : déclenche la fenêtre de suppression d'alerte
pub const REBOOT_COMMAND: &str = "reboot";

pub fn is_reboot_class(command: &str) -> bool {
    command == REBOOT_COMMAND
}

pub fn now_epoch() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown node token")]
    UnknownToken,
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

pub struct NodeRegistry {
    nodes: Arc<Mutex<NodesMap>>,
    data_file: PathBuf,
    /// Sérialise les écritures disque : deux create/delete concurrents ne
    /// doivent jamais se partager le fichier temporaire
    save_lock: tokio::sync::Mutex<()>,
}

pub type SharedNodeRegistry = Arc<NodeRegistry>;

impl NodeRegistry {
    pub fn new(data_file: impl Into<PathBuf>) -> Self {
        Self {
            nodes: Arc::new(Mutex::new(NodesMap::new())),
            data_file: data_file.into(),
            save_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Charge le registre depuis le fichier JSON ; fichier absent = registre vide
    pub async fn load(&self) -> Result<(), RegistryError> {
        if !self.data_file.exists() {
            println!("[registry] no existing nodes file, starting fresh");
            return Ok(());
        }

        let content = tokio::fs::read_to_string(&self.data_file).await?;
        let loaded: NodesMap = serde_json::from_str(&content)?;

        let mut nodes = self.nodes.lock();
        *nodes = loaded;
        println!("[registry] loaded {} nodes from {}", nodes.len(), self.data_file.display());
        Ok(())
    }

    /// Persiste le registre : écriture tmp + fsync + rename pour qu'un crash
    /// ne laisse jamais un fichier de nodes corrompu
    pub async fn save(&self) -> Result<(), RegistryError> {
        // un seul écrivain à la fois ; le snapshot est pris après la prise
        // du verrou pour que le dernier save publie bien l'état le plus frais
        let _writer = self.save_lock.lock().await;

        let content = {
            let nodes = self.nodes.lock();
            serde_json::to_string_pretty(&*nodes)?
        };

        if let Some(parent) = self.data_file.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let tmp = self.data_file.with_extension("json.tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(content.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, &self.data_file).await?;
        Ok(())
    }

    /// Crée un node et retourne son token (128 bits aléatoires, hex).
    /// Une erreur de stockage est propagée ; l'entrée mémoire n'est pas
    /// annulée (fenêtre d'incohérence jusqu'au prochain persist réussi).
    pub async fn create(&self, name: &str) -> Result<String, RegistryError> {
        let token = Uuid::new_v4().simple().to_string();

        {
            let mut nodes = self.nodes.lock();
            nodes.insert(
                token.clone(),
                NodeRecord {
                    name: name.to_string(),
                    created_at: now_epoch(),
                    last_seen: 0,
                    ip: "Unknown".to_string(),
                    stats: StatsMap::new(),
                    tasks: Vec::new(),
                    is_restarting: false,
                    is_offline_alert_sent: false,
                },
            );
        }

        self.save().await?;
        println!("[registry] created node: {} (token: {}...)", name, &token[..8]);
        Ok(token)
    }

    /// Supprime un node (et sa file de commandes). No-op si le token est inconnu.
    /// Retourne true si une entrée a été retirée.
    pub async fn delete(&self, token: &str) -> Result<bool, RegistryError> {
        let removed = {
            let mut nodes = self.nodes.lock();
            nodes.remove(token)
        };

        match removed {
            Some(node) => {
                self.save().await?;
                println!("[registry] deleted node: {}", node.name);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn get(&self, token: &str) -> Option<NodeRecord> {
        self.nodes.lock().get(token).cloned()
    }

    /// Snapshot stable pour une passe du moniteur ou une vue API : le
    /// registre peut changer de taille pendant le traitement des entrées
    pub fn snapshot(&self) -> Vec<(String, NodeRecord)> {
        self.nodes
            .lock()
            .iter()
            .map(|(token, node)| (token.clone(), node.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.lock().len()
    }

    /// Opération centrale du protocole : applique un heartbeat accepté.
    ///
    /// Dans l'ordre : contrôle de confirmation reboot, rafraîchissement de
    /// last_seen/ip/stats, puis drain atomique de la file de commandes.
    /// Livraison at-most-once : les tâches quittent la file au moment où
    /// elles partent dans la réponse, sans re-livraison si elle se perd.
    pub fn apply_heartbeat(
        &self,
        token: &str,
        ip: &str,
        stats: StatsMap,
        results: &[CommandResult],
    ) -> Result<Vec<Task>, RegistryError> {
        let mut nodes = self.nodes.lock();
        let node = nodes.get_mut(token).ok_or(RegistryError::UnknownToken)?;

        // Si le node était marqué restarting mais ne confirme aucun reboot,
        // le flag est périmé. Si une confirmation est présente, le flag
        // reste posé : elle arrive AVANT que le node parte au reboot, et
        // doit survivre assez longtemps pour supprimer l'alerte down qui
        // suivrait ; le moniteur le retirera à la prochaine passe vivante.
        let reboot_confirmed = results.iter().any(|r| is_reboot_class(&r.command));
        if node.is_restarting && !reboot_confirmed {
            node.is_restarting = false;
        }

        node.last_seen = now_epoch();
        node.ip = ip.to_string();
        node.stats = stats;

        Ok(std::mem::take(&mut node.tasks))
    }

    /// Ajoute une commande à la file du node. Une commande de classe reboot
    /// ouvre immédiatement la fenêtre de suppression d'alerte (optimiste,
    /// avant toute confirmation).
    pub fn enqueue_task(&self, token: &str, command: &str, user_id: i64) -> Result<(), RegistryError> {
        let mut nodes = self.nodes.lock();
        let node = nodes.get_mut(token).ok_or(RegistryError::UnknownToken)?;

        if is_reboot_class(command) {
            node.is_restarting = true;
        }
        node.tasks.push(Task {
            command: command.to_string(),
            user_id,
        });
        Ok(())
    }

    /// Écrit les flags décidés par une passe du moniteur. Tolère qu'un node
    /// ait été supprimé entre le snapshot et l'application.
    ///
    /// Chaque flag n'est écrit que si la fiche vivante porte encore la
    /// valeur vue dans le snapshot : un dispatch reboot ou un heartbeat
    /// traité entre le snapshot et l'écriture ne doit pas être écrasé
    /// (sinon une fenêtre de suppression fraîchement ouverte serait
    /// effacée). Un flag sauté est réévalué à la passe suivante.
    pub fn apply_liveness(
        &self,
        token: &str,
        seen: &NodeRecord,
        alert_latched: bool,
        is_restarting: bool,
    ) {
        let mut nodes = self.nodes.lock();
        if let Some(node) = nodes.get_mut(token) {
            if node.is_offline_alert_sent == seen.is_offline_alert_sent {
                node.is_offline_alert_sent = alert_latched;
            }
            if node.is_restarting == seen.is_restarting {
                node.is_restarting = is_restarting;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_registry(dir: &tempfile::TempDir) -> NodeRegistry {
        NodeRegistry::new(dir.path().join("nodes.json"))
    }

    #[tokio::test]
    async fn test_create_then_get_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let registry = test_registry(&dir);

        let token = registry.create("web1").await.unwrap();
        assert_eq!(token.len(), 32);

        let node = registry.get(&token).unwrap();
        assert_eq!(node.name, "web1");
        assert_eq!(node.last_seen, 0);
        assert!(node.tasks.is_empty());
        assert!(!node.is_restarting);
        assert!(!node.is_offline_alert_sent);
    }

    #[tokio::test]
    async fn test_unknown_token_is_rejected_without_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let registry = test_registry(&dir);

        let hb = registry.apply_heartbeat("deadbeef", "10.0.0.1", StatsMap::new(), &[]);
        assert!(matches!(hb, Err(RegistryError::UnknownToken)));

        let enq = registry.enqueue_task("deadbeef", "top", 42);
        assert!(matches!(enq, Err(RegistryError::UnknownToken)));

        assert_eq!(registry.len(), 0);
    }

    #[tokio::test]
    async fn test_task_queue_fifo_and_single_drain() {
        let dir = tempfile::tempdir().unwrap();
        let registry = test_registry(&dir);
        let token = registry.create("web1").await.unwrap();

        registry.enqueue_task(&token, "selftest", 7).unwrap();
        registry.enqueue_task(&token, "top", 42).unwrap();

        let tasks = registry
            .apply_heartbeat(&token, "10.0.0.1", StatsMap::new(), &[])
            .unwrap();
        assert_eq!(
            tasks,
            vec![
                Task { command: "selftest".into(), user_id: 7 },
                Task { command: "top".into(), user_id: 42 },
            ]
        );

        // second drain immédiat : file vide, aucune re-livraison
        let tasks = registry
            .apply_heartbeat(&token, "10.0.0.1", StatsMap::new(), &[])
            .unwrap();
        assert!(tasks.is_empty());
    }

    #[tokio::test]
    async fn test_heartbeat_is_idempotent_for_stats_and_ip() {
        let dir = tempfile::tempdir().unwrap();
        let registry = test_registry(&dir);
        let token = registry.create("web1").await.unwrap();

        let mut stats = StatsMap::new();
        stats.insert("cpu".into(), serde_json::json!(10));

        registry.apply_heartbeat(&token, "10.0.0.9", stats.clone(), &[]).unwrap();
        let first = registry.get(&token).unwrap();

        registry.apply_heartbeat(&token, "10.0.0.9", stats, &[]).unwrap();
        let second = registry.get(&token).unwrap();

        assert_eq!(first.stats, second.stats);
        assert_eq!(first.ip, second.ip);
        assert!(second.last_seen >= first.last_seen);
    }

    #[tokio::test]
    async fn test_reboot_enqueue_opens_restart_window() {
        let dir = tempfile::tempdir().unwrap();
        let registry = test_registry(&dir);
        let token = registry.create("web1").await.unwrap();

        registry.enqueue_task(&token, REBOOT_COMMAND, 1).unwrap();
        assert!(registry.get(&token).unwrap().is_restarting);
    }

    #[tokio::test]
    async fn test_heartbeat_without_confirmation_clears_stale_restart_flag() {
        let dir = tempfile::tempdir().unwrap();
        let registry = test_registry(&dir);
        let token = registry.create("web1").await.unwrap();
        registry.enqueue_task(&token, REBOOT_COMMAND, 1).unwrap();

        registry.apply_heartbeat(&token, "10.0.0.1", StatsMap::new(), &[]).unwrap();
        assert!(!registry.get(&token).unwrap().is_restarting);
    }

    #[tokio::test]
    async fn test_heartbeat_with_reboot_confirmation_keeps_flag() {
        let dir = tempfile::tempdir().unwrap();
        let registry = test_registry(&dir);
        let token = registry.create("web1").await.unwrap();
        registry.enqueue_task(&token, REBOOT_COMMAND, 1).unwrap();

        let results = [CommandResult {
            command: REBOOT_COMMAND.into(),
            user_id: 1,
            result: "reboot scheduled".into(),
        }];
        registry.apply_heartbeat(&token, "10.0.0.1", StatsMap::new(), &results).unwrap();

        // la confirmation précède l'extinction : le flag doit survivre
        assert!(registry.get(&token).unwrap().is_restarting);
    }

    #[tokio::test]
    async fn test_delete_discards_queue_and_is_noop_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let registry = test_registry(&dir);
        let token = registry.create("web1").await.unwrap();
        registry.enqueue_task(&token, "top", 42).unwrap();

        assert!(registry.delete(&token).await.unwrap());
        assert!(registry.get(&token).is_none());
        assert!(!registry.delete(&token).await.unwrap());
    }

    #[tokio::test]
    async fn test_persistence_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nodes.json");

        let registry = NodeRegistry::new(&path);
        let kept = registry.create("web1").await.unwrap();
        let gone = registry.create("web2").await.unwrap();
        registry.delete(&gone).await.unwrap();

        let reloaded = NodeRegistry::new(&path);
        reloaded.load().await.unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.get(&kept).unwrap().name, "web1");
        assert!(reloaded.get(&gone).is_none());
    }

    #[tokio::test]
    async fn test_liveness_write_back_keeps_restart_window_opened_since_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let registry = test_registry(&dir);
        let token = registry.create("web1").await.unwrap();
        registry.apply_heartbeat(&token, "10.0.0.1", StatsMap::new(), &[]).unwrap();

        // snapshot d'une passe du moniteur : flag restarting encore baissé
        let seen = registry.get(&token).unwrap();
        assert!(!seen.is_restarting);

        // dispatch reboot intercalé entre le snapshot et l'écriture
        registry.enqueue_task(&token, REBOOT_COMMAND, 1).unwrap();

        // la passe voulait retirer un flag périmé : la fenêtre fraîchement
        // ouverte doit survivre à l'écriture
        registry.apply_liveness(&token, &seen, seen.is_offline_alert_sent, false);
        assert!(registry.get(&token).unwrap().is_restarting);
    }

    #[tokio::test]
    async fn test_liveness_write_back_applies_latch_when_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let registry = test_registry(&dir);
        let token = registry.create("web1").await.unwrap();
        registry.apply_heartbeat(&token, "10.0.0.1", StatsMap::new(), &[]).unwrap();

        let seen = registry.get(&token).unwrap();
        registry.apply_liveness(&token, &seen, true, seen.is_restarting);
        assert!(registry.get(&token).unwrap().is_offline_alert_sent);
    }

    #[tokio::test]
    async fn test_concurrent_creates_persist_a_parseable_registry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nodes.json");
        let registry = Arc::new(NodeRegistry::new(&path));

        // saves concurrents : chacun doit publier un snapshot complet
        let (a, b, c) = tokio::join!(
            registry.create("web1"),
            registry.create("web2"),
            registry.create("web3"),
        );
        a.unwrap();
        b.unwrap();
        c.unwrap();

        let reloaded = NodeRegistry::new(&path);
        reloaded.load().await.unwrap();
        assert_eq!(reloaded.len(), 3);
    }

    #[tokio::test]
    async fn test_load_missing_file_yields_empty_registry() {
        let dir = tempfile::tempdir().unwrap();
        let registry = test_registry(&dir);
        registry.load().await.unwrap();
        assert_eq!(registry.len(), 0);
    }
}
