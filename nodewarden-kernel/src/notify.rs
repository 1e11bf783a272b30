/**
 * NOTIFY - Sink d'alertes injectable
 *
 * RÔLE :
 * Sépare l'émission de notifications du chemin de mutation du protocole.
 * Le kernel traite le sink en fire-and-forget : tentative bornée, pas de
 * retry, un sink lent ou cassé dégrade les notifications mais ne bloque
 * jamais l'acquittement d'un heartbeat ni la livraison de tâches.
 *
 * UTILITÉ :
 * 🎯 Production : LogSink (un front chat/webhook se branche ici)
 * 🎯 Tests : RecordingSink pour asserter les séquences d'alertes exactes
 */

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertCategory {
    /// Transitions down/up détectées par le moniteur
    Downtime,
    /// Résultat d'une commande remonté par un node
    CommandResult,
}

impl AlertCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertCategory::Downtime => "downtime",
            AlertCategory::CommandResult => "command_result",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub category: AlertCategory,
    pub message: String,
}

/// Collaborateur externe de notification. `deliver` ne doit jamais bloquer ;
/// un échec est loggé par l'implémentation, jamais remonté ni rejoué.
pub trait AlertSink: Send + Sync {
    fn deliver(&self, alert: Alert);
}

/// Sink par défaut : trace l'alerte sur la sortie du kernel
pub struct LogSink;

impl AlertSink for LogSink {
    fn deliver(&self, alert: Alert) {
        println!("[alert] ({}) {}", alert.category.as_str(), alert.message);
    }
}

/// Sink de capture pour les tests : enregistre les alertes dans l'ordre
#[derive(Default)]
pub struct RecordingSink {
    pub alerts: Mutex<Vec<Alert>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn taken(&self) -> Vec<Alert> {
        std::mem::take(&mut *self.alerts.lock())
    }
}

impl AlertSink for RecordingSink {
    fn deliver(&self, alert: Alert) {
        self.alerts.lock().push(alert);
    }
}
