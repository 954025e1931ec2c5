use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use crate::admission::AdmissionController;
use crate::config::ServerConfig;
use crate::connection::ConnectionHandler;
use crate::notify::{LogNotifier, Notifier};
use crate::party::PartyCoordinator;
use crate::ready::ReadyCoordinator;
use crate::reconciler::{CooldownReconciler, DisconnectReconciler};
use crate::registry::StateRegistry;
use crate::runs::RunCoordinator;

/// Everything the handlers and background tasks share. One registry per
/// AppState — tests construct as many isolated instances as they need.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub registry: Arc<StateRegistry>,
    pub ready: Arc<ReadyCoordinator>,
    pub runs: Arc<RunCoordinator>,
    pub party: Arc<PartyCoordinator>,
    pub connections: Arc<ConnectionHandler>,
    pub admission: Arc<AdmissionController>,
    pub disconnect_reconciler: Arc<DisconnectReconciler>,
    pub cooldown_reconciler: Arc<CooldownReconciler>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self::with_notifier(config, Arc::new(LogNotifier))
    }

    pub fn with_notifier(config: ServerConfig, notifier: Arc<dyn Notifier>) -> Self {
        let config = Arc::new(config);
        let registry = Arc::new(StateRegistry::new());
        let admission_enabled = Arc::new(AtomicBool::new(config.admission.enabled));

        let ready = Arc::new(ReadyCoordinator::new(
            Arc::clone(&registry),
            Arc::clone(&config),
            Arc::clone(&notifier),
            Arc::clone(&admission_enabled),
        ));
        let runs = Arc::new(RunCoordinator::new(
            Arc::clone(&registry),
            Arc::clone(&config),
            Arc::clone(&notifier),
            Arc::clone(&ready),
        ));
        let party = Arc::new(PartyCoordinator::new(
            Arc::clone(&registry),
            Arc::clone(&config),
            Arc::clone(&notifier),
            Arc::clone(&ready),
        ));
        let connections = Arc::new(ConnectionHandler::new(
            Arc::clone(&registry),
            Arc::clone(&config),
            Arc::clone(&notifier),
            Arc::clone(&ready),
            Arc::clone(&runs),
        ));
        let admission = Arc::new(AdmissionController::new(
            Arc::clone(&registry),
            Arc::clone(&config),
            Arc::clone(&notifier),
            Arc::clone(&runs),
            admission_enabled,
        ));
        let disconnect_reconciler = Arc::new(DisconnectReconciler::new(
            Arc::clone(&registry),
            Arc::clone(&config),
            Arc::clone(&notifier),
            Arc::clone(&runs),
        ));
        let cooldown_reconciler = Arc::new(CooldownReconciler::new(
            Arc::clone(&registry),
            notifier,
        ));

        Self {
            config,
            registry,
            ready,
            runs,
            party,
            connections,
            admission,
            disconnect_reconciler,
            cooldown_reconciler,
        }
    }
}
