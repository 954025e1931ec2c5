use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use holdout_core::ids::PlayerId;
use holdout_core::session::PlayerMode;

use crate::config::ServerConfig;
use crate::notify::Notifier;
use crate::registry::StateRegistry;
use crate::runs::RunCoordinator;

/// Global admission switch.
///
/// While disabled, nobody can ready up (the ready path checks the shared
/// flag), and every player who was mid-run is given a bounded window to
/// wrap up: GraceEject mode plus an eject deadline. Re-enabling before the
/// deadline cancels cleanly — deadlines are just map entries, there is no
/// timer to unwind. The expired entries are applied by `sweep`.
pub struct AdmissionController {
    registry: Arc<StateRegistry>,
    config: Arc<ServerConfig>,
    notifier: Arc<dyn Notifier>,
    runs: Arc<RunCoordinator>,
    enabled: Arc<AtomicBool>,
    pending_ejects: Mutex<HashMap<PlayerId, Instant>>,
}

impl AdmissionController {
    pub fn new(
        registry: Arc<StateRegistry>,
        config: Arc<ServerConfig>,
        notifier: Arc<dyn Notifier>,
        runs: Arc<RunCoordinator>,
        enabled: Arc<AtomicBool>,
    ) -> Self {
        Self {
            registry,
            config,
            notifier,
            runs,
            enabled,
            pending_ejects: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Disables admission and starts the eject window for every in-run
    /// player. Idempotent.
    pub fn disable(&self, now: Instant) {
        if !self.enabled.swap(false, Ordering::Relaxed) {
            return;
        }
        let deadline = now + self.config.grace_eject();
        let mut count = 0usize;
        for id in self.registry.players_in_mode(PlayerMode::InRun) {
            let Some(session) = self.registry.player(id) else {
                continue;
            };
            if session.lock().unwrap().begin_grace_eject() {
                self.pending_ejects.lock().unwrap().insert(id, deadline);
                self.notifier.notify(id, "admission.eject_pending", "");
                count += 1;
            }
        }
        tracing::info!(count, "Admission disabled, grace eject initiated");
    }

    /// Re-enables admission and cancels every pending eject.
    pub fn enable(&self) {
        if self.enabled.swap(true, Ordering::Relaxed) {
            return;
        }
        let pending: Vec<PlayerId> = self.pending_ejects.lock().unwrap().drain().map(|(id, _)| id).collect();
        for id in &pending {
            if let Some(session) = self.registry.player(*id) {
                session.lock().unwrap().cancel_grace_eject();
            }
        }
        tracing::info!(cancelled = pending.len(), "Admission re-enabled");
    }

    /// Applies expired ejects: back to the lobby, detached from the run.
    /// This is maintenance, not a death — no cooldown is charged.
    pub fn sweep(&self, now: Instant) {
        let expired: Vec<PlayerId> = {
            let pending = self.pending_ejects.lock().unwrap();
            pending
                .iter()
                .filter(|(_, deadline)| now >= **deadline)
                .map(|(id, _)| *id)
                .collect()
        };

        for id in expired {
            self.pending_ejects.lock().unwrap().remove(&id);
            let Some(session) = self.registry.player(id) else {
                continue;
            };
            {
                let mut session = session.lock().unwrap();
                if session.mode() != PlayerMode::GraceEject {
                    continue;
                }
                session.reset_run_state();
                session.return_to_lobby();
            }
            let run = self.registry.player_run(id);
            self.registry.detach_from_run(id);
            if let Some(run) = run {
                // Every occupant is being ejected; the last one out ends it.
                if run.lock().unwrap().participant_count() == 0 {
                    let run_id = run.lock().unwrap().id();
                    self.runs.end_run(run_id, crate::runs::EndReason::Forced, now);
                }
            }
            self.notifier.notify(id, "admission.ejected", "");
            tracing::info!(%id, "Grace eject executed");
        }
    }

    pub fn pending_eject_count(&self) -> usize {
        self.pending_ejects.lock().unwrap().len()
    }
}
