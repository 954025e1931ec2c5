use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use holdout_core::ids::PlayerId;
use holdout_core::session::PlayerMode;

use crate::config::ServerConfig;
use crate::notify::Notifier;
use crate::ready::ReadyCoordinator;
use crate::registry::StateRegistry;
use crate::runs::RunCoordinator;

/// Periodic sweep over disconnected players.
///
/// Deadlines are evaluated lazily on a fixed tick instead of per-event
/// timers: cancelling a pending transition is just clearing the stamp, and
/// the worst case is one sweep interval of extra latency. Candidates come
/// from the registry's tracked set, so a tick never scans the full player
/// population; each candidate's mode is re-validated at sweep time because
/// a foreground path may have moved it since it was tracked.
pub struct DisconnectReconciler {
    registry: Arc<StateRegistry>,
    config: Arc<ServerConfig>,
    notifier: Arc<dyn Notifier>,
    runs: Arc<RunCoordinator>,
}

impl DisconnectReconciler {
    pub fn new(
        registry: Arc<StateRegistry>,
        config: Arc<ServerConfig>,
        notifier: Arc<dyn Notifier>,
        runs: Arc<RunCoordinator>,
    ) -> Self {
        Self {
            registry,
            config,
            notifier,
            runs,
        }
    }

    /// One sweep pass. Returns how many grace windows expired.
    pub fn sweep(&self, now: Instant) -> usize {
        let grace = self.config.disconnect_grace();
        let mut expired = 0usize;

        for player in self.registry.disconnected_players() {
            let Some(session) = self.registry.player(player) else {
                // Session purged since it was tracked; drop the candidate.
                self.registry.mark_reconnected(player);
                continue;
            };

            {
                let session = session.lock().unwrap();
                // Re-validate: a reconnect may have raced this tick.
                if session.mode() != PlayerMode::Disconnected {
                    continue;
                }
                if !session.grace_expired(now, grace) {
                    continue;
                }
            }

            self.handle_grace_expired(player, now);
            expired += 1;
        }
        expired
    }

    /// Grace ran out: soft death penalty, cooldown, detach from the run,
    /// then team-wipe evaluation. Disconnect expiry is deliberately
    /// processed before the wipe check so the wipe sees the post-expiry
    /// membership.
    fn handle_grace_expired(&self, player: PlayerId, now: Instant) {
        let Some(session) = self.registry.player(player) else {
            return;
        };
        tracing::info!(%player, "Disconnect grace expired");

        let team = self.registry.player_team(player);
        let run = self.registry.player_run(player);

        {
            let mut session = session.lock().unwrap();
            // Equipment and XP are forfeited like any death, but the
            // session stays intact for the eventual reconnect.
            session.stats.total_deaths += 1;
            session.reset_run_state();
            session.enter_cooldown(now + self.config.death_cooldown());
        }
        self.registry.mark_reconnected(player);
        self.registry.mark_cooling_down(player);

        if let Some(team) = &team {
            team.lock().unwrap().mark_reconnected(player);
        }

        if let Some(run) = run {
            run.lock().unwrap().mark_dead(player);
            self.registry.detach_from_run(player);
            // A team that no longer resolves is already-consistent state,
            // not an error; evaluate_wipe copes with either.
            self.runs.evaluate_wipe(&run, now);
        }

        if self.config.disconnect.notify_grace_expired
            && let Some(team) = team
        {
            let members = team.lock().unwrap().members();
            for member in members {
                if member != player {
                    self.notifier
                        .notify(member, "disconnect.teammate_grace_expired", "");
                }
            }
        }
    }
}

/// Periodic sweep over cooling-down players; expiry sends them back to the
/// lobby. Same lazy-deadline pattern as the disconnect sweep.
pub struct CooldownReconciler {
    registry: Arc<StateRegistry>,
    notifier: Arc<dyn Notifier>,
}

impl CooldownReconciler {
    pub fn new(registry: Arc<StateRegistry>, notifier: Arc<dyn Notifier>) -> Self {
        Self { registry, notifier }
    }

    /// One sweep pass. Returns how many cooldowns expired.
    pub fn sweep(&self, now: Instant) -> usize {
        let mut expired = 0usize;
        for player in self.registry.cooldown_players() {
            let Some(session) = self.registry.player(player) else {
                self.registry.clear_cooling_down(player);
                continue;
            };
            let finished = {
                let mut session = session.lock().unwrap();
                if session.mode() != PlayerMode::Cooldown {
                    // Moved by a foreground path (ready-up resolved it).
                    self.registry.clear_cooling_down(player);
                    continue;
                }
                if session.is_on_cooldown(now) {
                    continue;
                }
                session.finish_cooldown()
            };
            if finished {
                self.registry.clear_cooling_down(player);
                self.notifier.notify(player, "cooldown.expired", "");
                expired += 1;
            }
        }
        expired
    }
}

/// Spawns the disconnect sweep loop.
pub fn spawn_disconnect_reconciler(
    reconciler: Arc<DisconnectReconciler>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            reconciler.sweep(Instant::now());
        }
    })
}

/// Spawns the cooldown sweep loop.
pub fn spawn_cooldown_reconciler(
    reconciler: Arc<CooldownReconciler>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            reconciler.sweep(Instant::now());
        }
    })
}

/// Spawns the countdown completion poller: expired team countdowns are
/// turned into runs.
pub fn spawn_countdown_poller(
    ready: Arc<ReadyCoordinator>,
    runs: Arc<RunCoordinator>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let now = Instant::now();
            for team_id in ready.due_countdowns(now) {
                if let Err(rejection) = runs.start_run(team_id, now) {
                    tracing::warn!(%team_id, %rejection, "Countdown completed but run not started");
                }
            }
        }
    })
}

/// Spawns the admission eject sweep loop.
pub fn spawn_admission_sweep(
    admission: Arc<crate::admission::AdmissionController>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            admission.sweep(Instant::now());
        }
    })
}
