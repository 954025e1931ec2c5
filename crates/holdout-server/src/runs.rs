use std::sync::Arc;
use std::time::Instant;

use holdout_core::ids::{PlayerId, RunId, TeamId};
use holdout_core::run::SpawnPoint;
use holdout_core::session::PlayerMode;

use crate::config::ServerConfig;
use crate::error::Rejection;
use crate::notify::Notifier;
pub use crate::registry::EndReason;
use crate::registry::StateRegistry;
use crate::ready::ReadyCoordinator;

/// Run lifecycle: start on countdown completion, death and respawn
/// handling, voluntary quit, and the end paths.
pub struct RunCoordinator {
    registry: Arc<StateRegistry>,
    config: Arc<ServerConfig>,
    notifier: Arc<dyn Notifier>,
    ready: Arc<ReadyCoordinator>,
}

impl RunCoordinator {
    pub fn new(
        registry: Arc<StateRegistry>,
        config: Arc<ServerConfig>,
        notifier: Arc<dyn Notifier>,
        ready: Arc<ReadyCoordinator>,
    ) -> Self {
        Self {
            registry,
            config,
            notifier,
            ready,
        }
    }

    /// Least-loaded world wins; first configured breaks ties.
    fn select_world(&self) -> Result<(String, Vec<SpawnPoint>), Rejection> {
        self.config
            .worlds
            .iter()
            .min_by_key(|w| self.registry.runs_in_world(&w.name))
            .map(|w| (w.name.clone(), w.spawn_points.clone()))
            .ok_or(Rejection::NoWorldAvailable)
    }

    /// Creates and activates a run for a team whose countdown completed.
    pub fn start_run(&self, team_id: TeamId, now: Instant) -> Result<RunId, Rejection> {
        if self.registry.team(team_id).is_none() {
            return Err(Rejection::TeamNotFound);
        }
        if let Some(existing) = self.registry.team_run(team_id)
            && !existing.lock().unwrap().is_ended()
        {
            return Err(Rejection::RunInProgress);
        }

        let (world, spawn_points) = self.select_world()?;
        let run = self
            .registry
            .create_run(team_id, &world, spawn_points, now)?;

        let (run_id, participants) = {
            let mut run = run.lock().unwrap();
            run.start();
            (run.id(), run.participants())
        };

        for player in participants {
            self.notifier.notify(player, "run.started", &world);
        }
        Ok(run_id)
    }

    /// Death of an in-run player: mark dead, apply the death penalty
    /// (run-state reset, death cooldown, participant removal), then
    /// evaluate the wipe. Returns `true` when the death wiped the team.
    pub fn handle_death(&self, player: PlayerId, now: Instant) -> Result<bool, Rejection> {
        let session = self.registry.player(player).ok_or(Rejection::PlayerNotFound)?;
        {
            let session = session.lock().unwrap();
            if session.mode() != PlayerMode::InRun {
                return Err(Rejection::NotInRun);
            }
        }
        let run = self.registry.player_run(player).ok_or(Rejection::RunNotFound)?;
        run.lock().unwrap().mark_dead(player);

        {
            let mut session = session.lock().unwrap();
            session.stats.total_deaths += 1;
            session.reset_run_state();
            session.enter_cooldown(now + self.config.death_cooldown());
        }
        self.registry.mark_cooling_down(player);
        self.registry.detach_from_run(player);

        let survivors = run.lock().unwrap().alive_count();
        let key = if survivors > 0 {
            "death.can_rejoin_after_cooldown"
        } else {
            "death.cooldown"
        };
        self.notifier.notify(player, key, "");

        Ok(self.evaluate_wipe(&run, now))
    }

    /// Respawn an in-run player who died but was revived within the run:
    /// back into the alive set, short invulnerability, random spawn point.
    pub fn respawn(&self, player: PlayerId, now: Instant) -> Result<Option<SpawnPoint>, Rejection> {
        let session = self.registry.player(player).ok_or(Rejection::PlayerNotFound)?;
        {
            let session = session.lock().unwrap();
            if session.mode() != PlayerMode::InRun {
                return Err(Rejection::NotInRun);
            }
        }
        let run = self.registry.player_run(player).ok_or(Rejection::RunNotFound)?;
        let point = {
            let mut run = run.lock().unwrap();
            run.mark_alive(player);
            run.random_spawn_point()
        };
        session.lock().unwrap().invulnerable_until =
            Some(now + self.config.respawn_invulnerability());
        Ok(point)
    }

    /// Voluntary quit mid-run: no death counted, but the shorter quit
    /// cooldown applies and the slot is gone for this run.
    pub fn quit_run(&self, player: PlayerId, now: Instant) -> Result<(), Rejection> {
        let session = self.registry.player(player).ok_or(Rejection::PlayerNotFound)?;
        {
            let mut session = session.lock().unwrap();
            if session.mode() != PlayerMode::InRun {
                return Err(Rejection::NotInRun);
            }
            session.reset_run_state();
            session.enter_cooldown(now + self.config.quit_cooldown());
        }
        self.registry.mark_cooling_down(player);

        let run = self.registry.player_run(player);
        self.registry.detach_from_run(player);
        self.notifier.notify(player, "run.quit", "");

        if let Some(run) = run {
            self.evaluate_wipe(&run, now);
        }
        Ok(())
    }

    /// Team-level wipe evaluation: nobody alive-and-connected-or-within-
    /// grace ends the run. Pure check first, side effects only on a
    /// positive result. Returns `true` when the run was ended here.
    pub fn evaluate_wipe(
        &self,
        run: &crate::registry::Shared<holdout_core::run::Run>,
        now: Instant,
    ) -> bool {
        let (run_id, team_id, alive, ended) = {
            let run = run.lock().unwrap();
            (run.id(), run.team_id(), run.alive_players(), run.is_ended())
        };
        if ended {
            return false;
        }

        let wiped = match self.registry.team(team_id) {
            Some(team) => team
                .lock()
                .unwrap()
                .is_wiped(&alive, self.config.disconnect_grace(), now),
            // Team already gone: nothing left to recover, the run is over.
            None => alive.is_empty(),
        };
        if wiped {
            tracing::info!(%run_id, %team_id, "Team wipe detected");
            self.end_run(run_id, EndReason::Wipe, now);
        }
        wiped
    }

    /// Ends a run. Cancels any countdown racing against the end (a player
    /// left in Countdown mode must not start a fresh run off a dead team
    /// state), then lets the registry do the cross-aggregate cleanup.
    pub fn end_run(&self, run_id: RunId, reason: EndReason, now: Instant) {
        let Some(run) = self.registry.run(run_id) else {
            return;
        };
        let (team_id, participants) = {
            let run = run.lock().unwrap();
            (run.team_id(), run.participants())
        };

        self.ready.cancel_countdown(team_id);
        self.registry
            .end_run(run_id, reason, self.config.death_cooldown(), now);

        let key = match reason {
            EndReason::Wipe => "run.ended_wipe",
            _ => "run.ended",
        };
        for player in participants {
            self.notifier.notify(player, key, "");
        }
    }
}
