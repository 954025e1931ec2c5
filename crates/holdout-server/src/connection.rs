use std::sync::Arc;
use std::time::Instant;

use holdout_core::ids::PlayerId;
use holdout_core::session::PlayerMode;

use crate::config::ServerConfig;
use crate::notify::Notifier;
use crate::ready::ReadyCoordinator;
use crate::registry::StateRegistry;
use crate::runs::RunCoordinator;

/// What a connect resolved to, for the transport layer to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Fresh or ordinary lobby arrival.
    Lobby,
    /// Reconnected into the live run within grace.
    RestoredToRun,
    /// Came back after grace ran out; the run slot is gone.
    GraceExpired,
}

/// Network join/quit handling.
///
/// Connects repair stale state (an InRun session whose run no longer
/// resolves is reset rather than trusted), and disconnects route by mode:
/// mid-run starts the grace window, mid-countdown cancels the team's
/// countdown, ready players are unreadied.
pub struct ConnectionHandler {
    registry: Arc<StateRegistry>,
    config: Arc<ServerConfig>,
    notifier: Arc<dyn Notifier>,
    ready: Arc<ReadyCoordinator>,
    runs: Arc<RunCoordinator>,
}

impl ConnectionHandler {
    pub fn new(
        registry: Arc<StateRegistry>,
        config: Arc<ServerConfig>,
        notifier: Arc<dyn Notifier>,
        ready: Arc<ReadyCoordinator>,
        runs: Arc<RunCoordinator>,
    ) -> Self {
        Self {
            registry,
            config,
            notifier,
            ready,
            runs,
        }
    }

    /// A player (re)connected. Get-or-create is idempotent; the display
    /// name follows the live connection.
    pub fn handle_connect(&self, player: PlayerId, name: &str, now: Instant) -> ConnectOutcome {
        let session = self.registry.get_or_create_player(player, name);
        {
            let mut session = session.lock().unwrap();
            if session.name != name {
                session.name = name.to_string();
            }
        }

        let mode = session.lock().unwrap().mode();
        match mode {
            PlayerMode::Disconnected => self.handle_reconnect(player, now),
            PlayerMode::InRun => {
                // Claims to be in a run but the reference went stale
                // (server restart, run torn down while offline): repair.
                if self.registry.player_run(player).is_none() {
                    tracing::info!(%player, "InRun session with no live run, resetting to lobby");
                    let mut session = session.lock().unwrap();
                    session.reset_run_state();
                    session.return_to_lobby();
                    ConnectOutcome::Lobby
                } else {
                    ConnectOutcome::RestoredToRun
                }
            },
            _ => ConnectOutcome::Lobby,
        }
    }

    fn handle_reconnect(&self, player: PlayerId, now: Instant) -> ConnectOutcome {
        let Some(session) = self.registry.player(player) else {
            return ConnectOutcome::Lobby;
        };
        let grace = self.config.disconnect_grace();

        let within_grace = session.lock().unwrap().is_within_grace(now, grace);
        if !within_grace {
            // Grace ran out while offline; the sweep may not have caught it
            // yet. Same outcome, evaluated lazily at point of use.
            self.registry.mark_reconnected(player);
            let abandoned_run = self.registry.player_run(player);
            self.registry.detach_from_run(player);
            if let Some(team) = self.registry.player_team(player) {
                team.lock().unwrap().mark_reconnected(player);
            }
            {
                let mut session = session.lock().unwrap();
                session.disconnected_at = None;
                session.reset_run_state();
                session.return_to_lobby();
            }
            // Detaching may have taken the last recoverable member with it.
            if let Some(run) = abandoned_run {
                self.runs.evaluate_wipe(&run, now);
            }
            self.notifier.notify(player, "disconnect.grace_expired", "");
            return ConnectOutcome::GraceExpired;
        }

        // Within grace: restore run membership if the team still has a
        // live run; otherwise it ended while they were gone.
        let team = self.registry.player_team(player);
        let live_run = team.as_ref().and_then(|t| {
            let team_id = t.lock().unwrap().id();
            self.registry.team_run(team_id)
        });

        if let Some(run) = live_run
            && run.lock().unwrap().is_active()
        {
            if let Some(team) = &team {
                team.lock().unwrap().mark_reconnected(player);
            }
            self.registry.mark_reconnected(player);
            let restored = {
                let mut session = session.lock().unwrap();
                let restored = session.reconnect_to_run();
                if restored {
                    session.invulnerable_until =
                        Some(now + self.config.respawn_invulnerability());
                }
                restored
            };
            if restored {
                self.notifier.notify(player, "disconnect.reconnected", "");
                let members = team
                    .map(|t| t.lock().unwrap().members())
                    .unwrap_or_default();
                for member in members {
                    if member != player {
                        self.notifier
                            .notify(member, "disconnect.teammate_reconnected", "");
                    }
                }
                return ConnectOutcome::RestoredToRun;
            }
        }

        // No run to return to.
        self.registry.mark_reconnected(player);
        self.registry.detach_from_run(player);
        if let Some(team) = self.registry.player_team(player) {
            team.lock().unwrap().mark_reconnected(player);
        }
        let mut session = session.lock().unwrap();
        session.disconnected_at = None;
        session.reset_run_state();
        session.return_to_lobby();
        ConnectOutcome::Lobby
    }

    /// A player's connection dropped.
    pub fn handle_disconnect(&self, player: PlayerId, now: Instant) {
        let Some(session) = self.registry.player(player) else {
            return;
        };
        let mode = session.lock().unwrap().mode();
        match mode {
            PlayerMode::InRun => {
                session.lock().unwrap().mark_disconnected(now);
                self.registry.mark_disconnected(player);
                let Some(team) = self.registry.player_team(player) else {
                    return;
                };
                let members = {
                    let mut team = team.lock().unwrap();
                    team.mark_disconnected(player, now);
                    team.members()
                };
                for member in members {
                    if member != player {
                        self.notifier
                            .notify(member, "disconnect.teammate_disconnected", "");
                    }
                }
                tracing::info!(
                    %player,
                    grace_secs = self.config.disconnect.grace_secs,
                    "Player disconnected mid-run, grace window started"
                );
            },
            PlayerMode::Countdown => {
                // One member dropping cancels the whole team's countdown.
                {
                    let mut session = session.lock().unwrap();
                    session.cancel_countdown();
                    session.clear_ready();
                }
                self.unready(player);
                if let Some(team) = self.registry.player_team(player) {
                    let team_id = team.lock().unwrap().id();
                    self.ready.cancel_countdown(team_id);
                }
            },
            PlayerMode::Ready => {
                session.lock().unwrap().clear_ready();
                self.unready(player);
            },
            _ => {},
        }
        // Quitting in the lobby or on cooldown keeps the session as-is;
        // cooldowns keep ticking while offline.
    }

    fn unready(&self, player: PlayerId) {
        if let Some(team) = self.registry.player_team(player) {
            team.lock().unwrap().set_ready(player, false);
        }
    }
}
