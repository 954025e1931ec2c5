use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use holdout_core::ids::{PlayerId, TeamId};
use holdout_core::session::PlayerMode;

use crate::config::ServerConfig;
use crate::error::Rejection;
use crate::notify::Notifier;
use crate::registry::StateRegistry;

/// Readiness and countdown flow.
///
/// Countdowns are deadlines, not scheduled callbacks: going all-ready stamps
/// `now + countdown` per team, a poller collects expired entries, and
/// cancelling is just removing the entry. Eligible members are flipped to
/// Countdown mode when the deadline is stamped; completion is the caller's
/// job (`due_countdowns` hands back the teams whose countdown finished).
pub struct ReadyCoordinator {
    registry: Arc<StateRegistry>,
    config: Arc<ServerConfig>,
    notifier: Arc<dyn Notifier>,
    admission_enabled: Arc<AtomicBool>,
    countdowns: Mutex<HashMap<TeamId, Instant>>,
}

impl ReadyCoordinator {
    pub fn new(
        registry: Arc<StateRegistry>,
        config: Arc<ServerConfig>,
        notifier: Arc<dyn Notifier>,
        admission_enabled: Arc<AtomicBool>,
    ) -> Self {
        Self {
            registry,
            config,
            notifier,
            admission_enabled,
            countdowns: Mutex::new(HashMap::new()),
        }
    }

    /// Toggles the ready flag. Returns the new state (`true` = now ready).
    pub fn toggle_ready(&self, player: PlayerId, now: Instant) -> Result<bool, Rejection> {
        let session = self.registry.player(player).ok_or(Rejection::PlayerNotFound)?;

        let is_now_ready = {
            let mut session = session.lock().unwrap();

            // An expired cooldown is resolved lazily here, the same way the
            // sweep would; the player does not have to wait for a tick.
            if session.mode() == PlayerMode::Cooldown && !session.is_on_cooldown(now) {
                session.finish_cooldown();
                self.registry.clear_cooling_down(player);
            }

            if session.is_on_cooldown(now) {
                return Err(Rejection::OnCooldown(session.cooldown_remaining(now)));
            }
            if !matches!(session.mode(), PlayerMode::Lobby | PlayerMode::Ready) {
                return Err(Rejection::NotInLobby);
            }
            if !self.registry.is_in_team(player) {
                return Err(Rejection::NotInTeam);
            }
            if !session.ready && !session.has_selected_starters() {
                return Err(Rejection::StartersNotSelected);
            }
            if !session.ready && !self.admission_enabled.load(Ordering::Relaxed) {
                return Err(Rejection::AdmissionDisabled);
            }

            if session.ready {
                session.clear_ready();
                false
            } else {
                session.mark_ready();
                true
            }
        };

        let Some(team) = self.registry.player_team(player) else {
            return Ok(is_now_ready);
        };
        let (team_id, all_ready, members) = {
            let mut team = team.lock().unwrap();
            team.set_ready(player, is_now_ready);
            (team.id(), team.is_all_ready(), team.members())
        };

        let key = if is_now_ready {
            "ready.player_ready"
        } else {
            "ready.player_unready"
        };
        for member in &members {
            self.notifier.notify(*member, key, "");
        }

        if is_now_ready {
            if all_ready {
                self.start_countdown(team_id, &members, now);
            }
        } else {
            self.cancel_countdown(team_id);
        }

        Ok(is_now_ready)
    }

    /// Stamps the countdown deadline and flips eligible members to
    /// Countdown. Members already running or still cooling down keep their
    /// mode and simply sit this run out.
    fn start_countdown(&self, team_id: TeamId, members: &[PlayerId], now: Instant) {
        let mut countdowns = self.countdowns.lock().unwrap();
        if countdowns.contains_key(&team_id) {
            return;
        }
        countdowns.insert(team_id, now + self.config.countdown());
        drop(countdowns);

        for member in members {
            if let Some(session) = self.registry.player(*member) {
                let mut session = session.lock().unwrap();
                if session.mode() != PlayerMode::InRun && !session.is_on_cooldown(now) {
                    session.begin_countdown();
                }
            }
            self.notifier.notify(*member, "ready.countdown_started", "");
        }
        tracing::info!(%team_id, secs = self.config.ready.countdown_secs, "Countdown started");
    }

    /// Drops the deadline and walks members back to Ready/Lobby.
    pub fn cancel_countdown(&self, team_id: TeamId) {
        if self.countdowns.lock().unwrap().remove(&team_id).is_none() {
            return;
        }
        if let Some(team) = self.registry.team(team_id) {
            let members = team.lock().unwrap().members();
            for member in members {
                if let Some(session) = self.registry.player(member) {
                    session.lock().unwrap().cancel_countdown();
                }
            }
        }
        tracing::debug!(%team_id, "Countdown cancelled");
    }

    /// Removes and returns the teams whose countdown deadline has passed;
    /// the caller starts their runs.
    pub fn due_countdowns(&self, now: Instant) -> Vec<TeamId> {
        let mut countdowns = self.countdowns.lock().unwrap();
        let due: Vec<TeamId> = countdowns
            .iter()
            .filter(|(_, deadline)| now >= **deadline)
            .map(|(id, _)| *id)
            .collect();
        for id in &due {
            countdowns.remove(id);
        }
        due
    }

    pub fn has_countdown(&self, team_id: TeamId) -> bool {
        self.countdowns.lock().unwrap().contains_key(&team_id)
    }
}
