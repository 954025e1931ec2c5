use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::ids::{PlayerId, RunId, TeamId};
use crate::stats::PlayerStats;

/// Current lifecycle state of a player session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerMode {
    /// In the preparation area, not queued for a run.
    Lobby,
    /// Marked ready, waiting for the rest of the team.
    Ready,
    /// Team countdown in progress.
    Countdown,
    /// Actively participating in a run.
    InRun,
    /// Died or quit; waiting for the cooldown to expire.
    Cooldown,
    /// Global admission was disabled; the player is being ejected.
    GraceEject,
    /// Dropped mid-run, within the disconnect grace window.
    Disconnected,
}

/// Whether `from -> to` is a legal mode transition.
///
/// This is the single source of truth for the state machine; every
/// transition method below consults it. Adding a mode forces this match
/// (and every caller switching on `PlayerMode`) to be revisited.
pub fn transition_allowed(from: PlayerMode, to: PlayerMode) -> bool {
    use PlayerMode::*;
    matches!(
        (from, to),
        (Lobby, Ready)
            | (Ready, Lobby)
            | (Lobby, Countdown)
            | (Ready, Countdown)
            | (Countdown, Lobby)
            | (Countdown, Ready)
            | (Countdown, InRun)
            | (InRun, Cooldown)
            | (InRun, Disconnected)
            | (InRun, Lobby)
            | (Disconnected, InRun)
            | (Disconnected, Cooldown)
            | (Disconnected, Lobby)
            | (Cooldown, Lobby)
            | (GraceEject, InRun)
            | (GraceEject, Lobby)
            | (Lobby, GraceEject)
            | (Ready, GraceEject)
            | (Countdown, GraceEject)
            | (InRun, GraceEject)
            | (Cooldown, GraceEject)
            | (Disconnected, GraceEject)
    )
}

/// In-memory state for one player.
///
/// Transition methods are guarded by the mode read at call time and return
/// `false` instead of erroring when the guard fails — a background sweep may
/// have moved the player since the caller last looked, and a stale caller
/// must degrade to a no-op. Deadlines are absolute instants; `None` means
/// "not pending". The session holds no clock of its own: every time-based
/// query takes `now` from the caller.
#[derive(Debug, Clone)]
pub struct PlayerSession {
    id: PlayerId,
    pub name: String,
    mode: PlayerMode,

    pub team_id: Option<TeamId>,
    pub run_id: Option<RunId>,

    // Deadlines
    pub cooldown_until: Option<Instant>,
    pub disconnected_at: Option<Instant>,
    pub invulnerable_until: Option<Instant>,
    pub upgrade_deadline: Option<Instant>,

    pub ready: bool,

    // Pre-run selections; both must be chosen before the player may ready up.
    pub starter_weapon: Option<String>,
    pub starter_helmet: Option<String>,

    // Equipment, authoritative during a run.
    pub weapon_group: Option<String>,
    pub weapon_level: u32,
    pub helmet_group: Option<String>,
    pub helmet_level: u32,
    pub weapon_at_max: bool,
    pub helmet_at_max: bool,

    // XP progression within the current run.
    pub xp_progress: u32,
    pub xp_held: u32,
    pub xp_required: u32,
    pub upgrade_pending: bool,
    pub overflow_xp: u32,
    pub run_level: u32,

    // Economy: coins reset per run, perma-score survives everything short
    // of an admin reset.
    pub coins_earned: u32,
    pub perma_score: u32,

    pub stats: PlayerStats,
}

impl PlayerSession {
    pub fn new(id: PlayerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            mode: PlayerMode::Lobby,
            team_id: None,
            run_id: None,
            cooldown_until: None,
            disconnected_at: None,
            invulnerable_until: None,
            upgrade_deadline: None,
            ready: false,
            starter_weapon: None,
            starter_helmet: None,
            weapon_group: None,
            weapon_level: 0,
            helmet_group: None,
            helmet_level: 0,
            weapon_at_max: false,
            helmet_at_max: false,
            xp_progress: 0,
            xp_held: 0,
            xp_required: 100,
            upgrade_pending: false,
            overflow_xp: 0,
            run_level: 1,
            coins_earned: 0,
            perma_score: 0,
            stats: PlayerStats::default(),
        }
    }

    pub fn id(&self) -> PlayerId {
        self.id
    }

    pub fn mode(&self) -> PlayerMode {
        self.mode
    }

    // ==================== Computed properties ====================

    /// Effective level, the sum of both equipment levels.
    pub fn player_level(&self) -> u32 {
        self.weapon_level + self.helmet_level
    }

    pub fn is_at_max_level(&self) -> bool {
        self.weapon_at_max && self.helmet_at_max
    }

    pub fn has_selected_starters(&self) -> bool {
        self.starter_weapon.is_some() && self.starter_helmet.is_some()
    }

    pub fn is_on_cooldown(&self, now: Instant) -> bool {
        self.cooldown_until.is_some_and(|until| until > now)
    }

    pub fn cooldown_remaining(&self, now: Instant) -> Duration {
        self.cooldown_until
            .map(|until| until.saturating_duration_since(now))
            .unwrap_or_default()
    }

    pub fn is_invulnerable(&self, now: Instant) -> bool {
        self.invulnerable_until.is_some_and(|until| until > now)
    }

    pub fn is_within_grace(&self, now: Instant, grace: Duration) -> bool {
        self.disconnected_at
            .is_some_and(|at| now.saturating_duration_since(at) < grace)
    }

    pub fn grace_expired(&self, now: Instant, grace: Duration) -> bool {
        self.disconnected_at
            .is_some_and(|at| now.saturating_duration_since(at) >= grace)
    }

    pub fn upgrade_remaining(&self, now: Instant) -> Duration {
        self.upgrade_deadline
            .map(|until| until.saturating_duration_since(now))
            .unwrap_or_default()
    }

    // ==================== Transitions ====================

    fn transition(&mut self, to: PlayerMode) -> bool {
        if !transition_allowed(self.mode, to) {
            return false;
        }
        self.mode = to;
        true
    }

    /// Lobby -> Ready on the player's ready signal.
    pub fn mark_ready(&mut self) -> bool {
        if !self.transition(PlayerMode::Ready) {
            return false;
        }
        self.ready = true;
        true
    }

    /// Ready -> Lobby; also clears a stale ready flag while still in Lobby.
    pub fn clear_ready(&mut self) -> bool {
        match self.mode {
            PlayerMode::Ready => {
                self.mode = PlayerMode::Lobby;
                self.ready = false;
                true
            },
            PlayerMode::Lobby => {
                self.ready = false;
                true
            },
            _ => false,
        }
    }

    /// Lobby/Ready -> Countdown when the team goes all-ready. The ready
    /// flag is deliberately kept so a cancelled countdown can fall back to
    /// Ready.
    pub fn begin_countdown(&mut self) -> bool {
        self.transition(PlayerMode::Countdown)
    }

    /// Countdown cancelled; falls back to Ready or Lobby per the ready flag.
    pub fn cancel_countdown(&mut self) -> bool {
        if self.mode != PlayerMode::Countdown {
            return false;
        }
        self.mode = if self.ready {
            PlayerMode::Ready
        } else {
            PlayerMode::Lobby
        };
        true
    }

    /// Countdown -> InRun once the run has been created.
    pub fn enter_run(&mut self, run_id: RunId) -> bool {
        if !self.transition(PlayerMode::InRun) {
            return false;
        }
        self.run_id = Some(run_id);
        true
    }

    /// InRun -> Disconnected; keeps `run_id` so the slot survives the grace
    /// window.
    pub fn mark_disconnected(&mut self, now: Instant) -> bool {
        if !self.transition(PlayerMode::Disconnected) {
            return false;
        }
        self.disconnected_at = Some(now);
        true
    }

    /// Disconnected -> InRun on reconnect within grace.
    pub fn reconnect_to_run(&mut self) -> bool {
        if self.mode != PlayerMode::Disconnected || self.run_id.is_none() {
            return false;
        }
        self.mode = PlayerMode::InRun;
        self.disconnected_at = None;
        true
    }

    /// InRun/Disconnected -> Cooldown on death, voluntary quit, or grace
    /// expiry. Clears the run reference and disconnect stamp.
    pub fn enter_cooldown(&mut self, until: Instant) -> bool {
        if !self.transition(PlayerMode::Cooldown) {
            return false;
        }
        self.run_id = None;
        self.disconnected_at = None;
        self.cooldown_until = Some(until);
        true
    }

    /// Cooldown -> Lobby once the deadline has passed (the sweep's edge).
    pub fn finish_cooldown(&mut self) -> bool {
        if !self.transition(PlayerMode::Lobby) {
            return false;
        }
        self.cooldown_until = None;
        true
    }

    /// Any mode -> GraceEject while global admission is disabled.
    pub fn begin_grace_eject(&mut self) -> bool {
        if self.mode == PlayerMode::GraceEject {
            return false;
        }
        self.transition(PlayerMode::GraceEject)
    }

    /// GraceEject cancelled (admission re-enabled). Returns to the run if
    /// one is still referenced, otherwise to the lobby.
    pub fn cancel_grace_eject(&mut self) -> bool {
        if self.mode != PlayerMode::GraceEject {
            return false;
        }
        self.mode = if self.run_id.is_some() {
            PlayerMode::InRun
        } else {
            PlayerMode::Lobby
        };
        true
    }

    /// Force the session back to Lobby, used when a run ends without a
    /// death penalty, when a grace eject executes, or to repair a session
    /// whose run reference went stale.
    pub fn return_to_lobby(&mut self) -> bool {
        if self.mode == PlayerMode::Lobby {
            return false;
        }
        if !self.transition(PlayerMode::Lobby) {
            return false;
        }
        self.ready = false;
        true
    }

    // ==================== Resets ====================

    /// Clears everything tied to the current run: XP, equipment, starter
    /// selections, readiness, and the run reference. Identity, cooldown,
    /// perma-score, and lifetime stats survive.
    pub fn reset_run_state(&mut self) {
        self.xp_progress = 0;
        self.xp_held = 0;
        self.xp_required = 100;
        self.upgrade_pending = false;
        self.upgrade_deadline = None;
        self.overflow_xp = 0;
        self.weapon_group = None;
        self.weapon_level = 0;
        self.helmet_group = None;
        self.helmet_level = 0;
        self.weapon_at_max = false;
        self.helmet_at_max = false;
        self.run_level = 1;
        self.coins_earned = 0;
        self.run_id = None;
        self.starter_weapon = None;
        self.starter_helmet = None;
        self.ready = false;
    }

    /// Full reset to lobby defaults (admin kick/reset). Perma-score and
    /// lifetime stats are the only fields that survive.
    pub fn reset_all(&mut self) {
        self.reset_run_state();
        self.mode = PlayerMode::Lobby;
        self.team_id = None;
        self.cooldown_until = None;
        self.disconnected_at = None;
        self.invulnerable_until = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn session() -> PlayerSession {
        PlayerSession::new(Uuid::new_v4(), "Alice")
    }

    #[test]
    fn new_session_starts_in_lobby() {
        let s = session();
        assert_eq!(s.mode(), PlayerMode::Lobby);
        assert!(!s.ready);
        assert!(s.team_id.is_none());
        assert!(s.run_id.is_none());
        assert_eq!(s.xp_required, 100);
        assert_eq!(s.run_level, 1);
    }

    #[test]
    fn ready_round_trip() {
        let mut s = session();
        assert!(s.mark_ready());
        assert_eq!(s.mode(), PlayerMode::Ready);
        assert!(s.ready);
        assert!(s.clear_ready());
        assert_eq!(s.mode(), PlayerMode::Lobby);
        assert!(!s.ready);
    }

    #[test]
    fn ready_from_in_run_is_a_noop() {
        let mut s = session();
        s.begin_countdown();
        s.enter_run(Uuid::new_v4());
        assert!(!s.mark_ready());
        assert_eq!(s.mode(), PlayerMode::InRun);
    }

    #[test]
    fn countdown_cancel_falls_back_per_ready_flag() {
        let mut s = session();
        s.mark_ready();
        assert!(s.begin_countdown());
        assert!(s.cancel_countdown());
        assert_eq!(s.mode(), PlayerMode::Ready);

        let mut s = session();
        assert!(s.begin_countdown());
        assert!(s.cancel_countdown());
        assert_eq!(s.mode(), PlayerMode::Lobby);
    }

    #[test]
    fn enter_run_assigns_run_id() {
        let mut s = session();
        let run = Uuid::new_v4();
        s.begin_countdown();
        assert!(s.enter_run(run));
        assert_eq!(s.mode(), PlayerMode::InRun);
        assert_eq!(s.run_id, Some(run));
    }

    #[test]
    fn disconnect_keeps_run_reference() {
        let mut s = session();
        let run = Uuid::new_v4();
        s.begin_countdown();
        s.enter_run(run);
        assert!(s.mark_disconnected(Instant::now()));
        assert_eq!(s.mode(), PlayerMode::Disconnected);
        assert_eq!(s.run_id, Some(run), "slot must survive the grace window");
        assert!(s.disconnected_at.is_some());
    }

    #[test]
    fn reconnect_restores_run_membership() {
        let mut s = session();
        s.begin_countdown();
        s.enter_run(Uuid::new_v4());
        s.mark_disconnected(Instant::now());
        assert!(s.reconnect_to_run());
        assert_eq!(s.mode(), PlayerMode::InRun);
        assert!(s.disconnected_at.is_none());
    }

    #[test]
    fn cooldown_clears_run_and_disconnect_state() {
        let now = Instant::now();
        let mut s = session();
        s.begin_countdown();
        s.enter_run(Uuid::new_v4());
        s.mark_disconnected(now);
        assert!(s.enter_cooldown(now + Duration::from_secs(60)));
        assert_eq!(s.mode(), PlayerMode::Cooldown);
        assert!(s.run_id.is_none());
        assert!(s.disconnected_at.is_none());
        assert!(s.is_on_cooldown(now));
        assert!(!s.is_on_cooldown(now + Duration::from_secs(61)));
    }

    #[test]
    fn finish_cooldown_returns_to_lobby() {
        let now = Instant::now();
        let mut s = session();
        s.begin_countdown();
        s.enter_run(Uuid::new_v4());
        s.enter_cooldown(now + Duration::from_secs(30));
        assert!(s.finish_cooldown());
        assert_eq!(s.mode(), PlayerMode::Lobby);
        assert!(s.cooldown_until.is_none());
    }

    #[test]
    fn grace_eject_reachable_from_every_mode() {
        let setups: [fn(&mut PlayerSession); 5] = [
            |_s| {},
            |s| {
                s.mark_ready();
            },
            |s| {
                s.begin_countdown();
            },
            |s| {
                s.begin_countdown();
                s.enter_run(Uuid::new_v4());
            },
            |s| {
                s.begin_countdown();
                s.enter_run(Uuid::new_v4());
                s.mark_disconnected(Instant::now());
            },
        ];
        for setup in setups {
            let mut s = session();
            setup(&mut s);
            assert!(s.begin_grace_eject(), "from {:?}", s.mode());
            assert_eq!(s.mode(), PlayerMode::GraceEject);
            assert!(!s.begin_grace_eject(), "second eject must be a no-op");
        }
    }

    #[test]
    fn cancel_grace_eject_prefers_run() {
        let mut s = session();
        s.begin_countdown();
        s.enter_run(Uuid::new_v4());
        s.begin_grace_eject();
        assert!(s.cancel_grace_eject());
        assert_eq!(s.mode(), PlayerMode::InRun);

        let mut s = session();
        s.begin_grace_eject();
        assert!(s.cancel_grace_eject());
        assert_eq!(s.mode(), PlayerMode::Lobby);
    }

    #[test]
    fn grace_window_boundaries() {
        let now = Instant::now();
        let grace = Duration::from_secs(300);
        let mut s = session();
        s.begin_countdown();
        s.enter_run(Uuid::new_v4());
        s.mark_disconnected(now);

        assert!(s.is_within_grace(now + Duration::from_secs(299), grace));
        assert!(!s.is_within_grace(now + grace, grace));
        assert!(s.grace_expired(now + grace, grace));
        assert!(!s.grace_expired(now + Duration::from_secs(299), grace));
    }

    #[test]
    fn reset_run_state_preserves_identity_and_perma_score() {
        let mut s = session();
        s.perma_score = 42;
        s.cooldown_until = Some(Instant::now());
        s.weapon_group = Some("blade".into());
        s.weapon_level = 3;
        s.xp_progress = 77;
        s.run_level = 5;
        s.starter_weapon = Some("bow".into());
        s.run_id = Some(Uuid::new_v4());

        s.reset_run_state();

        assert_eq!(s.perma_score, 42);
        assert!(s.cooldown_until.is_some());
        assert!(s.weapon_group.is_none());
        assert_eq!(s.weapon_level, 0);
        assert_eq!(s.xp_progress, 0);
        assert_eq!(s.run_level, 1);
        assert!(s.starter_weapon.is_none());
        assert!(s.run_id.is_none());
    }

    #[test]
    fn reset_all_clears_deadlines_and_team() {
        let mut s = session();
        s.team_id = Some(Uuid::new_v4());
        s.begin_countdown();
        s.enter_run(Uuid::new_v4());
        s.enter_cooldown(Instant::now() + Duration::from_secs(30));
        s.reset_all();
        assert_eq!(s.mode(), PlayerMode::Lobby);
        assert!(s.team_id.is_none());
        assert!(s.cooldown_until.is_none());
    }

    #[test]
    fn player_level_sums_equipment() {
        let mut s = session();
        s.weapon_level = 2;
        s.helmet_level = 3;
        assert_eq!(s.player_level(), 5);
        assert!(!s.is_at_max_level());
        s.weapon_at_max = true;
        s.helmet_at_max = true;
        assert!(s.is_at_max_level());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        const MODES: [PlayerMode; 7] = [
            PlayerMode::Lobby,
            PlayerMode::Ready,
            PlayerMode::Countdown,
            PlayerMode::InRun,
            PlayerMode::Cooldown,
            PlayerMode::GraceEject,
            PlayerMode::Disconnected,
        ];

        proptest! {
            // The table must be total: any pair either transitions or is
            // rejected, and rejection never mutates the session.
            #[test]
            fn rejected_transitions_leave_session_untouched(
                from_idx in 0usize..7,
                to_idx in 0usize..7,
            ) {
                let (from, to) = (MODES[from_idx], MODES[to_idx]);
                if !transition_allowed(from, to) {
                    let mut s = PlayerSession::new(uuid::Uuid::new_v4(), "P");
                    // Drive the session into `from` through legal edges where
                    // possible; skip unreachable combinations.
                    let reached = match from {
                        PlayerMode::Lobby => true,
                        PlayerMode::Ready => s.mark_ready(),
                        PlayerMode::Countdown => s.begin_countdown(),
                        PlayerMode::InRun => {
                            s.begin_countdown() && s.enter_run(uuid::Uuid::new_v4())
                        },
                        PlayerMode::Cooldown => {
                            s.begin_countdown()
                                && s.enter_run(uuid::Uuid::new_v4())
                                && s.enter_cooldown(Instant::now())
                        },
                        PlayerMode::GraceEject => s.begin_grace_eject(),
                        PlayerMode::Disconnected => {
                            s.begin_countdown()
                                && s.enter_run(uuid::Uuid::new_v4())
                                && s.mark_disconnected(Instant::now())
                        },
                    };
                    prop_assume!(reached);
                    let before = s.mode();
                    prop_assert!(!s.transition(to));
                    prop_assert_eq!(s.mode(), before);
                }
            }
        }
    }
}
