use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use uuid::Uuid;

use holdout_core::ids::{PlayerId, RunId, TeamId};
use holdout_core::run::{Run, SpawnPoint};
use holdout_core::session::{PlayerMode, PlayerSession};
use holdout_core::team::Team;

use crate::error::Rejection;

/// Handle to one aggregate: a mutex per session/team/run, never a lock over
/// the whole registry.
pub type Shared<T> = Arc<Mutex<T>>;

/// How a run ended; decides which cooldown (if any) participants receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// Objectives completed.
    Normal,
    /// Nobody left alive or recoverable.
    Wipe,
    /// Solo death.
    Death,
    /// Admin forced the end.
    Forced,
    /// Everyone dropped and grace ran out.
    Disconnect,
}

impl EndReason {
    /// Wipes and deaths carry the death cooldown; the rest return players
    /// straight to the lobby.
    pub fn applies_death_penalty(self) -> bool {
        matches!(self, Self::Wipe | Self::Death)
    }
}

/// The single authoritative owner of all sessions, teams, and runs.
///
/// Everything that touches more than one aggregate goes through here; this
/// is the only component that keeps the derived indices (player->team,
/// player->run, team->run) and the reconcilers' tracked candidate sets
/// consistent. Constructed per instance and passed by handle — tests build
/// as many isolated registries as they like.
///
/// Locking discipline: map locks are held only for insert/remove/lookup,
/// and at most one aggregate mutex is held at a time. Multi-step operations
/// snapshot what they need, drop the lock, then move on — a concurrent
/// reader may observe the intermediate state, which no invariant forbids.
#[derive(Default)]
pub struct StateRegistry {
    players: RwLock<HashMap<PlayerId, Shared<PlayerSession>>>,
    teams: RwLock<HashMap<TeamId, Shared<Team>>>,
    runs: RwLock<HashMap<RunId, Shared<Run>>>,

    player_team: RwLock<HashMap<PlayerId, TeamId>>,
    player_run: RwLock<HashMap<PlayerId, RunId>>,
    team_run: RwLock<HashMap<TeamId, RunId>>,

    // Candidate subsets the reconcilers iterate, so a sweep never scans the
    // whole player population.
    disconnected: Mutex<HashSet<PlayerId>>,
    cooling_down: Mutex<HashSet<PlayerId>>,
}

impl StateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // ==================== Players ====================

    /// Idempotent get-or-create by id. Sessions are never destroyed, only
    /// reset.
    pub fn get_or_create_player(&self, id: PlayerId, name: &str) -> Shared<PlayerSession> {
        if let Some(existing) = self.players.read().unwrap().get(&id) {
            return Arc::clone(existing);
        }
        let mut players = self.players.write().unwrap();
        Arc::clone(
            players
                .entry(id)
                .or_insert_with(|| Arc::new(Mutex::new(PlayerSession::new(id, name)))),
        )
    }

    pub fn player(&self, id: PlayerId) -> Option<Shared<PlayerSession>> {
        self.players.read().unwrap().get(&id).map(Arc::clone)
    }

    /// Admin purge: drops the session and every index entry for it.
    pub fn remove_player(&self, id: PlayerId) {
        self.players.write().unwrap().remove(&id);
        self.player_team.write().unwrap().remove(&id);
        self.player_run.write().unwrap().remove(&id);
        self.disconnected.lock().unwrap().remove(&id);
        self.cooling_down.lock().unwrap().remove(&id);
    }

    pub fn all_players(&self) -> Vec<Shared<PlayerSession>> {
        self.players.read().unwrap().values().map(Arc::clone).collect()
    }

    pub fn players_in_mode(&self, mode: PlayerMode) -> Vec<PlayerId> {
        self.all_players()
            .into_iter()
            .filter_map(|s| {
                let s = s.lock().unwrap();
                (s.mode() == mode).then(|| s.id())
            })
            .collect()
    }

    pub fn player_count(&self) -> usize {
        self.players.read().unwrap().len()
    }

    // ==================== Teams ====================

    /// Creates a team with the given player as founding leader. Guards:
    /// the founder must exist, be in the lobby, and be teamless; the name
    /// must be unique among live teams (case-insensitive).
    pub fn create_team(
        &self,
        name: &str,
        leader: PlayerId,
        now: Instant,
    ) -> Result<Shared<Team>, Rejection> {
        let session = self.player(leader).ok_or(Rejection::PlayerNotFound)?;
        if self.player_team.read().unwrap().contains_key(&leader) {
            return Err(Rejection::AlreadyInTeam);
        }
        {
            let session = session.lock().unwrap();
            if session.mode() != PlayerMode::Lobby {
                return Err(Rejection::NotInLobby);
            }
        }
        if self.find_team_by_name(name).is_some() {
            return Err(Rejection::TeamNameTaken(name.to_string()));
        }

        let team_id = Uuid::new_v4();
        let team = Arc::new(Mutex::new(Team::new(team_id, name, leader, now)));
        self.teams
            .write()
            .unwrap()
            .insert(team_id, Arc::clone(&team));
        self.player_team.write().unwrap().insert(leader, team_id);
        session.lock().unwrap().team_id = Some(team_id);

        tracing::info!(%team_id, name, %leader, "Team created");
        Ok(team)
    }

    pub fn team(&self, id: TeamId) -> Option<Shared<Team>> {
        self.teams.read().unwrap().get(&id).map(Arc::clone)
    }

    /// Case-insensitive name lookup.
    pub fn find_team_by_name(&self, name: &str) -> Option<Shared<Team>> {
        let teams = self.teams.read().unwrap();
        teams
            .values()
            .find(|t| t.lock().unwrap().name.eq_ignore_ascii_case(name))
            .map(Arc::clone)
    }

    pub fn player_team(&self, player: PlayerId) -> Option<Shared<Team>> {
        let team_id = *self.player_team.read().unwrap().get(&player)?;
        self.team(team_id)
    }

    pub fn is_in_team(&self, player: PlayerId) -> bool {
        self.player_team.read().unwrap().contains_key(&player)
    }

    pub fn all_teams(&self) -> Vec<Shared<Team>> {
        self.teams.read().unwrap().values().map(Arc::clone).collect()
    }

    pub fn team_count(&self) -> usize {
        self.teams.read().unwrap().len()
    }

    /// Moves a player onto a team (off any previous one first).
    pub fn add_player_to_team(&self, player: PlayerId, team_id: TeamId) -> Result<(), Rejection> {
        let team = self.team(team_id).ok_or(Rejection::TeamNotFound)?;

        let old_team = {
            let index = self.player_team.read().unwrap();
            index.get(&player).copied()
        };
        if let Some(old_id) = old_team
            && old_id != team_id
            && let Some(old) = self.team(old_id)
        {
            old.lock().unwrap().remove_member(player);
        }

        team.lock().unwrap().add_member(player);
        self.player_team.write().unwrap().insert(player, team_id);
        if let Some(session) = self.player(player) {
            session.lock().unwrap().team_id = Some(team_id);
        }
        Ok(())
    }

    /// Removes a player from their team. An emptied team is disbanded; a
    /// departing leader is replaced via auto-selection.
    pub fn remove_player_from_team(&self, player: PlayerId) {
        let team_id = self.player_team.write().unwrap().remove(&player);
        if let Some(team_id) = team_id
            && let Some(team) = self.team(team_id)
        {
            let emptied = {
                let mut team = team.lock().unwrap();
                team.remove_member(player);
                if team.is_empty() {
                    true
                } else {
                    if team.is_leader(player) {
                        team.auto_select_leader();
                    }
                    false
                }
            };
            if emptied {
                self.teams.write().unwrap().remove(&team_id);
                self.team_run.write().unwrap().remove(&team_id);
                tracing::info!(%team_id, "Team disbanded (last member left)");
            }
        }

        if let Some(session) = self.player(player) {
            session.lock().unwrap().team_id = None;
        }
    }

    /// Explicit disband: detaches every member and drops the team.
    pub fn disband_team(&self, team_id: TeamId) {
        let team = self.teams.write().unwrap().remove(&team_id);
        let Some(team) = team else { return };
        self.team_run.write().unwrap().remove(&team_id);

        let members = team.lock().unwrap().members();
        for member in members {
            self.player_team.write().unwrap().remove(&member);
            if let Some(session) = self.player(member) {
                session.lock().unwrap().team_id = None;
            }
        }
        tracing::info!(%team_id, "Team disbanded");
    }

    // ==================== Runs ====================

    /// Creates a run for a team and enrolls every member currently in
    /// Countdown mode as a participant. Members that sat the countdown out
    /// (on cooldown, already running, disconnected) are simply absent from
    /// the participant set.
    pub fn create_run(
        &self,
        team_id: TeamId,
        world: &str,
        spawn_points: Vec<SpawnPoint>,
        now: Instant,
    ) -> Result<Shared<Run>, Rejection> {
        let team = self.team(team_id).ok_or(Rejection::TeamNotFound)?;

        let run_id = Uuid::new_v4();
        let mut new_run = Run::new(run_id, team_id, world, now);
        new_run.set_spawn_points(spawn_points);

        // Publish the run before flipping anyone to InRun, so an InRun
        // session always resolves to a registered run.
        let run = Arc::new(Mutex::new(new_run));
        self.runs.write().unwrap().insert(run_id, Arc::clone(&run));

        let members = team.lock().unwrap().members();
        let mut enrolled = 0usize;
        for member in &members {
            let Some(session) = self.player(*member) else {
                continue;
            };
            let entered = {
                let mut session = session.lock().unwrap();
                if session.enter_run(run_id) {
                    session.stats.record_run_start();
                    true
                } else {
                    false
                }
            };
            if entered {
                run.lock().unwrap().add_participant(*member);
                self.player_run.write().unwrap().insert(*member, run_id);
                enrolled += 1;
            }
        }

        self.team_run.write().unwrap().insert(team_id, run_id);
        team.lock().unwrap().run_id = Some(run_id);

        tracing::info!(%run_id, %team_id, world, enrolled, "Run created");
        Ok(run)
    }

    pub fn run(&self, id: RunId) -> Option<Shared<Run>> {
        self.runs.read().unwrap().get(&id).map(Arc::clone)
    }

    pub fn player_run(&self, player: PlayerId) -> Option<Shared<Run>> {
        let run_id = *self.player_run.read().unwrap().get(&player)?;
        self.run(run_id)
    }

    pub fn team_run(&self, team_id: TeamId) -> Option<Shared<Run>> {
        let run_id = *self.team_run.read().unwrap().get(&team_id)?;
        self.run(run_id)
    }

    pub fn is_in_run(&self, player: PlayerId) -> bool {
        self.player_run.read().unwrap().contains_key(&player)
    }

    /// Detaches one player from their run without ending it: index entry
    /// removed, participant slot dropped. Used on death, voluntary quit,
    /// grace expiry, and eject.
    pub fn detach_from_run(&self, player: PlayerId) {
        let run_id = self.player_run.write().unwrap().remove(&player);
        if let Some(run_id) = run_id
            && let Some(run) = self.run(run_id)
        {
            run.lock().unwrap().remove_participant(player);
        }
    }

    /// Ends a run: stamps the aggregate, folds each remaining participant's
    /// stats, resets their run state, and assigns the post-run mode by end
    /// reason (cooldown for wipe/death, lobby otherwise). The team's
    /// transient run state is cleared. The run aggregate stays in the
    /// registry until `remove_run` so reward/persistence collaborators can
    /// read its final counters.
    pub fn end_run(
        &self,
        run_id: RunId,
        reason: EndReason,
        death_cooldown: Duration,
        now: Instant,
    ) {
        let Some(run) = self.run(run_id) else { return };

        // Snapshot under the run lock, then work session by session.
        let (team_id, participants, elapsed, kills, coins, wave, deaths) = {
            let mut run = run.lock().unwrap();
            if !run.end(now) {
                // Already ended; the cleanup below ran the first time.
                return;
            }
            let participants = run.participants();
            let deaths: HashMap<PlayerId, u32> = participants
                .iter()
                .map(|p| (*p, run.death_count(*p)))
                .collect();
            (
                run.team_id(),
                participants,
                run.elapsed(now),
                run.total_kills(),
                run.total_coins(),
                run.wave(),
                deaths,
            )
        };

        for player in &participants {
            self.player_run.write().unwrap().remove(player);
            let Some(session) = self.player(*player) else {
                continue;
            };
            let mut session = session.lock().unwrap();
            let level = session.player_level();
            session.stats.record_run_end(
                elapsed,
                kills,
                deaths.get(player).copied().unwrap_or(0),
                coins,
                wave,
                level,
            );
            session.reset_run_state();
            if reason.applies_death_penalty() {
                if session.enter_cooldown(now + death_cooldown) {
                    self.cooling_down.lock().unwrap().insert(*player);
                } else {
                    session.return_to_lobby();
                }
            } else {
                session.return_to_lobby();
            }
            // Whatever path was taken, the disconnect candidate entry is
            // stale once the run is gone.
            self.disconnected.lock().unwrap().remove(player);
        }

        self.team_run.write().unwrap().remove(&team_id);
        if let Some(team) = self.team(team_id) {
            team.lock().unwrap().reset_for_new_run();
        }

        tracing::info!(
            %run_id, %team_id, ?reason, kills, coins, wave,
            elapsed_secs = elapsed.as_secs(),
            "Run ended"
        );
    }

    /// Terminal removal, once every consumer has read the final state.
    pub fn remove_run(&self, run_id: RunId, now: Instant) {
        let run = self.runs.write().unwrap().remove(&run_id);
        if let Some(run) = run {
            run.lock().unwrap().complete(now);
        }
    }

    pub fn active_run_count(&self) -> usize {
        self.runs
            .read()
            .unwrap()
            .values()
            .filter(|r| r.lock().unwrap().is_active())
            .count()
    }

    pub fn players_in_run_count(&self) -> usize {
        self.player_run.read().unwrap().len()
    }

    /// Active runs per world name, for least-loaded world selection.
    pub fn runs_in_world(&self, world: &str) -> usize {
        self.runs
            .read()
            .unwrap()
            .values()
            .filter(|r| {
                let r = r.lock().unwrap();
                !r.is_ended() && r.world() == world
            })
            .count()
    }

    // ==================== Tracked candidate sets ====================

    pub fn mark_disconnected(&self, player: PlayerId) {
        self.disconnected.lock().unwrap().insert(player);
    }

    pub fn mark_reconnected(&self, player: PlayerId) {
        self.disconnected.lock().unwrap().remove(&player);
    }

    /// Snapshot of the disconnect candidates for the sweep.
    pub fn disconnected_players(&self) -> Vec<PlayerId> {
        self.disconnected.lock().unwrap().iter().copied().collect()
    }

    pub fn mark_cooling_down(&self, player: PlayerId) {
        self.cooling_down.lock().unwrap().insert(player);
    }

    pub fn clear_cooling_down(&self, player: PlayerId) {
        self.cooling_down.lock().unwrap().remove(&player);
    }

    /// Snapshot of the cooldown candidates for the sweep.
    pub fn cooldown_players(&self) -> Vec<PlayerId> {
        self.cooling_down.lock().unwrap().iter().copied().collect()
    }

    // ==================== Maintenance ====================

    /// Drops all state (shutdown/reload).
    pub fn clear_all(&self) {
        self.players.write().unwrap().clear();
        self.teams.write().unwrap().clear();
        self.runs.write().unwrap().clear();
        self.player_team.write().unwrap().clear();
        self.player_run.write().unwrap().clear();
        self.team_run.write().unwrap().clear();
        self.disconnected.lock().unwrap().clear();
        self.cooling_down.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use holdout_core::test_helpers::make_spawn_points;

    fn registry_with_players(n: usize) -> (StateRegistry, Vec<PlayerId>) {
        let registry = StateRegistry::new();
        let ids: Vec<PlayerId> = (0..n).map(|_| Uuid::new_v4()).collect();
        for (i, id) in ids.iter().enumerate() {
            registry.get_or_create_player(*id, &format!("Player{}", i + 1));
        }
        (registry, ids)
    }

    fn team_with_countdown(
        registry: &StateRegistry,
        ids: &[PlayerId],
        now: Instant,
    ) -> Shared<Team> {
        let team = registry.create_team("Nightwatch", ids[0], now).unwrap();
        let team_id = team.lock().unwrap().id();
        for id in &ids[1..] {
            registry.add_player_to_team(*id, team_id).unwrap();
        }
        for id in ids {
            let session = registry.player(*id).unwrap();
            assert!(session.lock().unwrap().begin_countdown());
        }
        team
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let (registry, ids) = registry_with_players(1);
        let a = registry.get_or_create_player(ids[0], "Alice");
        let b = registry.get_or_create_player(ids[0], "SomeoneElse");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.player_count(), 1);
    }

    #[test]
    fn create_team_requires_lobby_and_no_team() {
        let (registry, ids) = registry_with_players(2);
        let now = Instant::now();

        registry.create_team("Alpha", ids[0], now).unwrap();
        assert_eq!(
            registry.create_team("Beta", ids[0], now).unwrap_err(),
            Rejection::AlreadyInTeam
        );

        let session = registry.player(ids[1]).unwrap();
        session.lock().unwrap().begin_countdown();
        assert_eq!(
            registry.create_team("Beta", ids[1], now).unwrap_err(),
            Rejection::NotInLobby
        );
    }

    #[test]
    fn team_names_are_unique_case_insensitively() {
        let (registry, ids) = registry_with_players(2);
        let now = Instant::now();
        registry.create_team("Nightwatch", ids[0], now).unwrap();
        assert_eq!(
            registry.create_team("NIGHTWATCH", ids[1], now).unwrap_err(),
            Rejection::TeamNameTaken("NIGHTWATCH".to_string())
        );
        assert!(registry.find_team_by_name("nightwatch").is_some());
    }

    #[test]
    fn removing_last_member_disbands_team() {
        let (registry, ids) = registry_with_players(1);
        let team = registry.create_team("Solo", ids[0], Instant::now()).unwrap();
        let team_id = team.lock().unwrap().id();
        registry.remove_player_from_team(ids[0]);
        assert!(registry.team(team_id).is_none());
        assert!(!registry.is_in_team(ids[0]));
        let session = registry.player(ids[0]).unwrap();
        assert!(session.lock().unwrap().team_id.is_none());
    }

    #[test]
    fn removing_leader_reassigns_leadership() {
        let (registry, ids) = registry_with_players(3);
        let team = registry.create_team("Trio", ids[0], Instant::now()).unwrap();
        let team_id = team.lock().unwrap().id();
        registry.add_player_to_team(ids[1], team_id).unwrap();
        registry.add_player_to_team(ids[2], team_id).unwrap();

        registry.remove_player_from_team(ids[0]);
        let team = registry.team(team_id).unwrap();
        let team = team.lock().unwrap();
        let leader = team.leader();
        assert!(leader == ids[1] || leader == ids[2]);
        assert!(team.is_member(leader));
    }

    #[test]
    fn disband_detaches_every_member() {
        let (registry, ids) = registry_with_players(2);
        let team = registry.create_team("Pair", ids[0], Instant::now()).unwrap();
        let team_id = team.lock().unwrap().id();
        registry.add_player_to_team(ids[1], team_id).unwrap();

        registry.disband_team(team_id);
        assert!(registry.team(team_id).is_none());
        for id in &ids {
            assert!(!registry.is_in_team(*id));
        }
    }

    #[test]
    fn create_run_enrolls_countdown_members_only() {
        let (registry, ids) = registry_with_players(3);
        let now = Instant::now();
        let team = registry.create_team("Trio", ids[0], now).unwrap();
        let team_id = team.lock().unwrap().id();
        registry.add_player_to_team(ids[1], team_id).unwrap();
        registry.add_player_to_team(ids[2], team_id).unwrap();

        // Only the first two reach countdown; the third stays in the lobby.
        for id in &ids[..2] {
            registry.player(*id).unwrap().lock().unwrap().begin_countdown();
        }

        let run = registry
            .create_run(team_id, "ruins", make_spawn_points(2), now)
            .unwrap();
        let run = run.lock().unwrap();
        assert_eq!(run.participant_count(), 2);
        assert!(run.is_participant(ids[0]));
        assert!(run.is_participant(ids[1]));
        assert!(!run.is_participant(ids[2]));

        // The in-run invariant: every InRun session resolves to a run that
        // lists it as a participant.
        for id in &ids[..2] {
            let session = registry.player(*id).unwrap();
            let session = session.lock().unwrap();
            assert_eq!(session.mode(), PlayerMode::InRun);
            let member_run = registry.player_run(session.id()).unwrap();
            assert!(member_run.lock().unwrap().is_participant(session.id()));
        }
        assert_eq!(registry.players_in_run_count(), 2);
    }

    #[test]
    fn end_run_with_wipe_applies_cooldown() {
        let (registry, ids) = registry_with_players(2);
        let now = Instant::now();
        let team = team_with_countdown(&registry, &ids, now);
        let team_id = team.lock().unwrap().id();
        let run = registry
            .create_run(team_id, "ruins", make_spawn_points(1), now)
            .unwrap();
        let run_id = run.lock().unwrap().id();
        run.lock().unwrap().start();

        registry.end_run(run_id, EndReason::Wipe, Duration::from_secs(60), now);

        for id in &ids {
            let session = registry.player(*id).unwrap();
            let session = session.lock().unwrap();
            assert_eq!(session.mode(), PlayerMode::Cooldown);
            assert!(session.run_id.is_none());
            assert!(session.is_on_cooldown(now));
        }
        assert_eq!(registry.cooldown_players().len(), 2);
        assert_eq!(registry.players_in_run_count(), 0);
        assert!(team.lock().unwrap().run_id.is_none());
        assert_eq!(
            registry.run(run_id).unwrap().lock().unwrap().status(),
            holdout_core::run::RunStatus::Ending
        );
    }

    #[test]
    fn end_run_forced_returns_players_to_lobby() {
        let (registry, ids) = registry_with_players(2);
        let now = Instant::now();
        let team = team_with_countdown(&registry, &ids, now);
        let team_id = team.lock().unwrap().id();
        let run = registry
            .create_run(team_id, "ruins", make_spawn_points(1), now)
            .unwrap();
        let run_id = run.lock().unwrap().id();
        run.lock().unwrap().start();

        registry.end_run(run_id, EndReason::Forced, Duration::from_secs(60), now);

        for id in &ids {
            let session = registry.player(*id).unwrap();
            let session = session.lock().unwrap();
            assert_eq!(session.mode(), PlayerMode::Lobby);
            assert!(!session.is_on_cooldown(now));
        }
        assert!(registry.cooldown_players().is_empty());
    }

    #[test]
    fn end_run_folds_lifetime_stats() {
        let (registry, ids) = registry_with_players(1);
        let now = Instant::now();
        let team = team_with_countdown(&registry, &ids, now);
        let team_id = team.lock().unwrap().id();
        let run = registry
            .create_run(team_id, "ruins", make_spawn_points(1), now)
            .unwrap();
        let run_id = run.lock().unwrap().id();
        {
            let mut run = run.lock().unwrap();
            run.start();
            run.add_kills(12);
            run.add_coins(30);
            run.advance_wave();
        }

        let end = now + Duration::from_secs(90);
        registry.end_run(run_id, EndReason::Normal, Duration::from_secs(60), end);

        let session = registry.player(ids[0]).unwrap();
        let session = session.lock().unwrap();
        assert_eq!(session.stats.runs_started, 1);
        assert_eq!(session.stats.runs_completed, 1);
        assert_eq!(session.stats.total_kills, 12);
        assert_eq!(session.stats.total_coins, 30);
        assert_eq!(session.stats.best_wave, 1);
        assert_eq!(session.stats.total_run_time_secs, 90);
    }

    #[test]
    fn detach_from_run_leaves_run_alive() {
        let (registry, ids) = registry_with_players(2);
        let now = Instant::now();
        let team = team_with_countdown(&registry, &ids, now);
        let team_id = team.lock().unwrap().id();
        let run = registry
            .create_run(team_id, "ruins", make_spawn_points(1), now)
            .unwrap();
        run.lock().unwrap().start();

        registry.detach_from_run(ids[0]);
        assert!(!registry.is_in_run(ids[0]));
        assert!(registry.is_in_run(ids[1]));
        let run = run.lock().unwrap();
        assert!(!run.is_participant(ids[0]));
        assert!(run.is_participant(ids[1]));
        assert!(run.is_active());
    }

    #[test]
    fn remove_run_completes_and_drops_the_aggregate() {
        let (registry, ids) = registry_with_players(1);
        let now = Instant::now();
        let team = team_with_countdown(&registry, &ids, now);
        let team_id = team.lock().unwrap().id();
        let run = registry
            .create_run(team_id, "ruins", make_spawn_points(1), now)
            .unwrap();
        let run_id = run.lock().unwrap().id();

        registry.end_run(run_id, EndReason::Normal, Duration::from_secs(60), now);
        registry.remove_run(run_id, now);
        assert!(registry.run(run_id).is_none());
        // The handle we still hold saw the terminal status.
        assert_eq!(
            run.lock().unwrap().status(),
            holdout_core::run::RunStatus::Completed
        );
    }

    #[test]
    fn tracked_sets_round_trip() {
        let (registry, ids) = registry_with_players(1);
        registry.mark_disconnected(ids[0]);
        assert_eq!(registry.disconnected_players(), vec![ids[0]]);
        registry.mark_reconnected(ids[0]);
        assert!(registry.disconnected_players().is_empty());

        registry.mark_cooling_down(ids[0]);
        assert_eq!(registry.cooldown_players(), vec![ids[0]]);
        registry.clear_cooling_down(ids[0]);
        assert!(registry.cooldown_players().is_empty());
    }

    #[test]
    fn remove_player_purges_indices_and_tracked_sets() {
        let (registry, ids) = registry_with_players(1);
        let now = Instant::now();
        let team = team_with_countdown(&registry, &ids, now);
        let team_id = team.lock().unwrap().id();
        registry
            .create_run(team_id, "ruins", make_spawn_points(1), now)
            .unwrap();
        registry.mark_disconnected(ids[0]);
        registry.mark_cooling_down(ids[0]);

        registry.remove_player(ids[0]);
        assert!(registry.player(ids[0]).is_none());
        assert!(!registry.is_in_team(ids[0]));
        assert!(!registry.is_in_run(ids[0]));
        assert!(registry.disconnected_players().is_empty());
        assert!(registry.cooldown_players().is_empty());
    }

    #[test]
    fn clear_all_empties_everything() {
        let (registry, ids) = registry_with_players(2);
        let now = Instant::now();
        let team = team_with_countdown(&registry, &ids, now);
        let team_id = team.lock().unwrap().id();
        registry
            .create_run(team_id, "ruins", make_spawn_points(1), now)
            .unwrap();

        registry.clear_all();
        assert_eq!(registry.player_count(), 0);
        assert_eq!(registry.team_count(), 0);
        assert_eq!(registry.active_run_count(), 0);
        assert_eq!(registry.players_in_run_count(), 0);
    }

    #[test]
    fn stale_run_reference_is_not_found() {
        let (registry, ids) = registry_with_players(1);
        let now = Instant::now();
        let team = team_with_countdown(&registry, &ids, now);
        let team_id = team.lock().unwrap().id();
        let run = registry
            .create_run(team_id, "ruins", make_spawn_points(1), now)
            .unwrap();
        let run_id = run.lock().unwrap().id();

        registry.end_run(run_id, EndReason::Normal, Duration::from_secs(60), now);
        registry.remove_run(run_id, now);

        // The id no longer resolves; callers treat this as plain not-found.
        assert!(registry.run(run_id).is_none());
        assert!(registry.player_run(ids[0]).is_none());
    }

    #[test]
    fn runs_in_world_counts_live_runs_only() {
        let (registry, ids) = registry_with_players(2);
        let now = Instant::now();
        let team_a = registry.create_team("A", ids[0], now).unwrap();
        let team_b = registry.create_team("B", ids[1], now).unwrap();
        for id in &ids {
            registry.player(*id).unwrap().lock().unwrap().begin_countdown();
        }
        let a_id = team_a.lock().unwrap().id();
        let b_id = team_b.lock().unwrap().id();
        let run_a = registry
            .create_run(a_id, "ruins", make_spawn_points(1), now)
            .unwrap();
        registry
            .create_run(b_id, "crypt", make_spawn_points(1), now)
            .unwrap();

        assert_eq!(registry.runs_in_world("ruins"), 1);
        assert_eq!(registry.runs_in_world("crypt"), 1);

        let run_a_id = run_a.lock().unwrap().id();
        registry.end_run(run_a_id, EndReason::Normal, Duration::from_secs(60), now);
        assert_eq!(registry.runs_in_world("ruins"), 0);
    }
}
