use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::ids::{EntityId, PlayerId, RunId, TeamId};

/// Lifecycle status of a run. Forward-only: `Starting -> Active` is the one
/// pre-end edge; `Ending` and `Completed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Starting,
    Active,
    Ending,
    Completed,
}

/// A respawn location inside the run's world. Geometry sampling lives with
/// the world collaborator; runs only cycle through the points they were
/// given at setup.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpawnPoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    #[serde(default)]
    pub yaw: f32,
}

/// One time-boxed cooperative session bound to a team.
///
/// Participants are the team members who actually entered the run —
/// membership at join time, not live membership. Death is reversible inside
/// a run (`mark_dead`/`mark_alive`); removal is not. Aggregate counters
/// only ever grow.
#[derive(Debug, Clone)]
pub struct Run {
    id: RunId,
    team_id: TeamId,
    world: String,

    status: RunStatus,
    started_at: Instant,
    ended_at: Option<Instant>,

    participants: HashSet<PlayerId>,
    alive: HashSet<PlayerId>,
    death_counts: HashMap<PlayerId, u32>,

    spawn_points: Vec<SpawnPoint>,
    spawn_cursor: usize,

    total_kills: u64,
    total_coins: u64,
    total_xp: u64,
    wave: u32,

    active_enemies: HashSet<EntityId>,
}

impl Run {
    pub fn new(id: RunId, team_id: TeamId, world: impl Into<String>, now: Instant) -> Self {
        Self {
            id,
            team_id,
            world: world.into(),
            status: RunStatus::Starting,
            started_at: now,
            ended_at: None,
            participants: HashSet::new(),
            alive: HashSet::new(),
            death_counts: HashMap::new(),
            spawn_points: Vec::new(),
            spawn_cursor: 0,
            total_kills: 0,
            total_coins: 0,
            total_xp: 0,
            wave: 0,
            active_enemies: HashSet::new(),
        }
    }

    pub fn id(&self) -> RunId {
        self.id
    }

    pub fn team_id(&self) -> TeamId {
        self.team_id
    }

    pub fn world(&self) -> &str {
        &self.world
    }

    // ==================== Participants ====================

    /// Adds a participant, marks them alive, and seeds their death counter.
    pub fn add_participant(&mut self, player: PlayerId) {
        self.participants.insert(player);
        self.alive.insert(player);
        self.death_counts.entry(player).or_insert(0);
    }

    /// Leaving a run is final for that run; the historical death counter is
    /// kept for end-of-run reporting.
    pub fn remove_participant(&mut self, player: PlayerId) {
        self.participants.remove(&player);
        self.alive.remove(&player);
    }

    pub fn is_participant(&self, player: PlayerId) -> bool {
        self.participants.contains(&player)
    }

    pub fn participants(&self) -> Vec<PlayerId> {
        self.participants.iter().copied().collect()
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    // ==================== Life and death ====================

    pub fn mark_dead(&mut self, player: PlayerId) {
        self.alive.remove(&player);
        *self.death_counts.entry(player).or_insert(0) += 1;
    }

    pub fn mark_alive(&mut self, player: PlayerId) {
        if self.participants.contains(&player) {
            self.alive.insert(player);
        }
    }

    pub fn is_alive(&self, player: PlayerId) -> bool {
        self.alive.contains(&player)
    }

    pub fn alive_players(&self) -> HashSet<PlayerId> {
        self.alive.clone()
    }

    pub fn alive_count(&self) -> usize {
        self.alive.len()
    }

    pub fn death_count(&self, player: PlayerId) -> u32 {
        self.death_counts.get(&player).copied().unwrap_or(0)
    }

    /// Run-local wipe: nobody alive right now. The team-level check also
    /// weighs disconnect grace; this one is for "everyone is down".
    pub fn is_team_wiped(&self) -> bool {
        self.alive.is_empty()
    }

    // ==================== Spawn points ====================

    /// Replaces the spawn list. Only called during run setup.
    pub fn set_spawn_points(&mut self, points: Vec<SpawnPoint>) {
        self.spawn_points = points;
        self.spawn_cursor = 0;
    }

    pub fn spawn_points(&self) -> &[SpawnPoint] {
        &self.spawn_points
    }

    /// Round-robin accessor: advances the cursor on every call, wrapping by
    /// list length. `None` on an empty list.
    pub fn next_spawn_point(&mut self) -> Option<SpawnPoint> {
        if self.spawn_points.is_empty() {
            return None;
        }
        let point = self.spawn_points[self.spawn_cursor % self.spawn_points.len()];
        self.spawn_cursor = self.spawn_cursor.wrapping_add(1);
        Some(point)
    }

    /// Random accessor, independent of the round-robin cursor.
    pub fn random_spawn_point(&self) -> Option<SpawnPoint> {
        if self.spawn_points.is_empty() {
            return None;
        }
        let idx = rand::rng().random_range(0..self.spawn_points.len());
        Some(self.spawn_points[idx])
    }

    // ==================== Enemies ====================

    pub fn add_enemy(&mut self, entity: EntityId) {
        self.active_enemies.insert(entity);
    }

    pub fn remove_enemy(&mut self, entity: EntityId) {
        self.active_enemies.remove(&entity);
    }

    pub fn is_enemy(&self, entity: EntityId) -> bool {
        self.active_enemies.contains(&entity)
    }

    pub fn active_enemy_count(&self) -> usize {
        self.active_enemies.len()
    }

    pub fn clear_enemies(&mut self) {
        self.active_enemies.clear();
    }

    // ==================== Counters ====================

    pub fn record_kill(&mut self) {
        self.total_kills += 1;
    }

    pub fn add_kills(&mut self, count: u64) {
        self.total_kills += count;
    }

    pub fn add_coins(&mut self, amount: u64) {
        self.total_coins += amount;
    }

    pub fn add_xp(&mut self, amount: u64) {
        self.total_xp += amount;
    }

    pub fn advance_wave(&mut self) {
        self.wave += 1;
    }

    pub fn total_kills(&self) -> u64 {
        self.total_kills
    }

    pub fn total_coins(&self) -> u64 {
        self.total_coins
    }

    pub fn total_xp(&self) -> u64 {
        self.total_xp
    }

    pub fn wave(&self) -> u32 {
        self.wave
    }

    /// Mean participant level for spawn scaling; the level lookup belongs
    /// to the session owner, so it is injected.
    pub fn average_player_level(&self, level_of: impl Fn(PlayerId) -> u32) -> f64 {
        if self.participants.is_empty() {
            return 0.0;
        }
        let total: u64 = self.participants.iter().map(|p| u64::from(level_of(*p))).sum();
        total as f64 / self.participants.len() as f64
    }

    // ==================== Status and timing ====================

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn start(&mut self) -> bool {
        if self.status != RunStatus::Starting {
            return false;
        }
        self.status = RunStatus::Active;
        true
    }

    /// Terminal. Stamps the end instant and drops enemy tracking.
    pub fn end(&mut self, now: Instant) -> bool {
        if self.is_ended() {
            return false;
        }
        self.status = RunStatus::Ending;
        self.ended_at = Some(now);
        self.active_enemies.clear();
        true
    }

    /// Terminal. Keeps an earlier end stamp if one exists.
    pub fn complete(&mut self, now: Instant) {
        self.status = RunStatus::Completed;
        if self.ended_at.is_none() {
            self.ended_at = Some(now);
        }
        self.active_enemies.clear();
    }

    pub fn is_active(&self) -> bool {
        self.status == RunStatus::Active
    }

    pub fn is_ended(&self) -> bool {
        matches!(self.status, RunStatus::Ending | RunStatus::Completed)
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<Instant> {
        self.ended_at
    }

    /// Computed on demand from the end stamp (or `now` while live); nothing
    /// keeps a running clock.
    pub fn elapsed(&self, now: Instant) -> Duration {
        self.ended_at
            .unwrap_or(now)
            .saturating_duration_since(self.started_at)
    }
}
