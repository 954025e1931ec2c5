use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lifetime statistics for a player, carried across runs and sessions.
/// The persistence collaborator serializes these verbatim; this crate only
/// keeps the counters honest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerStats {
    pub runs_started: u32,
    pub runs_completed: u32,
    pub total_kills: u64,
    pub total_deaths: u32,
    pub most_deaths_in_run: u32,
    pub highest_kills_in_run: u64,
    pub highest_player_level: u32,
    pub best_wave: u32,
    pub total_coins: u64,
    pub total_run_time_secs: u64,
    pub longest_run_time_secs: u64,
}

impl PlayerStats {
    pub fn record_run_start(&mut self) {
        self.runs_started += 1;
    }

    /// Folds one finished run into the lifetime totals.
    pub fn record_run_end(
        &mut self,
        duration: Duration,
        kills: u64,
        deaths: u32,
        coins: u64,
        wave: u32,
        player_level: u32,
    ) {
        self.runs_completed += 1;
        let secs = duration.as_secs();
        self.total_run_time_secs += secs;
        self.longest_run_time_secs = self.longest_run_time_secs.max(secs);
        self.total_kills += kills;
        self.highest_kills_in_run = self.highest_kills_in_run.max(kills);
        self.total_deaths += deaths;
        self.most_deaths_in_run = self.most_deaths_in_run.max(deaths);
        self.total_coins += coins;
        self.best_wave = self.best_wave.max(wave);
        self.highest_player_level = self.highest_player_level.max(player_level);
    }
}
