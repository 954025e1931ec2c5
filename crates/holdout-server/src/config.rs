use std::time::Duration;

use serde::Deserialize;

use holdout_core::run::SpawnPoint;

/// Top-level server configuration, loaded from `holdout.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub cooldowns: CooldownConfig,
    pub disconnect: DisconnectConfig,
    pub teams: TeamsConfig,
    pub ready: ReadyConfig,
    pub admission: AdmissionConfig,
    pub sweeps: SweepsConfig,
    pub worlds: Vec<WorldConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            cooldowns: CooldownConfig::default(),
            disconnect: DisconnectConfig::default(),
            teams: TeamsConfig::default(),
            ready: ReadyConfig::default(),
            admission: AdmissionConfig::default(),
            sweeps: SweepsConfig::default(),
            worlds: vec![WorldConfig::default()],
        }
    }
}

/// Post-run cooldowns. Death and voluntary quit carry different durations.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CooldownConfig {
    pub death_cooldown_secs: u64,
    pub quit_cooldown_secs: u64,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            death_cooldown_secs: 60,
            quit_cooldown_secs: 30,
        }
    }
}

/// Disconnect grace handling.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DisconnectConfig {
    pub grace_secs: u64,
    pub notify_grace_expired: bool,
}

impl Default for DisconnectConfig {
    fn default() -> Self {
        Self {
            grace_secs: 300,
            notify_grace_expired: true,
        }
    }
}

/// Team composition limits and invite expiry.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TeamsConfig {
    pub max_size: usize,
    pub invite_expiry_secs: u64,
}

impl Default for TeamsConfig {
    fn default() -> Self {
        Self {
            max_size: 5,
            invite_expiry_secs: 60,
        }
    }
}

/// Ready/countdown flow.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReadyConfig {
    pub countdown_secs: u64,
    pub respawn_invulnerability_secs: u64,
}

impl Default for ReadyConfig {
    fn default() -> Self {
        Self {
            countdown_secs: 5,
            respawn_invulnerability_secs: 3,
        }
    }
}

/// Global admission switch defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    pub enabled: bool,
    pub grace_eject_secs: u64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            grace_eject_secs: 60,
        }
    }
}

/// Background sweep cadence. Expiries are detected lazily on these ticks,
/// so a deadline may run over by up to one interval.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SweepsConfig {
    pub disconnect_interval_secs: u64,
    pub cooldown_interval_secs: u64,
    pub countdown_poll_millis: u64,
}

impl Default for SweepsConfig {
    fn default() -> Self {
        Self {
            disconnect_interval_secs: 5,
            cooldown_interval_secs: 1,
            countdown_poll_millis: 250,
        }
    }
}

/// A world that can host runs, with its fixed respawn points.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub name: String,
    pub spawn_points: Vec<SpawnPoint>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            name: "ruins".to_string(),
            spawn_points: vec![SpawnPoint {
                x: 0.0,
                y: 64.0,
                z: 0.0,
                yaw: 0.0,
            }],
        }
    }
}

impl ServerConfig {
    pub fn death_cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldowns.death_cooldown_secs)
    }

    pub fn quit_cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldowns.quit_cooldown_secs)
    }

    pub fn disconnect_grace(&self) -> Duration {
        Duration::from_secs(self.disconnect.grace_secs)
    }

    pub fn invite_expiry(&self) -> Duration {
        Duration::from_secs(self.teams.invite_expiry_secs)
    }

    pub fn countdown(&self) -> Duration {
        Duration::from_secs(self.ready.countdown_secs)
    }

    pub fn respawn_invulnerability(&self) -> Duration {
        Duration::from_secs(self.ready.respawn_invulnerability_secs)
    }

    pub fn grace_eject(&self) -> Duration {
        Duration::from_secs(self.admission.grace_eject_secs)
    }

    /// Validate configuration; exits on values the engine cannot run with.
    pub fn validate(&self) {
        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            tracing::error!(
                addr = %self.listen_addr,
                "listen_addr is not a valid socket address"
            );
            std::process::exit(1);
        }
        if self.cooldowns.death_cooldown_secs == 0 {
            tracing::error!("cooldowns.death_cooldown_secs must be > 0");
            std::process::exit(1);
        }
        if self.disconnect.grace_secs == 0 {
            tracing::error!("disconnect.grace_secs must be > 0");
            std::process::exit(1);
        }
        if self.teams.max_size == 0 {
            tracing::error!("teams.max_size must be > 0");
            std::process::exit(1);
        }
        if self.ready.countdown_secs == 0 {
            tracing::error!("ready.countdown_secs must be > 0");
            std::process::exit(1);
        }
        if self.sweeps.disconnect_interval_secs == 0
            || self.sweeps.cooldown_interval_secs == 0
            || self.sweeps.countdown_poll_millis == 0
        {
            tracing::error!("sweep intervals must be > 0");
            std::process::exit(1);
        }
        if self.worlds.is_empty() {
            tracing::error!("at least one world must be configured");
            std::process::exit(1);
        }
        for world in &self.worlds {
            if world.spawn_points.is_empty() {
                tracing::warn!(
                    world = %world.name,
                    "world has no spawn points; respawns there will fail"
                );
            }
        }
    }

    /// Load config from `holdout.toml` if it exists, then apply env var
    /// overrides.
    pub fn load() -> Self {
        let mut config = match std::fs::read_to_string("holdout.toml") {
            Ok(content) => match toml::from_str::<ServerConfig>(&content) {
                Ok(cfg) => {
                    tracing::info!("Loaded configuration from holdout.toml");
                    cfg
                },
                Err(e) => {
                    tracing::warn!("Failed to parse holdout.toml: {e}, using defaults");
                    ServerConfig::default()
                },
            },
            Err(_) => {
                tracing::info!("No holdout.toml found, using defaults");
                ServerConfig::default()
            },
        };

        // Environment variable overrides
        if let Ok(addr) = std::env::var("HOLDOUT_LISTEN_ADDR")
            && !addr.is_empty()
        {
            config.listen_addr = addr;
        }
        if let Ok(val) = std::env::var("HOLDOUT_DEATH_COOLDOWN_SECS")
            && let Ok(n) = val.parse::<u64>()
        {
            config.cooldowns.death_cooldown_secs = n;
        }
        if let Ok(val) = std::env::var("HOLDOUT_QUIT_COOLDOWN_SECS")
            && let Ok(n) = val.parse::<u64>()
        {
            config.cooldowns.quit_cooldown_secs = n;
        }
        if let Ok(val) = std::env::var("HOLDOUT_DISCONNECT_GRACE_SECS")
            && let Ok(n) = val.parse::<u64>()
        {
            config.disconnect.grace_secs = n;
        }
        if let Ok(val) = std::env::var("HOLDOUT_MAX_TEAM_SIZE")
            && let Ok(n) = val.parse::<usize>()
        {
            config.teams.max_size = n;
        }

        config
    }
}
