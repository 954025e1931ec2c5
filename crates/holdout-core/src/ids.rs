use uuid::Uuid;

/// Stable identifier for a player, valid across sessions.
pub type PlayerId = Uuid;

/// Identifier for a party of players.
pub type TeamId = Uuid;

/// Identifier for one time-boxed cooperative run.
pub type RunId = Uuid;

/// Identifier for a transient world entity (enemy) tracked by a run.
pub type EntityId = Uuid;
