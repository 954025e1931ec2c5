use std::time::Duration;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Typed rejection for a guarded operation.
///
/// Business-rule failures are values, not panics: every variant carries
/// enough to let a command/front-end layer pick a user-facing message. The
/// engine itself never aborts a caller's flow over one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The player's current mode does not permit the operation.
    NotInLobby,
    /// Still cooling down; remaining time attached.
    OnCooldown(Duration),
    NotInTeam,
    AlreadyInTeam,
    /// Target player is already on a (possibly different) team.
    TargetInTeam,
    StartersNotSelected,
    AdmissionDisabled,
    TeamNameTaken(String),
    TeamFull,
    NoInvite,
    NotLeader,
    CannotInviteSelf,
    CannotLeaveMidRun,
    /// The team already has a live run bound.
    RunInProgress,
    NotInRun,
    PlayerNotFound,
    TeamNotFound,
    RunNotFound,
    /// No world is configured to host a run.
    NoWorldAvailable,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotInLobby => write!(f, "not in the lobby"),
            Self::OnCooldown(rem) => write!(f, "on cooldown for {}s", rem.as_secs()),
            Self::NotInTeam => write!(f, "not in a team"),
            Self::AlreadyInTeam => write!(f, "already in a team"),
            Self::TargetInTeam => write!(f, "target player is already in a team"),
            Self::StartersNotSelected => write!(f, "starter equipment not selected"),
            Self::AdmissionDisabled => write!(f, "admission is currently disabled"),
            Self::TeamNameTaken(name) => write!(f, "team name `{name}` is taken"),
            Self::TeamFull => write!(f, "team is full"),
            Self::NoInvite => write!(f, "no pending invite"),
            Self::NotLeader => write!(f, "only the team leader can do that"),
            Self::CannotInviteSelf => write!(f, "cannot invite yourself"),
            Self::CannotLeaveMidRun => write!(f, "cannot leave a team mid-run"),
            Self::RunInProgress => write!(f, "a run is already in progress"),
            Self::NotInRun => write!(f, "not in a run"),
            Self::PlayerNotFound => write!(f, "player not found"),
            Self::TeamNotFound => write!(f, "team not found"),
            Self::RunNotFound => write!(f, "run not found"),
            Self::NoWorldAvailable => write!(f, "no world configured for runs"),
        }
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::PlayerNotFound | Self::TeamNotFound | Self::RunNotFound => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_REQUEST,
        };
        let message = self.to_string();
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
