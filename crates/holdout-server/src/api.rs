use std::time::Instant;

use axum::Json;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use holdout_core::run::RunStatus;

use crate::error::Rejection;
use crate::state::AppState;

/// Aggregate counts for admin/status reporting.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub players: usize,
    pub teams: usize,
    pub active_runs: usize,
    pub players_in_run: usize,
    pub admission_enabled: bool,
    pub pending_ejects: usize,
}

pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        players: state.registry.player_count(),
        teams: state.registry.team_count(),
        active_runs: state.registry.active_run_count(),
        players_in_run: state.registry.players_in_run_count(),
        admission_enabled: state.admission.is_enabled(),
        pending_ejects: state.admission.pending_eject_count(),
    })
}

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub id: Uuid,
    pub world: String,
    pub status: RunStatus,
    pub participants: usize,
    pub alive: usize,
    pub wave: u32,
    pub kills: u64,
    pub elapsed_secs: u64,
}

pub async fn list_runs(State(state): State<AppState>) -> Json<Vec<RunSummary>> {
    let now = Instant::now();
    let summaries = state
        .registry
        .all_teams()
        .iter()
        .filter_map(|team| {
            let team_id = team.lock().unwrap().id();
            state.registry.team_run(team_id)
        })
        .map(|run| {
            let run = run.lock().unwrap();
            RunSummary {
                id: run.id(),
                world: run.world().to_string(),
                status: run.status(),
                participants: run.participant_count(),
                alive: run.alive_count(),
                wave: run.wave(),
                kills: run.total_kills(),
                elapsed_secs: run.elapsed(now).as_secs(),
            }
        })
        .collect();
    Json(summaries)
}

#[derive(Debug, Deserialize)]
pub struct AdmissionRequest {
    pub enabled: bool,
}

/// Toggle the global admission switch. Disabling starts the grace-eject
/// window for everyone currently in a run.
pub async fn set_admission(
    State(state): State<AppState>,
    Json(req): Json<AdmissionRequest>,
) -> Json<serde_json::Value> {
    if req.enabled {
        state.admission.enable();
    } else {
        state.admission.disable(Instant::now());
    }
    Json(serde_json::json!({ "admission_enabled": state.admission.is_enabled() }))
}

/// Admin force-end for a stuck or abandoned run.
pub async fn force_end_run(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, Rejection> {
    if state.registry.run(run_id).is_none() {
        return Err(Rejection::RunNotFound);
    }
    state
        .runs
        .end_run(run_id, crate::runs::EndReason::Forced, Instant::now());
    Ok(Json(serde_json::json!({ "ended": run_id })))
}
