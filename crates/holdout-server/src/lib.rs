pub mod admission;
pub mod api;
pub mod config;
pub mod connection;
pub mod error;
pub mod notify;
pub mod party;
pub mod ready;
pub mod reconciler;
pub mod registry;
pub mod runs;
pub mod state;

use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;

use config::ServerConfig;
use state::AppState;

/// Build the Axum router and application state from a config.
pub fn build_app(config: ServerConfig) -> (Router<()>, AppState) {
    let state = AppState::new(config);

    let api_routes = Router::new()
        .route("/status", axum::routing::get(api::get_status))
        .route("/runs", axum::routing::get(api::list_runs))
        .route(
            "/runs/{run_id}/end",
            axum::routing::post(api::force_end_run),
        )
        .route("/admission", axum::routing::put(api::set_admission));

    let app = Router::new()
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    (app, state)
}

/// Spawn the background sweeps for an AppState. Returns the task handles
/// so a host can abort them on shutdown.
pub fn spawn_background_tasks(state: &AppState) -> Vec<tokio::task::JoinHandle<()>> {
    use std::time::Duration;

    let sweeps = &state.config.sweeps;
    vec![
        reconciler::spawn_disconnect_reconciler(
            Arc::clone(&state.disconnect_reconciler),
            Duration::from_secs(sweeps.disconnect_interval_secs),
        ),
        reconciler::spawn_cooldown_reconciler(
            Arc::clone(&state.cooldown_reconciler),
            Duration::from_secs(sweeps.cooldown_interval_secs),
        ),
        reconciler::spawn_countdown_poller(
            Arc::clone(&state.ready),
            Arc::clone(&state.runs),
            Duration::from_millis(sweeps.countdown_poll_millis),
        ),
        reconciler::spawn_admission_sweep(
            Arc::clone(&state.admission),
            Duration::from_secs(sweeps.cooldown_interval_secs),
        ),
    ]
}
