use tracing_subscriber::EnvFilter;

use holdout_server::config::ServerConfig;
use holdout_server::{build_app, spawn_background_tasks};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = ServerConfig::load();
    config.validate();

    let listen_addr = config.listen_addr.clone();
    let (app, state) = build_app(config);
    let _tasks = spawn_background_tasks(&state);

    tracing::info!(addr = %listen_addr, "Holdout server starting");

    let listener = match tokio::net::TcpListener::bind(&listen_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %listen_addr, error = %e, "Failed to bind");
            std::process::exit(1);
        },
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
