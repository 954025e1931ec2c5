use std::net::SocketAddr;

use holdout_server::config::ServerConfig;
use holdout_server::state::AppState;
use holdout_server::build_app;

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    _server: tokio::task::JoinHandle<()>,
}

impl TestServer {
    /// Start a test server on an ephemeral port.
    pub async fn new() -> Self {
        Self::from_config(ServerConfig::default()).await
    }

    pub async fn from_config(config: ServerConfig) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (app, state) = build_app(config);
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self {
            addr,
            state,
            _server: server,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }
}
