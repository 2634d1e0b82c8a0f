//! Server execution logic.

use std::{net::SocketAddr, sync::Arc};

use axum::{
    Router,
    routing::{get, post},
};
use clinic_chat_shared::time::{Clock, SystemClock};
use tokio::{net::TcpListener, task::JoinHandle};
use tower_http::trace::TraceLayer;

use crate::{
    domain::Clinic,
    handler::{
        health_check, hub_handler, list_messages, mark_read, secretary_inbox, send_message,
        set_availability, start_chat, unread_summary,
    },
    state::AppState,
};

/// Stub clinic backend
///
/// # Example
///
/// ```ignore
/// let running = StubServer::seeded().spawn("127.0.0.1:0").await?;
/// let config = SyncConfig::for_api_url(&running.api_url())?;
/// ```
pub struct StubServer {
    state: Arc<AppState>,
}

impl StubServer {
    pub fn new(clinic: Clinic, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(AppState::new(clinic, clock)),
        }
    }

    /// Demo data on the system clock
    pub fn seeded() -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self::new(Clinic::seeded(clock.now()), clock)
    }

    pub fn state(&self) -> Arc<AppState> {
        self.state.clone()
    }

    pub fn router(&self) -> Router {
        Router::new()
            // REST エンドポイント
            .route("/api/health", get(health_check))
            .route("/api/chat/start", post(start_chat))
            .route(
                "/api/chat/conversations/{id}/messages",
                get(list_messages).post(send_message),
            )
            .route("/api/chat/conversations/{id}/read", post(mark_read))
            .route("/api/chat/unread", get(unread_summary))
            .route("/api/chat/secretary/inbox", get(secretary_inbox))
            .route("/api/chat/secretary/availability", post(set_availability))
            // プッシュハブ
            .route("/hubs/chat", get(hub_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Bind and serve in the background
    pub async fn spawn(self, bind_addr: &str) -> std::io::Result<RunningServer> {
        let listener = TcpListener::bind(bind_addr).await?;
        let addr = listener.local_addr()?;
        let app = self.router();
        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("Stub server error: {}", e);
            }
        });
        tracing::info!("Stub server listening on {}", addr);
        Ok(RunningServer {
            addr,
            state: self.state,
            task,
        })
    }

    /// Serve until Ctrl+C
    pub async fn run(self, host: &str, port: u16) -> Result<(), Box<dyn std::error::Error>> {
        let bind_addr = format!("{}:{}", host, port);
        let listener = TcpListener::bind(&bind_addr).await?;

        tracing::info!("Stub server listening on {}", listener.local_addr()?);
        tracing::info!("REST base: http://{}/api", bind_addr);
        tracing::info!("Push hub:  ws://{}/hubs/chat", bind_addr);
        tracing::info!("Press Ctrl+C to shutdown gracefully");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

/// A stub server serving on a background task; aborted on drop
pub struct RunningServer {
    addr: SocketAddr,
    state: Arc<AppState>,
    task: JoinHandle<()>,
}

impl RunningServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn api_url(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    pub fn hub_url(&self) -> String {
        format!("ws://{}/hubs/chat", self.addr)
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
    }
}
