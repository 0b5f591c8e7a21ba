//! Axum server exposing the sync hub over WebSocket and REST.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{ws::WebSocketUpgrade, State},
    http::{header, Method},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::routes::api::api_routes;
use super::state::WebAppState;
use super::ws::handle_websocket;
use crate::sync::SyncHub;

/// Server configuration options.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on (0 picks a free port).
    pub port: u16,
    /// Path of the WebSocket endpoint.
    pub ws_path: String,
    /// Enable CORS for development (allows any origin).
    pub cors_permissive: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9322,
            ws_path: "/ws".to_string(),
            cors_permissive: true,
        }
    }
}

/// Health check response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    observers: usize,
}

/// Health check endpoint handler.
async fn health(State(state): State<WebAppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        observers: state.hub().observer_count(),
    })
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<WebAppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        handle_websocket(socket, state.hub().clone(), state.shutdown_token()).await
    })
}

/// Build the Axum router with all routes.
pub fn build_router(state: WebAppState, config: &ServerConfig) -> Router {
    // Build CORS layer
    let cors = if config.cors_permissive {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE])
    } else {
        CorsLayer::new()
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE])
    };

    let core_routes = Router::new().route("/health", get(health));

    Router::new()
        .nest("/api", core_routes.merge(api_routes()))
        .route(&config.ws_path, get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

struct RunningServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<std::io::Result<()>>,
}

/// Sync server with an explicit start/stop lifecycle.
///
/// `start` also starts the hub's background loops and `stop` stops them.
pub struct SyncServer {
    config: ServerConfig,
    hub: Arc<SyncHub>,
    running: Option<RunningServer>,
}

impl SyncServer {
    pub fn new(hub: Arc<SyncHub>, config: ServerConfig) -> Self {
        Self {
            config,
            hub,
            running: None,
        }
    }

    pub fn hub(&self) -> &Arc<SyncHub> {
        &self.hub
    }

    /// Bound address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.addr)
    }

    /// WebSocket URL of the running server.
    pub fn ws_url(&self) -> Option<String> {
        self.local_addr()
            .map(|addr| format!("ws://{}{}", addr, self.config.ws_path))
    }

    /// Binds and serves in the background. Returns the bound address.
    pub async fn start(&mut self) -> anyhow::Result<SocketAddr> {
        if let Some(running) = &self.running {
            return Ok(running.addr);
        }

        let bind = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&bind)
            .await
            .with_context(|| format!("failed to bind {bind}"))?;
        let addr = listener.local_addr()?;

        let shutdown = CancellationToken::new();
        let state = WebAppState::new(self.hub.clone(), shutdown.clone());
        let app = build_router(state, &self.config);

        self.hub.start();
        let signal = shutdown.clone().cancelled_owned();
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(signal)
                .await
        });

        tracing::info!("Sync server listening at ws://{}{}", addr, self.config.ws_path);
        self.running = Some(RunningServer {
            addr,
            shutdown,
            task,
        });
        Ok(addr)
    }

    /// Closes open sockets, waits for the server task, then stops the hub.
    pub async fn stop(&mut self) -> anyhow::Result<()> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };
        running.shutdown.cancel();
        running.task.await.context("server task panicked")??;
        self.hub.stop().await;
        tracing::info!(addr = %running.addr, "Sync server stopped");
        Ok(())
    }

    /// Serve until Ctrl-C, then stop.
    pub async fn run_until_ctrl_c(&mut self) -> anyhow::Result<()> {
        self.start().await?;
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for Ctrl-C")?;
        tracing::info!("Ctrl-C received, shutting down");
        self.stop().await
    }
}
