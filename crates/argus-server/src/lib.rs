//! Argus Server - HTTP API server.
//!
//! This crate provides the HTTP API for the Argus capture pipeline.
//!
//! ## Endpoints
//!
//! - `POST /api/capture` - Run an observed request through the pipeline
//! - `GET /api/events` - List stored events with filters
//! - `POST /api/events` - Ingest externally collected events
//! - `DELETE /api/events` - Clear stored and persisted events
//! - `GET /api/export/{json,csv}` - Download filtered events
//! - `GET/POST /api/sources` - Manage capture sources
//! - `GET/PUT /api/settings` - Capture settings
//!
//! ## Example
//!
//! ```no_run
//! use argus_server::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = Server::new(ServerConfig::default()).unwrap();
//!     server.run().await.unwrap();
//! }
//! ```

pub mod error;
mod handlers;
pub mod models;
pub mod state;

use std::net::SocketAddr;

use axum::routing::{delete, get, post, put};
use axum::Router;
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

pub use error::{ApiError, Result};
pub use state::AppState;

/// Default server port.
pub const DEFAULT_PORT: u16 = 48123;

/// Default server host (localhost only).
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to (default: 127.0.0.1).
    pub host: String,
    /// Port to bind to (default: 48123).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl ServerConfig {
    /// Sets the host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

/// Server error types.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to address.
    #[error("failed to bind to {0}: {1}")]
    BindError(SocketAddr, std::io::Error),

    /// Server runtime error.
    #[error("server error: {0}")]
    Runtime(String),
}

/// Builds the API router around shared state.
pub fn router(state: AppState) -> Router {
    // CORS is wide open so browser extensions and local dashboards can
    // talk to the API directly.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/capture", post(handlers::capture))
        .route("/api/events", get(handlers::get_events))
        .route("/api/events", post(handlers::ingest_events))
        .route("/api/events", delete(handlers::clear_events))
        .route("/api/events/save", post(handlers::save_events))
        .route("/api/events/load", post(handlers::load_events))
        .route("/api/events/{id}", get(handlers::get_event))
        .route("/api/stats", get(handlers::get_stats))
        .route("/api/size", get(handlers::get_size))
        .route("/api/export/json", get(handlers::export_json))
        .route("/api/export/csv", get(handlers::export_csv))
        .route("/api/sources", get(handlers::get_sources))
        .route("/api/sources", post(handlers::create_source))
        .route("/api/sources/export", get(handlers::export_sources))
        .route("/api/sources/import", post(handlers::import_sources))
        .route("/api/sources/reset", post(handlers::reset_sources))
        .route("/api/sources/sample", post(handlers::create_from_sample))
        .route("/api/sources/stats", get(handlers::get_source_stats))
        .route("/api/sources/{id}", get(handlers::get_source))
        .route("/api/sources/{id}", put(handlers::update_source))
        .route("/api/sources/{id}", delete(handlers::delete_source))
        .route("/api/settings", get(handlers::get_settings))
        .route("/api/settings", put(handlers::update_settings))
        .layer(cors)
        .with_state(state)
}

/// The HTTP API server.
pub struct Server {
    router: Router,
    addr: SocketAddr,
}

impl Server {
    /// Creates a server with self-contained in-memory state.
    pub fn new(config: ServerConfig) -> std::result::Result<Self, ServerError> {
        Self::with_state(config, AppState::in_memory())
    }

    /// Creates a server with custom application state.
    pub fn with_state(
        config: ServerConfig,
        state: AppState,
    ) -> std::result::Result<Self, ServerError> {
        let addr = format!("{}:{}", config.host, config.port)
            .parse()
            .map_err(|e| ServerError::Runtime(format!("invalid address: {}", e)))?;

        Ok(Self {
            router: router(state),
            addr,
        })
    }

    /// Returns the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Runs the server until shutdown.
    pub async fn run(self) -> std::result::Result<(), ServerError> {
        info!("Starting Argus API server on {}", self.addr);

        // Create socket with SO_REUSEADDR to allow binding even when sockets are lingering
        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| ServerError::BindError(self.addr, e))?;

        // Allow address reuse (helps with TIME_WAIT/CLOSE_WAIT sockets)
        socket
            .set_reuse_address(true)
            .map_err(|e| ServerError::BindError(self.addr, e))?;

        // Bind and listen
        socket
            .bind(&self.addr.into())
            .map_err(|e| ServerError::BindError(self.addr, e))?;
        socket
            .listen(128)
            .map_err(|e| ServerError::BindError(self.addr, e))?;

        // Set non-blocking for tokio
        socket
            .set_nonblocking(true)
            .map_err(|e| ServerError::BindError(self.addr, e))?;

        // Convert to tokio TcpListener
        let std_listener: std::net::TcpListener = socket.into();
        let listener = tokio::net::TcpListener::from_std(std_listener)
            .map_err(|e| ServerError::BindError(self.addr, e))?;

        axum::serve(listener, self.router)
            .await
            .map_err(|e| ServerError::Runtime(e.to_string()))?;

        Ok(())
    }

    /// Returns the router for testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}
