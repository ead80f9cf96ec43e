//! Argus binary.
//!
//! Wires the capture pipeline together and runs the HTTP API:
//! source registry, event store, file persistence, optional remote
//! collector polling, and the axum server on top.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use argus_capture::{CaptureCoordinator, RemotePoller};
use argus_core::SourceRegistry;
use argus_server::{AppState, Server, ServerConfig};
use argus_storage::{EventStore, FilePersistence, NullPersistence, Persistence};
use clap::Parser;
use directories::ProjectDirs;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// How often captured events are flushed to disk.
const AUTOSAVE_INTERVAL_SECS: u64 = 60;

/// Argus - capture, inspect, and export analytics traffic
#[derive(Parser, Debug)]
#[command(name = "argus", version, about)]
struct Args {
    /// Host for the API server
    #[arg(long, default_value = argus_server::DEFAULT_HOST)]
    host: String,

    /// Port for the API server
    #[arg(long, default_value_t = argus_server::DEFAULT_PORT)]
    port: u16,

    /// Directory for the sources, events, and settings files
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Keep everything in memory and never touch disk
    #[arg(long)]
    no_persist: bool,

    /// Base URL of a remote collector to poll for events
    #[arg(long)]
    poll_url: Option<String>,

    /// Poll interval in seconds
    #[arg(long, default_value_t = 2)]
    poll_interval: u64,

    /// Override the event store capacity
    #[arg(long)]
    capacity: Option<usize>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Get the logs directory path.
fn logs_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "argus", "Argus").map(|dirs| dirs.data_dir().join("logs"))
}

/// Initialize logging with daily file rotation next to the console output.
fn init_logging(args: &Args) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_level = if args.debug { "debug" } else { &args.log_level };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("argus={},warn", log_level)));

    if let Some(log_dir) = logs_dir() {
        if std::fs::create_dir_all(&log_dir).is_ok() {
            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .max_log_files(5)
                .filename_prefix("argus")
                .filename_suffix("log")
                .build(&log_dir)
                .ok();

            if let Some(appender) = file_appender {
                let (non_blocking, guard) = tracing_appender::non_blocking(appender);

                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().with_writer(std::io::stdout))
                    .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                    .init();

                tracing::info!("Logging to {:?}", log_dir);
                return Some(guard);
            }
        }
    }

    // Fall back to console-only logging
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::warn!("File logging unavailable, using console only");
    None
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging (keep guard alive for the duration of the program)
    let _log_guard = init_logging(&args);

    tracing::info!("Starting Argus...");
    tracing::info!("Args: {:?}", args);

    let persistence: Arc<dyn Persistence> = if args.no_persist {
        tracing::info!("Persistence disabled, events and sources are in-memory only");
        Arc::new(NullPersistence)
    } else {
        let persistence = match &args.data_dir {
            Some(dir) => FilePersistence::with_dir(dir),
            None => FilePersistence::new(),
        }
        .map_err(|e| anyhow::anyhow!("Persistence error: {}", e))?;
        Arc::new(persistence)
    };

    // Wire up the capture pipeline
    let registry = Arc::new(SourceRegistry::with_defaults());
    let store = Arc::new(EventStore::new());
    let coordinator = Arc::new(CaptureCoordinator::new(registry, store, persistence));

    // Restore saved sources, settings, and events
    coordinator.load();

    // A capacity given on the command line wins over the saved settings
    if let Some(capacity) = args.capacity {
        let mut settings = coordinator.settings();
        settings.max_events = capacity;
        coordinator.update_settings(settings);
    }

    coordinator.start_autosave(Duration::from_secs(AUTOSAVE_INTERVAL_SECS));

    // Start polling a remote collector when one is configured
    let mut state = AppState::new(Arc::clone(&coordinator));
    if let Some(ref url) = args.poll_url {
        let poller = RemotePoller::new(Arc::clone(&coordinator), url.clone())
            .map_err(|e| anyhow::anyhow!("Poller error: {}", e))?
            .with_interval(Duration::from_secs(args.poll_interval));
        let poller = Arc::new(poller);
        Arc::clone(&poller).start();
        state = state.with_poller(poller);
    }

    let config = ServerConfig::default()
        .with_host(args.host.clone())
        .with_port(args.port);
    let server =
        Server::with_state(config, state).map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    tracing::info!("API server listening on http://{}", server.addr());
    server.run().await.map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    tracing::info!("Argus shutting down");
    Ok(())
}
