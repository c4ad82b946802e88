//! Chat relay server
//!
//! Serves the WebSocket chat endpoint and the history API on one listener,
//! persisting messages and connection events through the SQLite store.

use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use chat_relay::config::Config;
use chat_relay::hub::Hub;
use chat_relay::server::{self, AppState};
use chat_relay::store::SqliteStore;

/// Chat relay server
#[derive(Parser, Debug)]
#[command(name = "chat-relay")]
#[command(version, about, long_about = None)]
struct Args {
    /// Port to listen on (overrides PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Bind address (overrides BIND)
    #[arg(long)]
    bind: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    info!("chat-relay v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::from_env();
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(bind) = args.bind {
        config.bind = bind;
    }

    // The store is the only fatal dependency; without it the process exits.
    let store = Arc::new(SqliteStore::open(&config.db_connection).await?);

    let (hub, hub_task) = Hub::channel(store.clone());
    let hub_loop = tokio::spawn(hub_task.run());

    let addr = config.socket_addr();
    let state = AppState {
        config: Arc::new(config),
        hub: hub.clone(),
        store,
    };
    let app = server::router(state);

    let listener = TcpListener::bind(&addr).await?;
    info!("server listening on http://{addr} (chat at ws://{addr}/ws)");

    // The hub must stop first: closing its members unblocks the live
    // sockets so the graceful shutdown below can finish.
    let shutdown_hub = hub.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("initiating graceful shutdown...");
            shutdown_hub.shutdown();
        })
        .await?;

    hub.shutdown();
    hub_loop.await?;

    info!("server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }
}
