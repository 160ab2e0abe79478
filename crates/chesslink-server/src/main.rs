//! chesslink-server: mentor/student chess session server.
//!
//! Accepts WebSocket connections, pairs a mentor and a student into a shared
//! session, keeps the authoritative board for that session and relays
//! cosmetic UI events between the two participants.

mod config;
mod connections;
mod coordinator;
mod dispatch;
mod relay;
mod server;
mod session;
mod transport;

use clap::Parser;
use config::{CliOverrides, ServerConfig};
use server::ChessLinkServer;
use session::MatchPolicy;
use std::path::PathBuf;
use tracing::{error, info, warn};

/// chesslink-server: mentor/student chess session server
#[derive(Parser, Debug)]
#[command(name = "chesslink-server", version, about = "Mentor/student chess session server")]
struct Cli {
    /// Listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Listen address
    #[arg(long)]
    host: Option<String>,

    /// Config file path
    #[arg(long, default_value = "~/.chesslink/config.toml")]
    config: String,

    /// Maximum concurrent sessions
    #[arg(long)]
    max_sessions: Option<usize>,

    /// Idle timeout in seconds before a session is collected
    #[arg(long)]
    idle_timeout: Option<u64>,

    /// How `newgame` matches an existing pairing (either, both)
    #[arg(long)]
    match_policy: Option<MatchPolicy>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    use tracing_subscriber::EnvFilter;
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "starting chesslink-server");

    // Load server config (file + CLI overrides)
    let config_path = PathBuf::from(&cli.config);
    let overrides = CliOverrides {
        host: cli.host,
        port: cli.port,
        max_sessions: cli.max_sessions,
        idle_timeout: cli.idle_timeout,
        match_policy: cli.match_policy,
    };
    let server_config = match ServerConfig::load(Some(&config_path), overrides) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = format!("{e:#}"), "failed to load config");
            std::process::exit(1);
        }
    };

    let server = ChessLinkServer::new(server_config);
    let shutdown = server.shutdown_handle();
    let mut run = tokio::spawn(server.run());

    // Run until shutdown signal
    tokio::select! {
        result = &mut run => {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(error = %e, "server error");
                    std::process::exit(1);
                }
                Err(e) => {
                    error!(error = %e, "server task failed");
                    std::process::exit(1);
                }
            }
        }
        _ = shutdown_signal() => {
            info!("received shutdown signal");
            let _ = shutdown.send(());
            if let Err(e) = run.await {
                warn!(error = %e, "server task failed during shutdown");
            }
        }
    }

    info!("chesslink-server stopped");
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                ctrl_c.await.ok();
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
