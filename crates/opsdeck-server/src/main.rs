//! opsdeck-server: web console server for the helper toolkit.
//!
//! Launches interactive toolkit scripts in PTY-backed sessions and relays
//! their terminals to browser clients over WebSocket.

mod catalog;
mod config;
mod root;
mod server;

use catalog::BuiltinCatalog;
use clap::Parser;
use config::ServerConfig;
use opsdeck_core::SessionHost;
use server::DeckServer;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

/// opsdeck-server, the toolkit web console
#[derive(Parser, Debug)]
#[command(name = "opsdeck-server", version, about = "Toolkit web console server")]
struct Cli {
    /// Listen port (overrides config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Allow network access (bind 0.0.0.0 instead of localhost)
    #[arg(short = 'n', long)]
    network: bool,

    /// Toolkit root directory (contains modules/)
    #[arg(long)]
    root: Option<PathBuf>,

    /// Config file path
    #[arg(long, default_value = "~/.opsdeck/config.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    use tracing_subscriber::EnvFilter;
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "starting opsdeck-server");

    let root_dir = root::resolve_root(cli.root);
    info!(root = %root_dir.display(), "resolved toolkit root directory");

    let server_config = match ServerConfig::load(Some(Path::new(&cli.config)), cli.port, cli.network)
    {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    let addr: SocketAddr = match format!("{}:{}", server_config.host, server_config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!(host = %server_config.host, port = server_config.port, error = %e, "invalid listen address");
            std::process::exit(1);
        }
    };

    let host = Arc::new(SessionHost::new(Arc::new(BuiltinCatalog::new()), root_dir));
    let deck_server = DeckServer::new(host.clone());
    let client_shutdown = deck_server.shutdown_token();

    info!(addr = %addr, "opsdeck-server listening");

    tokio::select! {
        result = deck_server.run(addr) => {
            if let Err(e) = result {
                error!(error = %e, "server error");
                std::process::exit(1);
            }
        }
        _ = client_shutdown.cancelled() => {
            info!("shutdown requested by client, all sessions already stopped");
        }
        _ = shutdown_signal() => {
            info!("received shutdown signal, stopping sessions");
            host.shutdown_all(true).await;
        }
    }

    info!("opsdeck-server stopped");
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                ctrl_c.await.ok();
                return;
            }
        };
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
