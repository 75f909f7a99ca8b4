//! Chat Server - Main Entry Point
//!
//! Accepts client calls, runs the public room and brokers private chats.

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use callback_chat::{ChatCoordinator, ChatServer, LivenessMonitor, ServerConfig, TcpConnector};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "chat-server")]
#[command(about = "Chat Server - public room and brokered private chats")]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/server.toml")]
    config: PathBuf,

    /// Override host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Override listening port
    #[arg(short, long)]
    port: Option<u16>,

    /// Override liveness probe interval in milliseconds
    #[arg(long)]
    liveness_interval_ms: Option<u64>,

    /// Log level
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config_missing = !args.config.exists();
    let mut config = if config_missing {
        ServerConfig::default()
    } else {
        ServerConfig::from_file(&args.config.to_string_lossy())?
    };
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(interval) = args.liveness_interval_ms {
        config.liveness_interval_ms = interval;
    }
    config.validate()?;

    // Initialize logging
    let log_level = args.log_level.unwrap_or_else(|| config.log_level.clone());
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&log_level)).init();
    if config_missing {
        info!("Config file {} not found, using defaults", args.config.display());
    }

    let connector = Arc::new(TcpConnector::new(config.call_timeout()));
    let coordinator = Arc::new(ChatCoordinator::new(connector));

    // Bind listener; failing here is the only fatal error
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let server = ChatServer::bind(addr, coordinator.clone())
        .await
        .with_context(|| format!("cannot bind chat server to {}", addr))?;
    info!("Chat server listening on {}", server.local_addr()?);

    let monitor = LivenessMonitor::new(coordinator, config.liveness_interval()).spawn();

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to install ctrl-c handler: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    monitor.shutdown().await;
    info!("Chat server stopped");
    Ok(())
}
