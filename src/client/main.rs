//! Chat Client - Interactive Shell
//!
//! Starts the client's own endpoint, registers it with the server and runs a
//! line-based shell. Private chats bypass the server once set up.

use anyhow::{anyhow, Result};
use clap::Parser;
use log::{error, info, warn};
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};

use callback_chat::commands::{self, Command, HELP};
use callback_chat::endpoint::{EndpointState, LocalEndpoint};
use callback_chat::proxy::ServerProxy;
use callback_chat::ClientConfig;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "chat-client")]
#[command(about = "Chat Client - Interactive shell")]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/client.toml")]
    config: PathBuf,

    /// Username
    #[arg(short, long)]
    username: Option<String>,

    /// Server host
    #[arg(long)]
    host: Option<String>,

    /// Server port
    #[arg(short, long)]
    port: Option<u16>,

    /// Address other parties use to reach this client
    #[arg(long)]
    local_host: Option<String>,

    /// Port of this client's endpoint
    #[arg(long)]
    local_port: Option<u16>,

    /// Log level
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = if args.config.exists() {
        ClientConfig::from_file(&args.config.to_string_lossy())?
    } else {
        ClientConfig::default()
    };
    if let Some(host) = args.host {
        config.server_host = host;
    }
    if let Some(port) = args.port {
        config.server_port = port;
    }
    if let Some(host) = args.local_host {
        config.local_host = host;
    }
    if let Some(port) = args.local_port {
        config.local_port = port;
    }
    config.validate()?;
    let username = args
        .username
        .unwrap_or_else(|| config.default_username.clone());

    // Initialize logging
    let log_level = args.log_level.unwrap_or_else(|| config.log_level.clone());
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&log_level)).init();

    // Start the local endpoint first so the server can call back
    let local: SocketAddr = format!("{}:{}", config.local_host, config.local_port).parse()?;
    let (endpoint, mut inbox) = LocalEndpoint::bind(local, &username, config.call_timeout())
        .await
        .map_err(|e| anyhow!("cannot start local endpoint on {}: {}", local, e))?;
    let session = endpoint.state();
    let endpoint_task = tokio::spawn(endpoint.run_until(std::future::pending()));
    info!("Local endpoint listening on {}", local);

    let proxy = Arc::new(
        ServerProxy::connect(config.server_address(), username.clone(), config.call_timeout())
            .await
            .map_err(|e| anyhow!("cannot reach server {}: {}", config.server_address(), e))?,
    );
    if let Err(e) = proxy.register(config.local_address()).await {
        endpoint_task.abort();
        return Err(anyhow!("registration failed: {}", e));
    }

    println!("Chat Client");
    println!("===========");
    println!("Username: {}", username);
    println!("Server:   {}", config.server_address());
    println!();
    println!("{}", HELP);
    prompt();

    // Spawn task to read user input
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<String>();
    let input_task = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if cmd_tx.send(line).is_err() {
                break;
            }
        }
    });

    // Spawn task to watch the server
    let (lost_tx, mut lost_rx) = oneshot::channel::<()>();
    let watch_task = tokio::spawn(watch_server(proxy.clone(), config.clone(), lost_tx));

    loop {
        tokio::select! {
            line = cmd_rx.recv() => {
                let Some(line) = line else { break };
                if !run_command(commands::parse(&line), &proxy, &session).await {
                    break;
                }
                prompt();
            }
            Some(line) = inbox.recv() => {
                println!("{}", line);
                prompt();
            }
            _ = &mut lost_rx => {
                println!("Server unreachable for {}s, exiting", config.server_grace_secs);
                break;
            }
        }
    }

    watch_task.abort();
    input_task.abort();
    session.leave_private(true).await;
    if let Err(e) = proxy.exit().await {
        warn!("Could not tell the server we are leaving: {}", e);
    }
    proxy.close().await;
    endpoint_task.abort();
    println!("Goodbye!");
    Ok(())
}

/// Returns `false` when the shell should stop.
async fn run_command(command: Command, proxy: &ServerProxy, session: &EndpointState) -> bool {
    match command {
        Command::Empty => {}
        Command::Help => println!("{}", HELP),
        Command::Exit => return false,
        Command::List => match proxy.client_list().await {
            Ok(users) => println!("Connected clients: {}", users.join(", ")),
            Err(e) => println!("Error: {}", e),
        },
        Command::Join { target } => {
            if let Some(peer) = session.private_peer() {
                println!("You are in a private chat with {}. Type `leave` first", peer);
            } else {
                match proxy.join(&target).await {
                    Ok(status) => println!("{}", status),
                    Err(e) => println!("Error: {}", e),
                }
            }
        }
        Command::Accept { initiator } => match proxy.accept_private(&initiator).await {
            Ok(()) => println!("Private chat with {} accepted", initiator),
            Err(e) => println!("Error: {}", e),
        },
        Command::Send { message } => {
            if session.private_peer().is_some() {
                match session.send_private(&message).await {
                    Ok(line) => println!("{}", line),
                    Err(e) => println!("Error: private peer unreachable ({})", e),
                }
            } else {
                match proxy.send_message(&message).await {
                    Ok(line) => println!("{}", line),
                    Err(e) => println!("{}", e),
                }
            }
        }
        Command::Leave => {
            if session.private_peer().is_some() {
                session.leave_private(true).await;
            } else {
                match proxy.leave().await {
                    Ok(()) => println!("You left the Public chat room"),
                    Err(e) => println!("Error: {}", e),
                }
            }
        }
        Command::Unknown { input } => {
            println!("Unknown command: {}. Type 'help' for available commands.", input)
        }
        Command::InvalidArgs { usage, .. } => println!("{}", usage),
    }
    true
}

/// Ping the server; signal `lost` once it has not answered for the grace
/// period.
async fn watch_server(proxy: Arc<ServerProxy>, config: ClientConfig, lost: oneshot::Sender<()>) {
    let mut ticker = tokio::time::interval(config.server_watch_interval());
    let mut last_seen = Instant::now();
    loop {
        ticker.tick().await;
        match proxy.is_alive().await {
            Ok(()) => last_seen = Instant::now(),
            Err(e) => {
                warn!("Server did not answer: {}", e);
                if last_seen.elapsed() >= config.server_grace() {
                    error!("Server lost");
                    let _ = lost.send(());
                    return;
                }
            }
        }
    }
}

fn prompt() {
    print!("> ");
    let _ = io::stdout().flush();
}
