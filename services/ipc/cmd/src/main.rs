//! IPC harness binary for the gameenv simulation.
//!
//! Runs either end of the messaging layer on its own: `serve` stands in
//! for the simulation process and answers the controller protocol,
//! `drive` stands in for an external controller and exercises a running
//! server. Both are useful for soak-testing the session layer without
//! the game attached.

use anyhow::Result;
use clap::{Parser, Subcommand};
use ipc_session::{Client, ClientConfig, IpcError, Message, Server, ServerConfig};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod logging;

use config::HarnessConfig;
use logging::GameLogFormatter;

/// Message types of the controller protocol.
///
/// The session layer only reserves type 0 and the negative pseudo-types;
/// this closed enumeration is the application contract on top of it.
mod msg {
    pub const PING: i32 = 11;
    pub const PONG: i32 = 12;
    pub const RESET: i32 = 13;
    pub const RESET_DONE: i32 = 14;
    pub const CONTROL_REQUEST: i32 = 16;
    pub const CONTROL_GRANTED: i32 = 17;
    pub const OBSERVATION_REQUEST: i32 = 18;
    pub const OBSERVATION: i32 = 19;
    pub const ACTION: i32 = 20;
    pub const ACTION_RESULT: i32 = 21;
}

/// IPC harness for the gameenv simulation
#[derive(Parser, Debug)]
#[command(name = "gameenv-ipc", version, about = "gameenv IPC harness")]
struct Args {
    /// Path to a YAML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Session name (overrides config)
    #[arg(long)]
    name: Option<String>,

    /// TCP port; 0 selects the platform default transport (overrides config)
    #[arg(long)]
    port: Option<u16>,

    /// Connection budget, e.g. 30s; 0s waits forever (overrides config)
    #[arg(long)]
    timeout: Option<humantime::Duration>,

    /// Client re-dial spacing, e.g. 200ms (overrides config)
    #[arg(long)]
    retry_interval: Option<humantime::Duration>,

    /// Payload bound in bytes (overrides config)
    #[arg(long)]
    max_msg_size: Option<usize>,

    /// Encrypt traffic (overrides config)
    #[arg(long)]
    encryption: Option<bool>,

    /// Relax Unix socket permissions (serve only, overrides config)
    #[arg(long)]
    unmask_permissions: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    role: RoleCommand,
}

#[derive(Subcommand, Debug)]
enum RoleCommand {
    /// Stand in for the simulation: serve one controller at a time
    Serve,
    /// Stand in for a controller: drive a running server
    Drive {
        /// Number of actions to issue before closing; 0 runs until the
        /// session ends
        #[arg(long, default_value = "0")]
        actions: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level.clone()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .event_format(GameLogFormatter::new("gameenv-ipc"))
        .init();

    let mut config = match &args.config {
        Some(path) => HarnessConfig::load_from_file(path)?,
        None => HarnessConfig::from_env(),
    };
    apply_cli_overrides(&mut config, &args);

    match args.role {
        RoleCommand::Serve => serve(config).await,
        RoleCommand::Drive { actions } => drive(config, actions).await,
    }
}

fn apply_cli_overrides(config: &mut HarnessConfig, args: &Args) {
    if let Some(name) = &args.name {
        config.name = name.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(timeout) = args.timeout {
        config.timeout_secs = timeout.as_secs();
    }
    if let Some(retry_interval) = args.retry_interval {
        config.retry_interval_ms = retry_interval.as_millis() as u64;
    }
    if let Some(max_msg_size) = args.max_msg_size {
        config.max_message_size = max_msg_size;
    }
    if let Some(encryption) = args.encryption {
        config.encryption = encryption;
    }
    if args.unmask_permissions {
        config.unmask_permissions = true;
    }
}

async fn serve(config: HarnessConfig) -> Result<()> {
    let mut server = Server::start(ServerConfig {
        name: config.name.clone(),
        port: config.port,
        timeout: Duration::from_secs(config.timeout_secs),
        max_message_size: config.max_message_size,
        encryption: config.encryption,
        unmask_permissions: config.unmask_permissions,
    })
    .await?;

    match server.local_addr() {
        Some(addr) => info!("Serving session '{}' on {addr}", config.name),
        None => info!("Serving session '{}'", config.name),
    }

    loop {
        let message = match server.recv().await {
            Ok(message) => message,
            Err(IpcError::Closed) => break,
            Err(e) => return Err(e.into()),
        };

        if message.is_status() {
            info!(component = "session", "status: {}", message.text());
            continue;
        }
        if message.is_error() {
            warn!(component = "session", "error: {}", message.text());
            continue;
        }

        match reply_for(&message) {
            // A peer speaking a newer protocol must not take the service
            // down; log and keep serving.
            Err(IpcError::UnknownMessageType(msg_type)) => {
                warn!("ignoring unknown message type {msg_type}");
            }
            Err(e) => return Err(e.into()),
            Ok((reply, payload)) => match server.send(reply, payload) {
                Ok(()) => {}
                Err(IpcError::NotConnected(status)) => {
                    warn!("dropping reply, connection is {status}");
                }
                Err(e) => warn!("send failed: {e}"),
            },
        }
    }

    info!("Session over");
    Ok(())
}

/// Answer one controller message.
///
/// The observation and action replies carry the JSON shape the RL
/// harness expects; with no game attached the fields are stand-ins.
fn reply_for(message: &Message) -> Result<(i32, bytes::Bytes), IpcError> {
    match message.msg_type {
        msg::PING => Ok((msg::PONG, message.data.clone())),
        msg::RESET => Ok((msg::RESET_DONE, bytes::Bytes::from_static(b"reset"))),
        msg::CONTROL_REQUEST => Ok((msg::CONTROL_GRANTED, bytes::Bytes::from_static(b"granted"))),
        msg::OBSERVATION_REQUEST | msg::ACTION => {
            let body = serde_json::json!({
                "Observation": "",
                "Observation_Pos": vec![0.0_f64; 9],
                "Reward": 0.0,
                "Done": false,
            });
            let payload =
                serde_json::to_vec(&body).expect("observation body should always serialize");
            let reply = if message.msg_type == msg::ACTION {
                msg::ACTION_RESULT
            } else {
                msg::OBSERVATION
            };
            Ok((reply, payload.into()))
        }
        other => Err(IpcError::UnknownMessageType(other)),
    }
}

async fn drive(config: HarnessConfig, actions: u64) -> Result<()> {
    let mut client = Client::start(ClientConfig {
        name: config.name.clone(),
        port: config.port,
        timeout: Duration::from_secs(config.timeout_secs),
        retry_interval: Duration::from_millis(config.retry_interval_ms),
        encryption: config.encryption,
    })
    .await?;

    info!("Driving session '{}'", config.name);

    let mut issued = 0u64;
    loop {
        let message = match client.recv().await {
            Ok(message) => message,
            Err(IpcError::Closed) => break,
            Err(e) => return Err(e.into()),
        };

        if message.is_status() {
            info!(component = "session", "status: {}", message.text());
            if message.text() == "Connected" {
                // (Re)start the conversation: ping, then ask for control.
                try_send(&client, msg::PING, &b"ping"[..]);
                try_send(&client, msg::CONTROL_REQUEST, &b"control"[..]);
            }
            continue;
        }
        if message.is_error() {
            warn!(component = "session", "error: {}", message.text());
            continue;
        }

        match message.msg_type {
            msg::PONG => info!("pong ({} bytes)", message.data.len()),
            msg::CONTROL_GRANTED => {
                info!("control granted");
                try_send(&client, msg::ACTION, issued.to_string());
            }
            msg::ACTION_RESULT => {
                issued += 1;
                info!("action {issued} acknowledged ({} bytes)", message.data.len());
                if actions != 0 && issued >= actions {
                    client.close();
                    continue;
                }
                try_send(&client, msg::ACTION, issued.to_string());
            }
            msg::OBSERVATION | msg::RESET_DONE => {
                info!("reply type {} ({} bytes)", message.msg_type, message.data.len());
            }
            other => warn!("ignoring unknown message type {other}"),
        }
    }

    info!("Session over after {issued} actions");
    Ok(())
}

/// Send, tolerating a session that is between connections.
fn try_send(client: &Client, msg_type: i32, data: impl Into<bytes::Bytes>) {
    if let Err(e) = client.send(msg_type, data) {
        warn!("send failed: {e}");
    }
}
