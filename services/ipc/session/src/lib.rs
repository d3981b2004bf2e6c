//! Connection lifecycle, reconnection, handshake, and the Server/Client
//! API for gameenv IPC.
//!
//! A session is one logical connection between the simulation and an
//! external controller, spanning possibly many physical reconnects. The
//! server binds once and serves one peer at a time; the client dials
//! with retry. Both sides expose the same surface: an ordered `recv`
//! stream interleaving user messages with `-1` status and `-2` error
//! pseudo-messages, and a fail-fast `send`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use ipc_session::{Client, ClientConfig, Server, ServerConfig};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), ipc_session::IpcError> {
//! let server = Server::start(ServerConfig {
//!     name: "wolf3d_ipc_player".into(),
//!     encryption: false,
//!     ..ServerConfig::default()
//! })
//! .await?;
//!
//! let mut client = Client::start(ClientConfig {
//!     name: "wolf3d_ipc_player".into(),
//!     retry_interval: Duration::from_millis(200),
//!     encryption: false,
//!     ..ClientConfig::default()
//! })
//! .await?;
//!
//! // Wait until the session reports itself connected, then talk.
//! loop {
//!     let message = client.recv().await?;
//!     if message.is_status() && message.text() == "Connected" {
//!         break;
//!     }
//! }
//! client.send(11, &b"ping"[..])?;
//! # drop(server);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod error;
pub mod handshake;
pub mod message;
pub mod server;
mod session;
pub mod status;
pub mod transport;

// Re-export main types
pub use client::{Client, ClientConfig};
pub use error::IpcError;
pub use handshake::HANDSHAKE_VERSION;
pub use message::{Message, ERROR_MSG_TYPE, STATUS_MSG_TYPE};
pub use server::{Server, ServerConfig};
pub use status::Status;
pub use transport::{BoundAddr, Endpoint, IoStream};
