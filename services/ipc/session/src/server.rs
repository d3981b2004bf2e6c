//! Server-side facade: bind once, serve one controller at a time.

use crate::error::IpcError;
use crate::message::Message;
use crate::session::{Handle, Options, Role};
use crate::status::Status;
use bytes::Bytes;
use ipc_wire::DEFAULT_MAX_MESSAGE_SIZE;
use std::net::SocketAddr;
use std::time::Duration;

/// Configuration for [`Server::start`]
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Session name; on Unix with `port == 0` it also names the socket
    /// file (`/tmp/<name>.sock`). Must be non-empty.
    pub name: String,
    /// TCP bind port; `0` selects the platform default transport
    /// (Unix socket where available, otherwise an OS-assigned TCP port)
    pub port: u16,
    /// Time allowed with no connected peer before the session ends with
    /// `Timeout`; `Duration::ZERO` waits forever
    pub timeout: Duration,
    /// Payload bound in bytes; values below 1024 are floored to 1024
    pub max_message_size: usize,
    /// Encrypt traffic with a per-connection AEAD cipher
    pub encryption: bool,
    /// Relax the Unix socket file mode so peers under another uid can
    /// connect
    pub unmask_permissions: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            port: 0,
            timeout: Duration::ZERO,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            encryption: true,
            unmask_permissions: false,
        }
    }
}

/// Listening endpoint of a session.
///
/// Owns the listener and the lifecycle supervisor. Exactly one peer is
/// served at a time; when its stream drops the server goes back to
/// accepting, and the message sequence from [`Server::recv`] tells the
/// application which connection epoch it is seeing.
pub struct Server {
    handle: Handle,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server").finish_non_exhaustive()
    }
}

impl Server {
    /// Bind and start serving.
    ///
    /// With a non-zero `timeout` this waits for the first controller to
    /// attach and returns [`IpcError::Timeout`] if none does in time.
    pub async fn start(config: ServerConfig) -> Result<Self, IpcError> {
        let opts = Options {
            name: config.name,
            port: config.port,
            timeout: config.timeout,
            retry_interval: Duration::ZERO,
            max_message_size: config.max_message_size,
            encryption: config.encryption,
            unmask_permissions: config.unmask_permissions,
        };
        let handle = Handle::spawn(Role::Server, opts).await?;
        Ok(Self { handle })
    }

    /// Receive the next ordered item: a user message, a `-1` status
    /// change, or a `-2` error. Returns [`IpcError::Closed`] permanently
    /// once the session is over and the queue is drained.
    pub async fn recv(&mut self) -> Result<Message, IpcError> {
        self.handle.recv().await
    }

    /// Queue one message for the connected peer.
    ///
    /// Fails fast without enqueueing when the type is reserved, the
    /// payload exceeds the negotiated bound, or no peer is connected.
    pub fn send(&self, msg_type: i32, data: impl Into<Bytes>) -> Result<(), IpcError> {
        self.handle.send(msg_type, data.into())
    }

    /// Current lifecycle status
    pub fn status(&self) -> Status {
        self.handle.status()
    }

    /// TCP address actually bound, when the transport is TCP.
    ///
    /// The original deployment runs with an OS-assigned port, so this is
    /// how a launcher learns where to point the controller.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.handle.bound_addr().and_then(|bound| bound.tcp())
    }

    /// Close the session. Idempotent; unblocks any pending `recv`.
    pub fn close(&self) {
        self.handle.close();
    }
}
