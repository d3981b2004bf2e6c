//! Client-side facade: dial with retry, then mirror the server API.

use crate::error::IpcError;
use crate::message::Message;
use crate::session::{Handle, Options, Role};
use crate::status::Status;
use bytes::Bytes;
use ipc_wire::DEFAULT_MAX_MESSAGE_SIZE;
use std::time::Duration;

/// Configuration for [`Client::start`]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Session name; must match the server's and be non-empty
    pub name: String,
    /// TCP port to dial; `0` selects the platform default transport
    pub port: u16,
    /// Time allowed without an established connection before the session
    /// ends with `Timeout`; `Duration::ZERO` retries forever
    pub timeout: Duration,
    /// Pause between dial attempts
    pub retry_interval: Duration,
    /// Must match the server's encryption setting
    pub encryption: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            port: 0,
            timeout: Duration::ZERO,
            retry_interval: Duration::from_secs(1),
            encryption: true,
        }
    }
}

/// Dialing endpoint of a session.
///
/// Dials until the server answers, adopts the server's message-size
/// limit during the handshake, and reconnects automatically when the
/// stream drops.
pub struct Client {
    handle: Handle,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").finish_non_exhaustive()
    }
}

impl Client {
    /// Start dialing.
    ///
    /// Dial failures of the "no listener yet" kind are retried silently;
    /// anything else is surfaced as a `-2` error pseudo-message while the
    /// loop keeps trying. With a non-zero `timeout` this waits for the
    /// connection and returns [`IpcError::Timeout`] if it never arrives.
    pub async fn start(config: ClientConfig) -> Result<Self, IpcError> {
        let opts = Options {
            name: config.name,
            port: config.port,
            timeout: config.timeout,
            retry_interval: config.retry_interval,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            encryption: config.encryption,
            unmask_permissions: false,
        };
        let handle = Handle::spawn(Role::Client, opts).await?;
        Ok(Self { handle })
    }

    /// Receive the next ordered item: a user message, a `-1` status
    /// change, or a `-2` error. Returns [`IpcError::Closed`] permanently
    /// once the session is over and the queue is drained.
    pub async fn recv(&mut self) -> Result<Message, IpcError> {
        self.handle.recv().await
    }

    /// Queue one message for the server.
    ///
    /// Fails fast without enqueueing when the type is reserved, the
    /// payload exceeds the negotiated bound, or the session is not
    /// connected.
    pub fn send(&self, msg_type: i32, data: impl Into<Bytes>) -> Result<(), IpcError> {
        self.handle.send(msg_type, data.into())
    }

    /// Current lifecycle status
    pub fn status(&self) -> Status {
        self.handle.status()
    }

    /// Close the session. Idempotent; unblocks any pending `recv`.
    pub fn close(&self) {
        self.handle.close();
    }
}
