//! Session error types.

use crate::status::Status;
use ipc_wire::FrameError;
use thiserror::Error;

/// Errors surfaced by the session API
#[derive(Error, Debug)]
pub enum IpcError {
    /// The configured ipc name is empty
    #[error("ipc name cannot be an empty string")]
    InvalidName,

    /// Message type 0 is reserved for internal control frames
    #[error("message type 0 is reserved")]
    ReservedType,

    /// Payload exceeds the negotiated maximum
    #[error("message length {len} exceeds maximum {max}")]
    TooLarge {
        /// Rejected payload length
        len: usize,
        /// Negotiated maximum payload length
        max: usize,
    },

    /// `send` called while the session is not connected
    #[error("connection is not ready: {0}")]
    NotConnected(Status),

    /// The connection budget expired before a peer attached
    #[error("timed out waiting for a connection")]
    Timeout,

    /// The dial loop exhausted its budget without reaching a listener
    #[error("timed out trying to connect")]
    DialTimeout,

    /// The session was closed, locally or by a terminal error
    #[error("connection has been closed")]
    Closed,

    /// A dispatcher was handed a message type outside its enumeration
    #[error("unknown message type {0}")]
    UnknownMessageType(i32),

    /// The type-0 handshake exchange failed
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// Wire-level encode/decode failure
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// Transport-level I/O failure
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
