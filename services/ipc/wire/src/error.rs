//! Wire format error types.

use thiserror::Error;

/// Errors produced while encoding or decoding frames
#[derive(Error, Debug)]
pub enum FrameError {
    /// Payload or declared body length exceeds the configured bound
    #[error("message size limit exceeded: {0}")]
    TooLarge(usize),

    /// Truncated or structurally invalid frame
    #[error("malformed frame")]
    Malformed,

    /// Decryption or authentication failure
    #[error("decryption failed")]
    Crypto,

    /// Invalid handshake control payload
    #[error("malformed handshake frame")]
    Handshake,
}
