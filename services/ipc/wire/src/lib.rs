//! Message framing and the optional encryption layer for gameenv IPC.
//!
//! This crate implements the wire format spoken between the simulation
//! process and an external controller. It is a pure transform layer: no
//! sockets, no tasks, no connection state. The session crate feeds it
//! buffers and streams the results.
//!
//! ## Wire Format
//!
//! ```text
//! +----------------------+----------------------------+
//! | u32 body_len (BE)    | length of bytes that follow|
//! +----------------------+----------------------------+
//! | body                 | see below                  |
//! +----------------------+----------------------------+
//!
//! body (encryption disabled):
//! +----------------------+----------------------------+
//! | i32 msg_type (BE)    | 0 reserved for control     |
//! +----------------------+----------------------------+
//! | payload              | variable (0..max)          |
//! +----------------------+----------------------------+
//!
//! body (encryption enabled):
//! +----------------------+----------------------------+
//! | nonce (12B)          | fresh per frame            |
//! +----------------------+----------------------------+
//! | AEAD(msg_type ‖ payload) + tag (16B)              |
//! +----------------------+----------------------------+
//! ```
//!
//! Negative message types never appear on the wire; they are synthesized
//! locally by the session layer for status and error notifications.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod crypto;
pub mod error;
pub mod frame;

// Re-export main types
pub use crypto::{KeyExchange, SessionCipher, CRYPTO_OVERHEAD, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use error::FrameError;
pub use frame::{
    encode_frame, Frame, FrameDecoder, CONTROL_MSG_TYPE, DEFAULT_MAX_MESSAGE_SIZE,
    LENGTH_PREFIX_SIZE, TYPE_PREFIX_SIZE,
};
