//! The unit of exchange between application code and a session.

use crate::status::Status;
use bytes::Bytes;

/// Message type of locally synthesized status notifications
pub const STATUS_MSG_TYPE: i32 = -1;

/// Message type of locally synthesized error notifications
pub const ERROR_MSG_TYPE: i32 = -2;

/// One item delivered by `recv` or accepted by `send`.
///
/// Positive types are application-defined and opaque to the session.
/// Negative types are pseudo-messages synthesized by the session itself
/// and never carried on the wire: `-1` is a status change whose payload
/// is the status display string, `-2` is an error description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Message type; `0` is reserved and rejected on send
    pub msg_type: i32,
    /// Payload bytes
    pub data: Bytes,
}

impl Message {
    /// Create an application message
    pub fn new(msg_type: i32, data: Bytes) -> Self {
        Self { msg_type, data }
    }

    /// Whether this is a `-1` status pseudo-message
    pub fn is_status(&self) -> bool {
        self.msg_type == STATUS_MSG_TYPE
    }

    /// Whether this is a `-2` error pseudo-message
    pub fn is_error(&self) -> bool {
        self.msg_type == ERROR_MSG_TYPE
    }

    /// Payload rendered as text, for status/error pseudo-messages and logs
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }

    pub(crate) fn status(status: Status) -> Self {
        Self {
            msg_type: STATUS_MSG_TYPE,
            data: Bytes::from(status.to_string()),
        }
    }

    pub(crate) fn error(text: impl Into<String>) -> Self {
        Self {
            msg_type: ERROR_MSG_TYPE,
            data: Bytes::from(text.into()),
        }
    }
}
