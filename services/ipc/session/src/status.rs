//! Connection lifecycle states.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of a session.
///
/// The supervisor task is the only writer; the API surface and tests read
/// concurrently through [`StatusCell`].
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Session created, no transport yet
    NotConnected = 0,
    /// Server bound and waiting for a peer
    Listening = 1,
    /// Client dial loop running, no peer yet
    Connecting = 2,
    /// Handshake complete, user traffic flowing
    Connected = 3,
    /// Live stream lost, waiting for a replacement within the budget
    ReConnecting = 4,
    /// Local close in progress
    Closing = 5,
    /// Terminal: closed by the local endpoint
    Closed = 6,
    /// Terminal: connection budget exhausted
    Timeout = 7,
    /// Terminal: unrecoverable failure
    Error = 8,
}

impl Status {
    /// Whether the session has reached a terminal state
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Closing | Status::Closed | Status::Timeout | Status::Error)
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Status::NotConnected,
            1 => Status::Listening,
            2 => Status::Connecting,
            3 => Status::Connected,
            4 => Status::ReConnecting,
            5 => Status::Closing,
            6 => Status::Closed,
            7 => Status::Timeout,
            _ => Status::Error,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::NotConnected => "Not Connected",
            Status::Listening => "Listening",
            Status::Connecting => "Connecting",
            Status::Connected => "Connected",
            Status::ReConnecting => "Re-connecting",
            Status::Closing => "Closing",
            Status::Closed => "Closed",
            Status::Timeout => "Timeout",
            Status::Error => "Error",
        };
        f.write_str(name)
    }
}

/// Single-writer, multi-reader status slot
#[derive(Debug)]
pub(crate) struct StatusCell(AtomicU8);

impl StatusCell {
    pub fn new(status: Status) -> Self {
        Self(AtomicU8::new(status as u8))
    }

    pub fn load(&self) -> Status {
        Status::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, status: Status) {
        self.0.store(status as u8, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_strings() {
        let expected = [
            (Status::NotConnected, "Not Connected"),
            (Status::Listening, "Listening"),
            (Status::Connecting, "Connecting"),
            (Status::Connected, "Connected"),
            (Status::ReConnecting, "Re-connecting"),
            (Status::Closing, "Closing"),
            (Status::Closed, "Closed"),
            (Status::Timeout, "Timeout"),
            (Status::Error, "Error"),
        ];
        for (status, name) in expected {
            assert_eq!(status.to_string(), name);
        }
    }

    #[test]
    fn test_cell_roundtrip() {
        let cell = StatusCell::new(Status::NotConnected);
        assert_eq!(cell.load(), Status::NotConnected);

        cell.store(Status::ReConnecting);
        assert_eq!(cell.load(), Status::ReConnecting);
    }

    #[test]
    fn test_terminal_states() {
        assert!(Status::Closed.is_terminal());
        assert!(Status::Timeout.is_terminal());
        assert!(Status::Error.is_terminal());
        assert!(!Status::Connected.is_terminal());
        assert!(!Status::ReConnecting.is_terminal());
    }
}
