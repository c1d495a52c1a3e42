// Handshake state machine.

use std::fmt;

/// Where a connection is in its open sequence.
///
/// Client: Idle -> PrefaceSent -> Established (or Failed).
/// Server: Idle -> Established.
/// Either side ends in Closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Connection created, not yet opened.
    Idle,
    /// Preface batch handed to the transport, write not yet completed.
    PrefaceSent,
    /// Session ready for duplex operation.
    Established,
    /// The preface write failed and the connection was closed.
    Failed,
    /// Connection closed after the handshake.
    Closed,
}

impl HandshakeState {
    /// Human-readable label for the current state (used in error messages).
    pub fn label(&self) -> &'static str {
        match self {
            HandshakeState::Idle => "Idle",
            HandshakeState::PrefaceSent => "PrefaceSent",
            HandshakeState::Established => "Established",
            HandshakeState::Failed => "Failed",
            HandshakeState::Closed => "Closed",
        }
    }
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
