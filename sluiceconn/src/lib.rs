//! SluiceConn -- connection establishment for Sluice sessions.
//!
//! - **Client**: sends preface, SETTINGS and the optional session window
//!   enlargement as one write, then starts reading and resolves a
//!   [`SessionFuture`] once the write completes
//! - **Server**: builds the session with the configured stream limits and
//!   idle timeout, then goes straight to duplex operation
//! - **Lifecycle**: open sessions are tracked by their owning client or
//!   connection factory for shutdown ordering

pub mod client;
pub mod config;
pub mod error;
pub mod handshake;
pub mod lifecycle;
pub mod server;
pub mod transport;

// Re-export key public types at crate root.
pub use client::{ClientConnection, Http2Client, SessionFuture};
pub use config::{ClientConfig, FlowControlKind, ServerConfig};
pub use error::{Result, SluiceConnError};
pub use handshake::HandshakeState;
pub use lifecycle::ManagedSessions;
pub use server::{ServerConnection, ServerConnectionFactory};
pub use transport::{ServerSessionListener, SessionListener, Transport, WriteCallback};
