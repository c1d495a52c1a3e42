//! Seams to the I/O layer and to the application.

use std::io;
use std::time::Duration;

use sluicestream::{Frame, Session, Settings};

/// Completion for one [`Transport::write`].
pub type WriteCallback = Box<dyn FnOnce(io::Result<()>) + Send>;

/// The connection endpoint as seen by the handshake.
///
/// Encoding and socket buffering live behind this trait.
pub trait Transport: Send + Sync {
    /// Encode and flush `frames` as one write, in order, then invoke
    /// `callback` exactly once with the outcome.
    fn write(&self, frames: Vec<Frame>, callback: WriteCallback);

    /// Begin delivering inbound bytes to the parser.
    fn start_reading(&self);

    /// Close the connection.
    fn close(&self);

    /// Idle timeout of the underlying endpoint, if any.
    fn idle_timeout(&self) -> Option<Duration>;
}

/// Application callbacks for a session.
pub trait SessionListener: Send + Sync {
    /// Settings to send with the client preface. `None` is the same as an
    /// empty SETTINGS frame: every protocol default is accepted.
    fn on_preface(&self, _session: &Session) -> Option<Settings> {
        None
    }
}

/// Application callbacks for server-side sessions.
pub trait ServerSessionListener: SessionListener {
    /// A connection was accepted and its session configured.
    fn on_accept(&self, _session: &Session) {}
}
