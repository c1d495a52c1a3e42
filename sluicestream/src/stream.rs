//! A single multiplexed stream and its flow control windows.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::session::Session;
use crate::window::Window;

/// Type alias for stream identifiers.
pub type StreamId = u32;

/// One request/response exchange inside a [`Session`].
///
/// Both windows start at zero; the session's flow control strategy credits
/// them with the current initial window values when the stream is admitted.
/// The session back-reference is weak: the session owns its streams, never
/// the other way around.
pub struct Stream {
    id: StreamId,
    send_window: Window,
    recv_window: Window,
    session: Weak<Session>,
    /// Set once the stream has been removed from its session.
    closed: AtomicBool,
    idle_timeout: Option<Duration>,
}

impl Stream {
    pub(crate) fn new(id: StreamId, session: Weak<Session>, idle_timeout: Option<Duration>) -> Self {
        Self {
            id,
            send_window: Window::default(),
            recv_window: Window::default(),
            session,
            closed: AtomicBool::new(false),
            idle_timeout,
        }
    }

    /// Returns the stream ID.
    pub fn id(&self) -> StreamId {
        self.id
    }

    /// The owning session, if it is still alive.
    pub fn session(&self) -> Option<Arc<Session>> {
        self.session.upgrade()
    }

    /// Current send window.
    pub fn send_window(&self) -> i32 {
        self.send_window.get()
    }

    /// Current receive window.
    pub fn recv_window(&self) -> i32 {
        self.recv_window.get()
    }

    /// Add `delta` to the send window, returning the previous value.
    pub fn update_send_window(&self, delta: i32) -> i32 {
        self.send_window.update(delta)
    }

    /// Add `delta` to the receive window, returning the previous value.
    pub fn update_recv_window(&self, delta: i32) -> i32 {
        self.recv_window.update(delta)
    }

    /// Idle timeout copied from the session when the stream was admitted.
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
    }

    /// Whether the stream has been removed from its session.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn mark_closed(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.id)
            .field("send_window", &self.send_window())
            .field("recv_window", &self.recv_window())
            .field("closed", &self.is_closed())
            .finish()
    }
}
