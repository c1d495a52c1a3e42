//! Flow control strategies.
//!
//! A [`FlowControlStrategy`] is the single authority translating protocol
//! window events into [`Window`](crate::window::Window) mutations and the
//! derived stall / unstall notifications. The trait's provided methods carry
//! the common policy; variants differ in how they acknowledge consumed data.
//!
//! ## Stall and unstall
//!
//! Stall is decided on the window value *after* a send decrements it; unstall
//! is decided on the value *before* a WINDOW_UPDATE increments it. A window at
//! -500 that receives +10 therefore reports unstalled while still in debt.
//! Consumers depend on that exact sequence, so it is kept as is.
//!
//! Neither state is stored: notifications are transient. Anyone needing a
//! durable "stalled right now" flag derives it from the callback sequence via
//! a [`StallObserver`].

pub mod buffering;
pub mod simple;

use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;

use crate::frame::{WindowUpdate, DEFAULT_WINDOW_SIZE};
use crate::session::Session;
use crate::stream::Stream;
use crate::window::length_delta;

pub use buffering::BufferingFlowControlStrategy;
pub use simple::SimpleFlowControlStrategy;

/// Receives stall / unstall notifications. All methods default to no-ops.
pub trait StallObserver: Send + Sync {
    fn on_session_stalled(&self, _session: &Session) {}
    fn on_stream_stalled(&self, _stream: &Stream) {}
    fn on_session_unstalled(&self, _session: &Session) {}
    fn on_stream_unstalled(&self, _stream: &Stream) {}
}

/// State shared by every strategy variant.
pub struct FlowControlCore {
    initial_stream_send_window: AtomicI32,
    initial_stream_recv_window: AtomicI32,
    session_stalls: AtomicU64,
    observer: Option<Arc<dyn StallObserver>>,
}

impl FlowControlCore {
    /// The receive default starts at the protocol default; the send default
    /// comes from configuration until the peer's SETTINGS override it.
    pub fn new(initial_stream_send_window: i32) -> Self {
        Self {
            initial_stream_send_window: AtomicI32::new(initial_stream_send_window),
            initial_stream_recv_window: AtomicI32::new(DEFAULT_WINDOW_SIZE),
            session_stalls: AtomicU64::new(0),
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Option<Arc<dyn StallObserver>>) -> Self {
        self.observer = observer;
        self
    }

    pub fn initial_stream_send_window(&self) -> i32 {
        self.initial_stream_send_window.load(Ordering::Acquire)
    }

    pub fn initial_stream_recv_window(&self) -> i32 {
        self.initial_stream_recv_window.load(Ordering::Acquire)
    }

    pub fn session_stall_count(&self) -> u64 {
        self.session_stalls.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.session_stalls.store(0, Ordering::Relaxed);
    }

    fn observer(&self) -> Option<&dyn StallObserver> {
        self.observer.as_deref()
    }
}

/// Flow control policy for one session.
///
/// Implementors supply [`core`](Self::core) and
/// [`on_data_consumed`](Self::on_data_consumed); everything else has a
/// working default. None of the methods block, so they are safe to call from
/// an I/O thread.
pub trait FlowControlStrategy: Send + Sync {
    fn core(&self) -> &FlowControlCore;

    /// The application consumed `length` received bytes. Variants decide when
    /// to hand that credit back to the peer.
    fn on_data_consumed(&self, session: &Session, stream: Option<&Stream>, length: usize);

    fn initial_stream_send_window(&self) -> i32 {
        self.core().initial_stream_send_window()
    }

    fn initial_stream_recv_window(&self) -> i32 {
        self.core().initial_stream_recv_window()
    }

    fn session_stall_count(&self) -> u64 {
        self.core().session_stall_count()
    }

    /// Reset the statistics.
    fn reset(&self) {
        self.core().reset();
    }

    fn on_stream_created(&self, stream: &Stream) {
        stream.update_send_window(self.initial_stream_send_window());
        stream.update_recv_window(self.initial_stream_recv_window());
    }

    fn on_stream_destroyed(&self, _stream: &Stream) {}

    /// Change the default window for future streams and adjust every open
    /// stream by the difference. The session windows are never touched.
    ///
    /// `local` changes our receive side and is pure bookkeeping. A remote
    /// change governs what we may send and is replayed as a per-stream
    /// WINDOW_UPDATE through [`Session::on_window_update`], so it has exactly
    /// the side effects a real frame would.
    fn update_initial_stream_window(&self, session: &Session, initial_stream_window: i32, local: bool) {
        let core = self.core();
        // Streams admitted concurrently either start from the new value or
        // are in the snapshot, never both.
        let (previous, streams) = session.streams_after(|| {
            if local {
                core.initial_stream_recv_window
                    .swap(initial_stream_window, Ordering::AcqRel)
            } else {
                core.initial_stream_send_window
                    .swap(initial_stream_window, Ordering::AcqRel)
            }
        });
        let delta = initial_stream_window.wrapping_sub(previous);

        for stream in streams {
            if local {
                stream.update_recv_window(delta);
                tracing::debug!(
                    stream_id = stream.id(),
                    old = previous,
                    new = initial_stream_window,
                    "updated initial stream recv window"
                );
            } else {
                session.on_window_update(&WindowUpdate::new(stream.id(), delta));
            }
        }
    }

    /// Apply an inbound WINDOW_UPDATE to a send window.
    ///
    /// `stream` is `None` when the targeted stream has already been removed;
    /// that update is dropped.
    fn on_window_update(&self, session: &Session, stream: Option<&Stream>, frame: &WindowUpdate) {
        let delta = frame.delta;
        if !frame.is_session() {
            if let Some(stream) = stream {
                let old = stream.update_send_window(delta);
                tracing::debug!(
                    stream_id = stream.id(),
                    old,
                    new = old.wrapping_add(delta),
                    "updated stream send window"
                );
                if old <= 0 {
                    self.on_stream_unstalled(stream);
                }
            }
        } else {
            let old = session.update_send_window(delta);
            tracing::debug!(old, new = old.wrapping_add(delta), "updated session send window");
            if old <= 0 {
                self.on_session_unstalled(session);
            }
        }
    }

    /// Debit receive windows for inbound DATA. No stall logic applies here.
    fn on_data_received(&self, session: &Session, stream: Option<&Stream>, length: usize) {
        let delta = length_delta(length);
        let old = session.update_recv_window(-delta);
        tracing::debug!(old, new = old.wrapping_sub(delta), "data received, session recv window");

        if let Some(stream) = stream {
            let old = stream.update_recv_window(-delta);
            tracing::debug!(
                stream_id = stream.id(),
                old,
                new = old.wrapping_sub(delta),
                "data received, stream recv window"
            );
        }
    }

    /// Called for every outgoing WINDOW_UPDATE before it is queued.
    fn window_update(&self, _session: &Session, _stream: Option<&Stream>, _frame: &WindowUpdate) {}

    /// Debit send windows before DATA goes out, firing stall notifications
    /// for any window left at or below zero.
    fn on_data_sending(&self, stream: &Stream, length: usize) {
        if length == 0 {
            return;
        }
        let delta = length_delta(length);

        if let Some(session) = stream.session() {
            let old = session.update_send_window(-delta);
            let new = old.wrapping_sub(delta);
            tracing::debug!(old, new, "sending, session send window");
            if new <= 0 {
                self.core().session_stalls.fetch_add(1, Ordering::Relaxed);
                self.on_session_stalled(&session);
            }
        }

        let old = stream.update_send_window(-delta);
        let new = old.wrapping_sub(delta);
        tracing::debug!(stream_id = stream.id(), old, new, "sending, stream send window");
        if new <= 0 {
            self.on_stream_stalled(stream);
        }
    }

    fn on_data_sent(&self, _stream: &Stream, _length: usize) {}

    fn on_session_stalled(&self, session: &Session) {
        tracing::debug!(streams = session.stream_count(), "session stalled");
        if let Some(observer) = self.core().observer() {
            observer.on_session_stalled(session);
        }
    }

    fn on_stream_stalled(&self, stream: &Stream) {
        tracing::debug!(stream_id = stream.id(), "stream stalled");
        if let Some(observer) = self.core().observer() {
            observer.on_stream_stalled(stream);
        }
    }

    fn on_session_unstalled(&self, session: &Session) {
        tracing::debug!(streams = session.stream_count(), "session unstalled");
        if let Some(observer) = self.core().observer() {
            observer.on_session_unstalled(session);
        }
    }

    fn on_stream_unstalled(&self, stream: &Stream) {
        tracing::debug!(stream_id = stream.id(), "stream unstalled");
        if let Some(observer) = self.core().observer() {
            observer.on_stream_unstalled(stream);
        }
    }
}

/// The closed set of strategy variants a session can be built with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FlowControlMode {
    /// Acknowledge every consumed byte immediately.
    Simple,
    /// Batch acknowledgements until `ratio` of a window has been consumed.
    Buffering { ratio: f32 },
}

impl FlowControlMode {
    /// Instantiate a fresh strategy for one session.
    pub fn build(self, initial_stream_send_window: i32) -> Box<dyn FlowControlStrategy> {
        self.build_with_observer(initial_stream_send_window, None)
    }

    pub fn build_with_observer(
        self,
        initial_stream_send_window: i32,
        observer: Option<Arc<dyn StallObserver>>,
    ) -> Box<dyn FlowControlStrategy> {
        let core = FlowControlCore::new(initial_stream_send_window).with_observer(observer);
        match self {
            FlowControlMode::Simple => Box::new(SimpleFlowControlStrategy::with_core(core)),
            FlowControlMode::Buffering { ratio } => {
                Box::new(BufferingFlowControlStrategy::with_core(core, ratio))
            }
        }
    }
}

impl Default for FlowControlMode {
    fn default() -> Self {
        FlowControlMode::Simple
    }
}
