//! Deferred acknowledgement: consumed bytes accumulate until a configurable
//! fraction of the window is used up, then one WINDOW_UPDATE returns them.
//!
//! The session threshold is taken against the largest session receive
//! window seen so far. That maximum is tracked from outgoing session window
//! updates (including the one-off enlargement sent with the client preface),
//! since SETTINGS can only change stream windows.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};

use parking_lot::RwLock;

use super::{FlowControlCore, FlowControlStrategy};
use crate::frame::{WindowUpdate, DEFAULT_WINDOW_SIZE};
use crate::session::Session;
use crate::stream::{Stream, StreamId};
use crate::window::length_delta;

pub struct BufferingFlowControlStrategy {
    core: FlowControlCore,
    ratio: f32,
    max_session_recv_window: AtomicI32,
    session_level: AtomicI32,
    stream_levels: RwLock<HashMap<StreamId, AtomicI32>>,
}

impl BufferingFlowControlStrategy {
    pub fn new(initial_stream_send_window: i32, ratio: f32) -> Self {
        Self::with_core(FlowControlCore::new(initial_stream_send_window), ratio)
    }

    pub fn with_core(core: FlowControlCore, ratio: f32) -> Self {
        Self {
            core,
            ratio,
            max_session_recv_window: AtomicI32::new(DEFAULT_WINDOW_SIZE),
            session_level: AtomicI32::new(0),
            stream_levels: RwLock::new(HashMap::new()),
        }
    }

    pub fn ratio(&self) -> f32 {
        self.ratio
    }

    pub fn max_session_recv_window(&self) -> i32 {
        self.max_session_recv_window.load(Ordering::Acquire)
    }

    /// Bytes consumed on the session but not yet acknowledged.
    pub fn session_level(&self) -> i32 {
        self.session_level.load(Ordering::Acquire)
    }

    /// Bytes consumed on a stream but not yet acknowledged.
    pub fn stream_level(&self, stream_id: StreamId) -> Option<i32> {
        self.stream_levels
            .read()
            .get(&stream_id)
            .map(|level| level.load(Ordering::Acquire))
    }

    fn threshold(&self, window: i32) -> i32 {
        (window as f32 * self.ratio) as i32
    }
}

impl FlowControlStrategy for BufferingFlowControlStrategy {
    fn core(&self) -> &FlowControlCore {
        &self.core
    }

    fn on_stream_created(&self, stream: &Stream) {
        stream.update_send_window(self.initial_stream_send_window());
        stream.update_recv_window(self.initial_stream_recv_window());
        self.stream_levels.write().insert(stream.id(), AtomicI32::new(0));
    }

    fn on_stream_destroyed(&self, stream: &Stream) {
        self.stream_levels.write().remove(&stream.id());
    }

    fn on_data_consumed(&self, session: &Session, stream: Option<&Stream>, length: usize) {
        if length == 0 {
            return;
        }
        let delta = length_delta(length);

        let level = self
            .session_level
            .fetch_add(delta, Ordering::AcqRel)
            .wrapping_add(delta);
        if level > self.threshold(self.max_session_recv_window()) {
            // A concurrent consumer may have swapped the level out first.
            let level = self.session_level.swap(0, Ordering::AcqRel);
            if level > 0 {
                session.update_recv_window(level);
                tracing::debug!(level, "data consumed, replenishing session recv window");
                session.enqueue_window_update(None, WindowUpdate::session(level));
            }
        } else {
            tracing::debug!(level, "data consumed, session level below threshold");
        }

        let Some(stream) = stream else {
            return;
        };
        if stream.is_closed() {
            tracing::debug!(stream_id = stream.id(), "data consumed on closed stream");
            return;
        }

        let replenish = {
            let levels = self.stream_levels.read();
            levels.get(&stream.id()).and_then(|stream_level| {
                let level = stream_level.fetch_add(delta, Ordering::AcqRel).wrapping_add(delta);
                if level > self.threshold(self.initial_stream_recv_window()) {
                    Some(stream_level.swap(0, Ordering::AcqRel)).filter(|&level| level > 0)
                } else {
                    None
                }
            })
        };
        if let Some(level) = replenish {
            stream.update_recv_window(level);
            tracing::debug!(stream_id = stream.id(), level, "data consumed, replenishing stream recv window");
            session.enqueue_window_update(Some(stream), WindowUpdate::new(stream.id(), level));
        }
    }

    fn window_update(&self, session: &Session, _stream: Option<&Stream>, frame: &WindowUpdate) {
        // SETTINGS never change the session window, so it only grows through
        // our own session-level updates. Track the largest value seen.
        if frame.is_session() {
            self.max_session_recv_window
                .fetch_max(session.recv_window(), Ordering::AcqRel);
        }
    }
}
