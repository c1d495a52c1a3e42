//! Connection-level session: windows plus the stream registry.
//!
//! The session owns its streams and routes inbound window and data events to
//! them through its flow control strategy. Windows are lock-free; the
//! registry lock is only held to insert, remove or snapshot streams, never
//! while window arithmetic runs on behalf of a send.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use crossbeam_queue::SegQueue;
use parking_lot::{Mutex, RwLock};

use crate::error::{Result, SluiceStreamError};
use crate::flow_control::FlowControlStrategy;
use crate::frame::{
    Frame, Settings, WindowUpdate, DEFAULT_WINDOW_SIZE, MAX_STREAM_ID, SESSION_STREAM_ID,
};
use crate::stream::{Stream, StreamId};
use crate::window::Window;

/// Stream limit value meaning "no limit".
pub const UNLIMITED_STREAMS: i32 = -1;

/// Which end of the connection this session represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Opens odd-numbered streams.
    Client,
    /// Opens even-numbered streams.
    Server,
}

impl Role {
    fn first_local_stream_id(self) -> StreamId {
        match self {
            Role::Client => 1,
            Role::Server => 2,
        }
    }

    fn is_local(self, id: StreamId) -> bool {
        match self {
            Role::Client => id % 2 == 1,
            Role::Server => id % 2 == 0,
        }
    }
}

struct Registry {
    streams: HashMap<StreamId, Arc<Stream>>,
    next_local_stream_id: StreamId,
    local_count: u32,
    remote_count: u32,
}

/// One multiplexed connection.
pub struct Session {
    role: Role,
    me: Weak<Session>,
    send_window: Window,
    recv_window: Window,
    registry: RwLock<Registry>,
    max_local_streams: AtomicI32,
    max_remote_streams: AtomicI32,
    stream_idle_timeout: Mutex<Option<Duration>>,
    flow_control: Box<dyn FlowControlStrategy>,
    /// Outbound control frames awaiting the writer.
    frames: SegQueue<Frame>,
}

impl Session {
    /// Create a session with protocol-default windows and no stream limits.
    pub fn new(role: Role, flow_control: Box<dyn FlowControlStrategy>) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            role,
            me: me.clone(),
            send_window: Window::new(DEFAULT_WINDOW_SIZE),
            recv_window: Window::new(DEFAULT_WINDOW_SIZE),
            registry: RwLock::new(Registry {
                streams: HashMap::new(),
                next_local_stream_id: role.first_local_stream_id(),
                local_count: 0,
                remote_count: 0,
            }),
            max_local_streams: AtomicI32::new(UNLIMITED_STREAMS),
            max_remote_streams: AtomicI32::new(UNLIMITED_STREAMS),
            stream_idle_timeout: Mutex::new(None),
            flow_control,
            frames: SegQueue::new(),
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn flow_control(&self) -> &dyn FlowControlStrategy {
        self.flow_control.as_ref()
    }

    // --- Windows ---

    pub fn send_window(&self) -> i32 {
        self.send_window.get()
    }

    pub fn recv_window(&self) -> i32 {
        self.recv_window.get()
    }

    /// Add `delta` to the session send window, returning the previous value.
    pub fn update_send_window(&self, delta: i32) -> i32 {
        self.send_window.update(delta)
    }

    /// Add `delta` to the session receive window, returning the previous value.
    pub fn update_recv_window(&self, delta: i32) -> i32 {
        self.recv_window.update(delta)
    }

    pub fn initial_stream_send_window(&self) -> i32 {
        self.flow_control.initial_stream_send_window()
    }

    pub fn initial_stream_recv_window(&self) -> i32 {
        self.flow_control.initial_stream_recv_window()
    }

    pub fn session_stall_count(&self) -> u64 {
        self.flow_control.session_stall_count()
    }

    // --- Limits ---

    /// Cap on concurrently open streams we initiate; negative means unlimited.
    pub fn set_max_local_streams(&self, max: i32) {
        self.max_local_streams.store(max, Ordering::Release);
    }

    /// Cap on concurrently open streams the peer initiates; negative means unlimited.
    pub fn set_max_remote_streams(&self, max: i32) {
        self.max_remote_streams.store(max, Ordering::Release);
    }

    pub fn max_local_streams(&self) -> i32 {
        self.max_local_streams.load(Ordering::Acquire)
    }

    pub fn max_remote_streams(&self) -> i32 {
        self.max_remote_streams.load(Ordering::Acquire)
    }

    /// Idle timeout handed to streams admitted from now on.
    pub fn set_stream_idle_timeout(&self, timeout: Option<Duration>) {
        *self.stream_idle_timeout.lock() = timeout;
    }

    pub fn stream_idle_timeout(&self) -> Option<Duration> {
        *self.stream_idle_timeout.lock()
    }

    // --- Registry ---

    /// Open a new locally initiated stream with the next free id.
    pub fn new_local_stream(&self) -> Result<Arc<Stream>> {
        let mut registry = self.registry.write();
        check_limit(registry.local_count, self.max_local_streams())?;

        let id = registry.next_local_stream_id;
        if id > MAX_STREAM_ID {
            return Err(SluiceStreamError::StreamIdsExhausted);
        }
        registry.next_local_stream_id = id + 2;
        let stream = self.admit(&mut registry, id);
        registry.local_count += 1;
        Ok(stream)
    }

    /// Admit a stream opened by the peer.
    pub fn on_remote_stream(&self, id: StreamId) -> Result<Arc<Stream>> {
        if id == SESSION_STREAM_ID || id > MAX_STREAM_ID || self.role.is_local(id) {
            return Err(SluiceStreamError::InvalidStreamId(id));
        }

        let mut registry = self.registry.write();
        if registry.streams.contains_key(&id) {
            return Err(SluiceStreamError::StreamAlreadyExists(id));
        }
        check_limit(registry.remote_count, self.max_remote_streams())?;

        let stream = self.admit(&mut registry, id);
        registry.remote_count += 1;
        Ok(stream)
    }

    fn admit(&self, registry: &mut Registry, id: StreamId) -> Arc<Stream> {
        let stream = Arc::new(Stream::new(id, self.me.clone(), self.stream_idle_timeout()));
        self.flow_control.on_stream_created(&stream);
        registry.streams.insert(id, Arc::clone(&stream));
        tracing::debug!(stream_id = id, role = ?self.role, "stream created");
        stream
    }

    /// Unregister a stream. Later events addressed to it are dropped.
    pub fn remove_stream(&self, id: StreamId) -> Option<Arc<Stream>> {
        let stream = {
            let mut registry = self.registry.write();
            let stream = registry.streams.remove(&id)?;
            if self.role.is_local(id) {
                registry.local_count -= 1;
            } else {
                registry.remote_count -= 1;
            }
            stream
        };

        if stream.mark_closed() {
            self.flow_control.on_stream_destroyed(&stream);
            tracing::debug!(stream_id = id, "stream destroyed");
        }
        Some(stream)
    }

    pub fn get_stream(&self, id: StreamId) -> Option<Arc<Stream>> {
        self.registry.read().streams.get(&id).cloned()
    }

    /// A point-in-time copy of the open streams. Streams created afterwards
    /// are not included; streams removed afterwards are still present but
    /// marked closed.
    pub fn streams(&self) -> Vec<Arc<Stream>> {
        self.registry.read().streams.values().cloned().collect()
    }

    /// Run `f` and copy the open streams as one step with respect to stream
    /// admission. Streams admitted before `f` are in the copy; streams
    /// admitted after it observe whatever `f` changed.
    pub fn streams_after<R>(&self, f: impl FnOnce() -> R) -> (R, Vec<Arc<Stream>>) {
        let registry = self.registry.read();
        let result = f();
        (result, registry.streams.values().cloned().collect())
    }

    pub fn stream_count(&self) -> usize {
        self.registry.read().streams.len()
    }

    // --- Inbound events ---

    /// Route an inbound WINDOW_UPDATE. Updates for unknown streams are no-ops.
    pub fn on_window_update(&self, frame: &WindowUpdate) {
        let stream = if frame.is_session() {
            None
        } else {
            self.get_stream(frame.stream_id)
        };
        self.flow_control.on_window_update(self, stream.as_deref(), frame);
    }

    /// Account for `length` bytes of inbound DATA.
    pub fn on_data(&self, stream_id: StreamId, length: usize) {
        let stream = self.get_stream(stream_id);
        self.flow_control.on_data_received(self, stream.as_deref(), length);
    }

    /// The application consumed `length` bytes of received DATA.
    pub fn on_data_consumed(&self, stream_id: StreamId, length: usize) {
        let stream = if stream_id == SESSION_STREAM_ID {
            None
        } else {
            self.get_stream(stream_id)
        };
        self.flow_control.on_data_consumed(self, stream.as_deref(), length);
    }

    /// Apply the peer's SETTINGS.
    pub fn on_settings(&self, settings: &Settings) {
        if let Some(max) = settings.max_concurrent_streams() {
            self.set_max_local_streams(i32::try_from(max).unwrap_or(i32::MAX));
        }
        if let Some(window) = settings.initial_window_size() {
            self.flow_control.update_initial_stream_window(self, window, false);
        }
    }

    /// Apply our own SETTINGS once the peer has acknowledged them.
    pub fn apply_local_settings(&self, settings: &Settings) {
        if let Some(max) = settings.max_concurrent_streams() {
            self.set_max_remote_streams(i32::try_from(max).unwrap_or(i32::MAX));
        }
        if let Some(window) = settings.initial_window_size() {
            self.flow_control.update_initial_stream_window(self, window, true);
        }
    }

    // --- Outbound ---

    /// Gate for outbound DATA: debit windows before `length` bytes go out.
    pub fn on_data_sending(&self, stream: &Stream, length: usize) {
        self.flow_control.on_data_sending(stream, length);
    }

    pub fn on_data_sent(&self, stream: &Stream, length: usize) {
        self.flow_control.on_data_sent(stream, length);
    }

    /// Queue a control frame for the writer.
    pub fn enqueue(&self, frame: Frame) {
        self.frames.push(frame);
    }

    /// Queue an outgoing WINDOW_UPDATE, letting the strategy observe it first.
    pub fn enqueue_window_update(&self, stream: Option<&Stream>, update: WindowUpdate) {
        self.flow_control.window_update(self, stream, &update);
        self.frames.push(Frame::WindowUpdate(update));
    }

    /// Take every queued control frame, oldest first.
    pub fn drain_frames(&self) -> Vec<Frame> {
        let mut frames = Vec::with_capacity(self.frames.len());
        while let Some(frame) = self.frames.pop() {
            frames.push(frame);
        }
        frames
    }
}

fn check_limit(count: u32, max: i32) -> Result<()> {
    match u32::try_from(max) {
        Ok(max) if count >= max => Err(SluiceStreamError::MaxStreamsExceeded(max)),
        _ => Ok(()),
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("role", &self.role)
            .field("send_window", &self.send_window())
            .field("recv_window", &self.recv_window())
            .field("streams", &self.stream_count())
            .finish()
    }
}
