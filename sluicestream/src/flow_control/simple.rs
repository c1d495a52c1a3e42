//! Immediate acknowledgement: every consumed byte is handed straight back to
//! the peer.

use super::{FlowControlCore, FlowControlStrategy};
use crate::frame::WindowUpdate;
use crate::session::Session;
use crate::stream::Stream;
use crate::window::length_delta;

/// Sends a session and a stream WINDOW_UPDATE for each chunk of consumed
/// data. Cheap to reason about, chatty on the wire.
pub struct SimpleFlowControlStrategy {
    core: FlowControlCore,
}

impl SimpleFlowControlStrategy {
    pub fn new(initial_stream_send_window: i32) -> Self {
        Self::with_core(FlowControlCore::new(initial_stream_send_window))
    }

    pub fn with_core(core: FlowControlCore) -> Self {
        Self { core }
    }
}

impl FlowControlStrategy for SimpleFlowControlStrategy {
    fn core(&self) -> &FlowControlCore {
        &self.core
    }

    fn on_data_consumed(&self, session: &Session, stream: Option<&Stream>, length: usize) {
        if length == 0 {
            return;
        }
        let delta = length_delta(length);

        session.update_recv_window(delta);
        session.enqueue_window_update(None, WindowUpdate::session(delta));

        if let Some(stream) = stream {
            // A closed stream will never receive more data; only the session
            // needs its credit back.
            if stream.is_closed() {
                tracing::debug!(stream_id = stream.id(), "data consumed on closed stream");
            } else {
                stream.update_recv_window(delta);
                session.enqueue_window_update(Some(stream), WindowUpdate::new(stream.id(), delta));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::frame::{Frame, DEFAULT_WINDOW_SIZE};
    use crate::session::Role;

    fn session() -> Arc<Session> {
        Session::new(Role::Server, Box::new(SimpleFlowControlStrategy::new(DEFAULT_WINDOW_SIZE)))
    }

    #[test]
    fn consumed_data_is_acknowledged_immediately() {
        let session = session();
        let stream = session.on_remote_stream(1).unwrap();
        session.on_data(1, 1000);
        session.on_data_consumed(1, 1000);

        assert_eq!(session.recv_window(), DEFAULT_WINDOW_SIZE);
        assert_eq!(stream.recv_window(), DEFAULT_WINDOW_SIZE);
        assert_eq!(
            session.drain_frames(),
            vec![
                Frame::WindowUpdate(WindowUpdate::session(1000)),
                Frame::WindowUpdate(WindowUpdate::new(1, 1000)),
            ]
        );
    }

    #[test]
    fn closed_stream_only_replenishes_session() {
        let session = session();
        session.on_remote_stream(1).unwrap();
        session.on_data(1, 10);
        let stream = session.remove_stream(1).unwrap();

        session
            .flow_control()
            .on_data_consumed(&session, Some(&*stream), 10);
        assert_eq!(session.drain_frames(), vec![Frame::WindowUpdate(WindowUpdate::session(10))]);
        assert_eq!(stream.recv_window(), DEFAULT_WINDOW_SIZE - 10);
    }

    #[test]
    fn zero_length_consumption_sends_nothing() {
        let session = session();
        session.on_data_consumed(0, 0);
        assert!(session.drain_frames().is_empty());
    }
}
