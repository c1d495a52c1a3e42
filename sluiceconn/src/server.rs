//! Server side of connection establishment.
//!
//! The server does not originate the handshake: accepting a connection only
//! configures the session (stream limits, idle timeout, flow control) and
//! starts reading. The client's preface arrives through the normal read path.

use std::sync::Arc;

use parking_lot::Mutex;
use sluicestream::{FlowControlMode, Role, Session};

use crate::config::ServerConfig;
use crate::error::{Result, SluiceConnError};
use crate::handshake::HandshakeState;
use crate::lifecycle::ManagedSessions;
use crate::transport::{ServerSessionListener, Transport};

/// Builds server connections and tracks their sessions.
pub struct ServerConnectionFactory {
    config: ServerConfig,
    sessions: ManagedSessions,
}

impl ServerConnectionFactory {
    pub fn new(config: ServerConfig) -> Result<Arc<Self>> {
        config.validate()?;
        Ok(Arc::new(Self {
            config,
            sessions: ManagedSessions::new(),
        }))
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn sessions(&self) -> &ManagedSessions {
        &self.sessions
    }

    /// Build the session for an accepted connection.
    pub fn new_connection(
        self: &Arc<Self>,
        transport: Arc<dyn Transport>,
        listener: Arc<dyn ServerSessionListener>,
    ) -> ServerConnection {
        let mode = FlowControlMode::from(self.config.flow_control);
        let session = Session::new(
            Role::Server,
            mode.build(self.config.initial_stream_send_window),
        );
        session.set_max_local_streams(self.config.max_concurrent_streams);
        session.set_max_remote_streams(self.config.max_concurrent_streams);
        // Stream and connection idle timers race for a lone stream; the
        // connection is normally the busier one, so the stream fires first.
        session.set_stream_idle_timeout(
            transport
                .idle_timeout()
                .or(self.config.default_stream_idle_timeout),
        );
        tracing::debug!(
            max_streams = self.config.max_concurrent_streams,
            idle_timeout = ?session.stream_idle_timeout(),
            "server session created"
        );

        ServerConnection {
            factory: Arc::clone(self),
            transport,
            listener,
            session,
            state: Mutex::new(HandshakeState::Idle),
        }
    }
}

/// One accepted connection and its session.
pub struct ServerConnection {
    factory: Arc<ServerConnectionFactory>,
    transport: Arc<dyn Transport>,
    listener: Arc<dyn ServerSessionListener>,
    session: Arc<Session>,
    state: Mutex<HandshakeState>,
}

impl ServerConnection {
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn state(&self) -> HandshakeState {
        *self.state.lock()
    }

    /// Enter duplex operation.
    pub fn on_open(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if *state != HandshakeState::Idle {
                return Err(SluiceConnError::InvalidStateTransition {
                    from: state.label().into(),
                    to: HandshakeState::Established.label().into(),
                });
            }
            *state = HandshakeState::Established;
        }

        self.listener.on_accept(&self.session);
        self.factory.sessions.register(Arc::clone(&self.session));
        self.transport.start_reading();
        Ok(())
    }

    pub fn on_close(&self) {
        *self.state.lock() = HandshakeState::Closed;
        self.factory.sessions.deregister(&self.session);
        tracing::debug!("server connection closed");
    }
}
