//! Client side of connection establishment.
//!
//! [`ClientConnection::on_open`] runs the open sequence exactly once:
//! listener settings, registration, one atomic preface write, then reads. The write's
//! completion resolves the connection's [`SessionFuture`]: success yields the
//! session, failure closes the transport, deregisters the session and yields
//! the error. Reads start only after the write is queued, so the server's own
//! preface can never be answered before ours has gone out.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use sluicestream::{FlowControlMode, Role, Session, SluiceStreamError, Stream, StreamId};
use tokio::sync::oneshot;

use crate::config::ClientConfig;
use crate::error::{Result, SluiceConnError};
use crate::handshake::{preface_batch, HandshakeState};
use crate::lifecycle::ManagedSessions;
use crate::transport::{SessionListener, Transport};

type SessionResult = Result<Arc<Session>>;

/// Resolves once the client preface write completes.
pub struct SessionFuture {
    rx: oneshot::Receiver<SessionResult>,
}

impl Future for SessionFuture {
    type Output = SessionResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|outcome| outcome.unwrap_or(Err(SluiceConnError::ConnectionClosed)))
    }
}

/// Owns client configuration and the sessions of every open connection.
pub struct Http2Client {
    config: ClientConfig,
    sessions: ManagedSessions,
}

impl Http2Client {
    pub fn new(config: ClientConfig) -> Result<Arc<Self>> {
        config.validate()?;
        Ok(Arc::new(Self {
            config,
            sessions: ManagedSessions::new(),
        }))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Sessions of the currently open connections.
    pub fn sessions(&self) -> &ManagedSessions {
        &self.sessions
    }

    /// Build a connection over `transport`. Nothing is sent until
    /// [`ClientConnection::on_open`].
    pub fn new_connection(
        self: &Arc<Self>,
        transport: Arc<dyn Transport>,
        listener: Arc<dyn SessionListener>,
    ) -> (ClientConnection, SessionFuture) {
        let mode = FlowControlMode::from(self.config.flow_control);
        let session = Session::new(
            Role::Client,
            mode.build(self.config.initial_stream_send_window),
        );
        let (tx, rx) = oneshot::channel();

        let connection = ClientConnection {
            client: Arc::clone(self),
            transport,
            listener,
            session,
            promise: Arc::new(Mutex::new(Some(tx))),
            state: Arc::new(Mutex::new(HandshakeState::Idle)),
        };
        (connection, SessionFuture { rx })
    }
}

/// One client connection and its session.
pub struct ClientConnection {
    client: Arc<Http2Client>,
    transport: Arc<dyn Transport>,
    listener: Arc<dyn SessionListener>,
    session: Arc<Session>,
    promise: Arc<Mutex<Option<oneshot::Sender<SessionResult>>>>,
    state: Arc<Mutex<HandshakeState>>,
}

impl ClientConnection {
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn state(&self) -> HandshakeState {
        *self.state.lock()
    }

    /// Run the open sequence. Fails if the connection was already opened.
    pub fn on_open(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if *state != HandshakeState::Idle {
                return Err(SluiceConnError::InvalidStateTransition {
                    from: state.label().into(),
                    to: HandshakeState::PrefaceSent.label().into(),
                });
            }
            *state = HandshakeState::PrefaceSent;
        }

        let settings = self.listener.on_preface(&self.session).unwrap_or_default();
        let batch = preface_batch(
            &self.session,
            settings,
            self.client.config.initial_session_recv_window,
        );
        tracing::debug!(frames = batch.len(), "sending client preface");

        // Registered before the write; a failed completion deregisters it.
        self.client.sessions.register(Arc::clone(&self.session));

        let client = Arc::clone(&self.client);
        let session = Arc::clone(&self.session);
        let transport = Arc::clone(&self.transport);
        let promise = Arc::clone(&self.promise);
        let state = Arc::clone(&self.state);
        self.transport.write(
            batch,
            Box::new(move |outcome| {
                let result = match outcome {
                    Ok(()) => {
                        transition(&state, HandshakeState::Established);
                        Ok(session)
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "client preface write failed, closing");
                        transport.close();
                        transition(&state, HandshakeState::Failed);
                        client.sessions.deregister(&session);
                        Err(SluiceConnError::Io(err))
                    }
                };
                if let Some(tx) = promise.lock().take() {
                    // The caller may have dropped the future; nothing to do then.
                    let _ = tx.send(result);
                }
            }),
        );

        // A synchronous write failure has already closed the connection.
        if !matches!(self.state(), HandshakeState::Failed | HandshakeState::Closed) {
            self.transport.start_reading();
        }
        Ok(())
    }

    /// Connection closed by the transport. Deregisters the session and fails
    /// the session future if the preface write never completed.
    pub fn on_close(&self) {
        transition(&self.state, HandshakeState::Closed);
        if let Some(tx) = self.promise.lock().take() {
            let _ = tx.send(Err(SluiceConnError::ConnectionClosed));
        }
        self.client.sessions.deregister(&self.session);
        tracing::debug!("client connection closed");
    }

    /// Open a new stream once the session is established.
    pub fn new_stream(&self) -> Result<Arc<Stream>> {
        if self.state() != HandshakeState::Established {
            return Err(SluiceConnError::ConnectionClosed);
        }
        Ok(self.session.new_local_stream()?)
    }

    /// Close a stream on this connection.
    pub fn close_stream(&self, id: StreamId) -> Result<()> {
        self.session
            .remove_stream(id)
            .map(|_| ())
            .ok_or(SluiceConnError::Stream(SluiceStreamError::StreamNotFound(id)))
    }
}

/// Move to `next` unless the connection already failed or closed.
fn transition(state: &Mutex<HandshakeState>, next: HandshakeState) {
    let mut state = state.lock();
    if !matches!(*state, HandshakeState::Failed | HandshakeState::Closed) {
        *state = next;
    }
}
