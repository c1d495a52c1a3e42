// Integration tests for client and server connection establishment.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use sluiceconn::{
    ClientConfig, FlowControlKind, HandshakeState, Http2Client, ServerConfig,
    ServerConnectionFactory, ServerSessionListener, SessionListener, SluiceConnError, Transport,
    WriteCallback,
};
use sluicestream::{Frame, Session, Settings, WindowUpdate, DEFAULT_WINDOW_SIZE};

/// Records every transport call; write completions are released by the test.
#[derive(Default)]
struct MockTransport {
    calls: Mutex<Vec<&'static str>>,
    writes: Mutex<Vec<Vec<Frame>>>,
    pending: Mutex<Option<WriteCallback>>,
    idle_timeout: Option<Duration>,
    refuse_writes: bool,
}

impl MockTransport {
    fn with_idle_timeout(idle_timeout: Duration) -> Self {
        Self {
            idle_timeout: Some(idle_timeout),
            ..Self::default()
        }
    }

    fn refusing() -> Self {
        Self {
            refuse_writes: true,
            ..Self::default()
        }
    }

    fn complete(&self, outcome: io::Result<()>) {
        let callback = self.pending.lock().take().expect("no pending write");
        callback(outcome);
    }

    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }
}

impl Transport for MockTransport {
    fn write(&self, frames: Vec<Frame>, callback: WriteCallback) {
        self.calls.lock().push("write");
        self.writes.lock().push(frames);
        if self.refuse_writes {
            callback(Err(io::Error::from(io::ErrorKind::ConnectionRefused)));
        } else {
            *self.pending.lock() = Some(callback);
        }
    }

    fn start_reading(&self) {
        self.calls.lock().push("start_reading");
    }

    fn close(&self) {
        self.calls.lock().push("close");
    }

    fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
    }
}

#[derive(Default)]
struct Listener {
    settings: Option<Settings>,
    prefaces: AtomicUsize,
    accepted: AtomicUsize,
}

impl SessionListener for Listener {
    fn on_preface(&self, _session: &Session) -> Option<Settings> {
        self.prefaces.fetch_add(1, Ordering::SeqCst);
        self.settings.clone()
    }
}

impl ServerSessionListener for Listener {
    fn on_accept(&self, _session: &Session) {
        self.accepted.fetch_add(1, Ordering::SeqCst);
    }
}

fn client(initial_session_recv_window: i32) -> Arc<Http2Client> {
    Http2Client::new(ClientConfig {
        initial_session_recv_window,
        ..ClientConfig::default()
    })
    .unwrap()
}

// ── Client ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn client_default_window_sends_two_frames() {
    let client = client(DEFAULT_WINDOW_SIZE);
    let transport = Arc::new(MockTransport::default());
    let listener = Arc::new(Listener::default());
    let (connection, ready) = client.new_connection(transport.clone(), listener.clone());

    connection.on_open().unwrap();
    assert_eq!(transport.calls(), vec!["write", "start_reading"]);
    assert_eq!(listener.prefaces.load(Ordering::SeqCst), 1);
    assert_eq!(
        transport.writes.lock()[0],
        vec![
            Frame::Preface,
            Frame::Settings {
                settings: Settings::new(),
                reply: false
            }
        ]
    );
    assert_eq!(connection.state(), HandshakeState::PrefaceSent);

    transport.complete(Ok(()));
    let session = ready.await.unwrap();
    assert!(Arc::ptr_eq(&session, connection.session()));
    assert_eq!(connection.state(), HandshakeState::Established);
    assert_eq!(session.recv_window(), DEFAULT_WINDOW_SIZE);
    assert!(client.sessions().contains(&session));
}

#[tokio::test]
async fn client_enlarged_window_sends_three_frames() {
    let window = 16 * 1024 * 1024;
    let client = client(window);
    let transport = Arc::new(MockTransport::default());
    let settings = Settings::new()
        .with(Settings::INITIAL_WINDOW_SIZE, 1 << 20)
        .with(Settings::ENABLE_PUSH, 0);
    let listener = Arc::new(Listener {
        settings: Some(settings.clone()),
        ..Listener::default()
    });
    let (connection, ready) = client.new_connection(transport.clone(), listener);

    connection.on_open().unwrap();

    // Credited before the write has completed.
    assert_eq!(connection.session().recv_window(), window);
    let writes = transport.writes.lock().clone();
    assert_eq!(writes.len(), 1);
    assert_eq!(
        writes[0],
        vec![
            Frame::Preface,
            Frame::Settings {
                settings,
                reply: false
            },
            Frame::WindowUpdate(WindowUpdate::session(window - DEFAULT_WINDOW_SIZE)),
        ]
    );

    transport.complete(Ok(()));
    let session = ready.await.unwrap();
    assert_eq!(session.recv_window(), window);
}

#[tokio::test]
async fn client_write_failure_closes_and_fails_once() {
    let client = client(DEFAULT_WINDOW_SIZE);
    let transport = Arc::new(MockTransport::default());
    let (connection, ready) =
        client.new_connection(transport.clone(), Arc::new(Listener::default()));

    connection.on_open().unwrap();
    assert!(client.sessions().contains(connection.session()));
    transport.complete(Err(io::Error::new(io::ErrorKind::BrokenPipe, "reset by peer")));

    assert_eq!(transport.calls(), vec!["write", "start_reading", "close"]);
    assert_eq!(connection.state(), HandshakeState::Failed);
    assert!(client.sessions().is_empty());
    match ready.await {
        Err(SluiceConnError::Io(err)) => assert_eq!(err.kind(), io::ErrorKind::BrokenPipe),
        other => panic!("expected io failure, got {other:?}"),
    }

    // The transport reports the close afterwards; nothing else resolves.
    connection.on_close();
    assert_eq!(connection.state(), HandshakeState::Failed);
    assert!(client.sessions().is_empty());
}

#[tokio::test]
async fn client_immediate_write_failure_skips_reading() {
    let client = client(DEFAULT_WINDOW_SIZE);
    let transport = Arc::new(MockTransport::refusing());
    let (connection, ready) =
        client.new_connection(transport.clone(), Arc::new(Listener::default()));

    connection.on_open().unwrap();

    assert_eq!(transport.calls(), vec!["write", "close"]);
    assert_eq!(connection.state(), HandshakeState::Failed);
    assert!(client.sessions().is_empty());
    assert!(matches!(ready.await, Err(SluiceConnError::Io(_))));
}

#[tokio::test]
async fn client_closed_before_write_completes() {
    let client = client(DEFAULT_WINDOW_SIZE);
    let transport = Arc::new(MockTransport::default());
    let (connection, ready) =
        client.new_connection(transport.clone(), Arc::new(Listener::default()));

    connection.on_open().unwrap();
    assert_eq!(client.sessions().len(), 1);
    connection.on_close();

    assert!(matches!(ready.await, Err(SluiceConnError::ConnectionClosed)));
    assert!(client.sessions().is_empty());

    // A late completion is ignored.
    transport.complete(Ok(()));
    assert_eq!(connection.state(), HandshakeState::Closed);
}

#[test]
fn client_opens_only_once() {
    let client = client(DEFAULT_WINDOW_SIZE);
    let transport = Arc::new(MockTransport::default());
    let (connection, _ready) = client.new_connection(transport.clone(), Arc::new(Listener::default()));

    connection.on_open().unwrap();
    assert!(matches!(
        connection.on_open(),
        Err(SluiceConnError::InvalidStateTransition { .. })
    ));
    assert_eq!(transport.writes.lock().len(), 1);
}

#[tokio::test]
async fn streams_only_after_establishment() {
    let client = client(DEFAULT_WINDOW_SIZE);
    let transport = Arc::new(MockTransport::default());
    let (connection, ready) = client.new_connection(transport.clone(), Arc::new(Listener::default()));

    assert!(connection.new_stream().is_err());
    connection.on_open().unwrap();
    transport.complete(Ok(()));
    ready.await.unwrap();

    let stream = connection.new_stream().unwrap();
    assert_eq!(stream.id(), 1);
    assert_eq!(stream.send_window(), DEFAULT_WINDOW_SIZE);
    connection.close_stream(stream.id()).unwrap();
    assert!(stream.is_closed());
    assert!(matches!(
        connection.close_stream(stream.id()),
        Err(SluiceConnError::Stream(_))
    ));
}

#[tokio::test]
async fn simple_client_acknowledges_consumed_data() {
    let client = Http2Client::new(ClientConfig {
        flow_control: FlowControlKind::Simple,
        ..ClientConfig::default()
    })
    .unwrap();
    let transport = Arc::new(MockTransport::default());
    let (connection, ready) = client.new_connection(transport.clone(), Arc::new(Listener::default()));
    connection.on_open().unwrap();
    transport.complete(Ok(()));
    let session = ready.await.unwrap();

    let stream = connection.new_stream().unwrap();
    session.on_data(stream.id(), 500);
    session.on_data_consumed(stream.id(), 500);
    assert_eq!(
        session.drain_frames(),
        vec![
            Frame::WindowUpdate(WindowUpdate::session(500)),
            Frame::WindowUpdate(WindowUpdate::new(stream.id(), 500)),
        ]
    );
}

// ── Server ───────────────────────────────────────────────────────────────

#[test]
fn server_accept_configures_session() {
    let factory = ServerConnectionFactory::new(ServerConfig {
        max_concurrent_streams: 2,
        ..ServerConfig::default()
    })
    .unwrap();
    let transport = Arc::new(MockTransport::with_idle_timeout(Duration::from_secs(30)));
    let listener = Arc::new(Listener::default());
    let connection = factory.new_connection(transport.clone(), listener.clone());

    let session = Arc::clone(connection.session());
    assert_eq!(session.max_local_streams(), 2);
    assert_eq!(session.max_remote_streams(), 2);
    assert_eq!(session.stream_idle_timeout(), Some(Duration::from_secs(30)));

    connection.on_open().unwrap();
    assert_eq!(transport.calls(), vec!["start_reading"]);
    assert!(transport.writes.lock().is_empty());
    assert_eq!(listener.accepted.load(Ordering::SeqCst), 1);
    assert_eq!(connection.state(), HandshakeState::Established);
    assert!(factory.sessions().contains(&session));

    let stream = session.on_remote_stream(1).unwrap();
    assert_eq!(stream.idle_timeout(), Some(Duration::from_secs(30)));
    session.on_remote_stream(3).unwrap();
    assert!(session.on_remote_stream(5).is_err());

    connection.on_close();
    assert!(factory.sessions().is_empty());
}

#[test]
fn server_unlimited_streams_by_default() {
    let factory = ServerConnectionFactory::new(ServerConfig {
        default_stream_idle_timeout: Some(Duration::from_secs(5)),
        ..ServerConfig::default()
    })
    .unwrap();
    let connection = factory.new_connection(
        Arc::new(MockTransport::default()),
        Arc::new(Listener::default()),
    );
    let session = connection.session();
    for id in (1..200).step_by(2) {
        session.on_remote_stream(id).unwrap();
    }
    assert_eq!(session.stream_count(), 100);
    // No transport timeout: the configured fallback applies.
    assert_eq!(session.stream_idle_timeout(), Some(Duration::from_secs(5)));
}

#[test]
fn invalid_config_is_rejected() {
    assert!(ServerConnectionFactory::new(ServerConfig {
        max_concurrent_streams: -5,
        ..ServerConfig::default()
    })
    .is_err());
    assert!(Http2Client::new(ClientConfig {
        initial_session_recv_window: -1,
        ..ClientConfig::default()
    })
    .is_err());
}
