// Client preface batch construction.
//
//   Client                                  Server
//     |--- PREFACE + SETTINGS [+ WINDOW_UPDATE(0)] -->|   one write
//     |<-- SETTINGS ------------------------------------|   read starts after
//     |==== duplex ====================================|

use sluicestream::{Frame, Session, Settings, WindowUpdate, DEFAULT_WINDOW_SIZE};

/// How far the configured session receive window exceeds the protocol
/// default, or `None` when no enlargement is needed.
pub fn session_window_delta(initial_session_recv_window: i32) -> Option<i32> {
    let delta = initial_session_recv_window.saturating_sub(DEFAULT_WINDOW_SIZE);
    (delta > 0).then_some(delta)
}

/// Build the ordered client preface batch.
///
/// When the session window is enlarged, the session's receive window is
/// credited *before* the batch is returned, so the extra credit is already
/// accounted for when the peer starts using it.
pub fn preface_batch(
    session: &Session,
    settings: Settings,
    initial_session_recv_window: i32,
) -> Vec<Frame> {
    let mut batch = vec![
        Frame::Preface,
        Frame::Settings {
            settings,
            reply: false,
        },
    ];

    if let Some(delta) = session_window_delta(initial_session_recv_window) {
        session.update_recv_window(delta);
        let update = WindowUpdate::session(delta);
        session.flow_control().window_update(session, None, &update);
        batch.push(Frame::WindowUpdate(update));
    }
    batch
}
