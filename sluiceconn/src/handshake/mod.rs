//! Connection-open handshake.

pub mod preface;
pub mod state;

pub use preface::{preface_batch, session_window_delta};
pub use state::HandshakeState;
