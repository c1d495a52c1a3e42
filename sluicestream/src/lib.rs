//! SluiceStream -- session, stream and flow control core for HTTP/2-class
//! multiplexed connections.
//!
//! - **Window**: lock-free signed credit counter
//! - **Stream / Session**: per-exchange and per-connection windows plus the
//!   authoritative stream registry
//! - **FlowControlStrategy**: the policy deciding how windows move and when
//!   stall / unstall notifications fire

pub mod error;
pub mod flow_control;
pub mod frame;
pub mod session;
pub mod stream;
pub mod window;

// Re-export key public types at crate root.
pub use error::{Result, SluiceStreamError};
pub use flow_control::{FlowControlMode, FlowControlStrategy, StallObserver};
pub use frame::{Frame, Settings, WindowUpdate, DEFAULT_WINDOW_SIZE, PREFACE};
pub use session::{Role, Session};
pub use stream::{Stream, StreamId};
pub use window::Window;
