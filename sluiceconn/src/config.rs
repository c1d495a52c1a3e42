//! Client and server configuration.
//!
//! Plain structs with defaults; they can also be read from JSON, with any
//! missing field falling back to its default:
//!
//! ```json
//! { "max_concurrent_streams": 128, "flow_control": { "strategy": "buffering", "ratio": 0.5 } }
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sluicestream::session::UNLIMITED_STREAMS;
use sluicestream::{FlowControlMode, DEFAULT_WINDOW_SIZE};

use crate::error::{Result, SluiceConnError};

/// Serializable choice of flow control strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum FlowControlKind {
    Simple,
    Buffering { ratio: f32 },
}

impl Default for FlowControlKind {
    fn default() -> Self {
        FlowControlKind::Buffering { ratio: 0.5 }
    }
}

impl From<FlowControlKind> for FlowControlMode {
    fn from(kind: FlowControlKind) -> Self {
        match kind {
            FlowControlKind::Simple => FlowControlMode::Simple,
            FlowControlKind::Buffering { ratio } => FlowControlMode::Buffering { ratio },
        }
    }
}

impl FlowControlKind {
    fn validate(&self) -> Result<()> {
        match *self {
            FlowControlKind::Buffering { ratio } if !(ratio > 0.0 && ratio <= 1.0) => Err(
                SluiceConnError::InvalidConfig(format!("buffering ratio {ratio} not in (0, 1]")),
            ),
            _ => Ok(()),
        }
    }
}

/// Configuration for an [`Http2Client`](crate::client::Http2Client).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Session receive window to advertise. Anything above the protocol
    /// default is announced with a WINDOW_UPDATE right after the preface.
    pub initial_session_recv_window: i32,
    /// Stream send window assumed until the server's SETTINGS arrive.
    pub initial_stream_send_window: i32,
    pub flow_control: FlowControlKind,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            initial_session_recv_window: DEFAULT_WINDOW_SIZE,
            initial_stream_send_window: DEFAULT_WINDOW_SIZE,
            flow_control: FlowControlKind::default(),
        }
    }
}

impl ClientConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        non_negative("initial_session_recv_window", self.initial_session_recv_window)?;
        non_negative("initial_stream_send_window", self.initial_stream_send_window)?;
        self.flow_control.validate()
    }
}

/// Configuration for a [`ServerConnectionFactory`](crate::server::ServerConnectionFactory).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bound applied to both locally and remotely initiated streams;
    /// `-1` means unlimited.
    pub max_concurrent_streams: i32,
    pub initial_stream_send_window: i32,
    pub flow_control: FlowControlKind,
    /// Used when the transport reports no idle timeout of its own.
    #[serde(with = "millis")]
    pub default_stream_idle_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_streams: UNLIMITED_STREAMS,
            initial_stream_send_window: DEFAULT_WINDOW_SIZE,
            flow_control: FlowControlKind::default(),
            default_stream_idle_timeout: None,
        }
    }
}

impl ServerConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_streams < UNLIMITED_STREAMS {
            return Err(SluiceConnError::InvalidConfig(format!(
                "max_concurrent_streams {} must be -1 or non-negative",
                self.max_concurrent_streams
            )));
        }
        non_negative("initial_stream_send_window", self.initial_stream_send_window)?;
        self.flow_control.validate()
    }
}

fn non_negative(name: &str, value: i32) -> Result<()> {
    if value < 0 {
        return Err(SluiceConnError::InvalidConfig(format!("{name} {value} is negative")));
    }
    Ok(())
}

/// `Option<Duration>` as optional milliseconds.
mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        value.map(|d| d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}
