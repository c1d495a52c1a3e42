//! Parsed protocol events exchanged with the codec layer.
//!
//! The byte layout of frames is owned by the encoder/decoder. Everything here
//! has already been validated: window deltas are within the protocol's
//! 31-bit range and stream ids are well formed.

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::stream::StreamId;

/// Protocol default for both stream and session windows.
pub const DEFAULT_WINDOW_SIZE: i32 = 65_535;

/// Client connection preface marker.
pub const PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// Stream id addressing the session as a whole.
pub const SESSION_STREAM_ID: StreamId = 0;

/// Stream ids are 31 bits on the wire.
pub const MAX_STREAM_ID: StreamId = 0x7fff_ffff;

/// A WINDOW_UPDATE event.
///
/// `stream_id == 0` targets the session; any other value targets one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowUpdate {
    pub stream_id: StreamId,
    pub delta: i32,
}

impl WindowUpdate {
    pub fn new(stream_id: StreamId, delta: i32) -> Self {
        Self { stream_id, delta }
    }

    /// Window update for the session-level window.
    pub fn session(delta: i32) -> Self {
        Self::new(SESSION_STREAM_ID, delta)
    }

    pub fn is_session(&self) -> bool {
        self.stream_id == SESSION_STREAM_ID
    }
}

/// SETTINGS parameters keyed by setting identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings(BTreeMap<u16, u32>);

impl Settings {
    pub const HEADER_TABLE_SIZE: u16 = 0x1;
    pub const ENABLE_PUSH: u16 = 0x2;
    pub const MAX_CONCURRENT_STREAMS: u16 = 0x3;
    pub const INITIAL_WINDOW_SIZE: u16 = 0x4;
    pub const MAX_FRAME_SIZE: u16 = 0x5;
    pub const MAX_HEADER_LIST_SIZE: u16 = 0x6;

    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, id: u16, value: u32) -> Self {
        self.0.insert(id, value);
        self
    }

    pub fn insert(&mut self, id: u16, value: u32) -> Option<u32> {
        self.0.insert(id, value)
    }

    pub fn get(&self, id: u16) -> Option<u32> {
        self.0.get(&id).copied()
    }

    pub fn initial_window_size(&self) -> Option<i32> {
        self.get(Self::INITIAL_WINDOW_SIZE)
            .map(|v| i32::try_from(v).unwrap_or(i32::MAX))
    }

    pub fn max_concurrent_streams(&self) -> Option<u32> {
        self.get(Self::MAX_CONCURRENT_STREAMS)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u16, u32)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }
}

impl FromIterator<(u16, u32)> for Settings {
    fn from_iter<I: IntoIterator<Item = (u16, u32)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A parsed frame, as handed to or produced for the codec layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// The client connection preface marker.
    Preface,
    /// SETTINGS, or its acknowledgement when `reply` is set.
    Settings { settings: Settings, reply: bool },
    /// WINDOW_UPDATE for the session or a stream.
    WindowUpdate(WindowUpdate),
    /// DATA payload for a stream.
    Data {
        stream_id: StreamId,
        payload: Bytes,
        end_stream: bool,
    },
}

impl Frame {
    /// The raw preface marker bytes, for codecs that write them verbatim.
    pub fn preface_bytes() -> Bytes {
        Bytes::from_static(PREFACE)
    }

    /// Returns the window update carried by this frame, if any.
    pub fn as_window_update(&self) -> Option<&WindowUpdate> {
        match self {
            Frame::WindowUpdate(update) => Some(update),
            _ => None,
        }
    }
}

impl From<WindowUpdate> for Frame {
    fn from(update: WindowUpdate) -> Self {
        Frame::WindowUpdate(update)
    }
}
