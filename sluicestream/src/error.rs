use thiserror::Error;

use crate::stream::StreamId;

/// All errors produced by the SluiceStream session layer.
///
/// Flow control itself never fails: window arithmetic is allowed to go
/// negative and updates for vanished streams are dropped. These errors come
/// from stream admission in the session registry.
#[derive(Debug, Error)]
pub enum SluiceStreamError {
    #[error("stream {0} not found")]
    StreamNotFound(StreamId),

    #[error("stream {0} already exists")]
    StreamAlreadyExists(StreamId),

    #[error("invalid stream id: 0x{0:08x}")]
    InvalidStreamId(StreamId),

    #[error("maximum concurrent streams ({0}) exceeded")]
    MaxStreamsExceeded(u32),

    #[error("local stream ids exhausted")]
    StreamIdsExhausted,
}

pub type Result<T> = std::result::Result<T, SluiceStreamError>;
