//! Error types for buffers and replay files

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("buffer underrun: {requested} bytes requested, {remaining} remaining")]
    BufferUnderrun { requested: usize, remaining: usize },

    #[error("invalid string length: {0}")]
    InvalidStringLength(i64),

    #[error("destination too small: {needed} bytes needed, {available} available")]
    DestinationTooSmall { needed: usize, available: usize },

    #[error("invalid replay: {0}")]
    InvalidReplay(String),

    #[error("unsupported replay version: {0}")]
    UnsupportedVersion(u8),

    #[error("replay contains no state")]
    EmptyReplay,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
