use std::{io, string::FromUtf8Error};

use thiserror::Error;

/// Failures while encoding or decoding a length-prefixed frame.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("message of {0} bytes does not fit a u32 length prefix")]
    TooLarge(usize),

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Faults surfaced by the consumer-side stream reader.
#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("transport error: {0}")]
    Frame(#[from] FrameError),

    #[error("message is not valid utf-8: {0}")]
    Utf8(#[from] FromUtf8Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_sessions must be at least 1")]
    NoSessions,

    #[error("max_queue_depth must be at least 1")]
    NoQueueDepth,
}
