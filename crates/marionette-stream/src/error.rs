//! Stream error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StreamError>;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bind failed: {0}")]
    BindFailed(String),

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Peer closed the connection in the middle of a frame
    #[error("connection closed")]
    ConnectionClosed,

    #[error("timeout")]
    Timeout,

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("sink error: {0}")]
    Sink(String),

    #[error("device error: {0}")]
    Device(#[from] marionette_devices::DeviceError),
}

impl From<marionette_core::Error> for StreamError {
    fn from(e: marionette_core::Error) -> Self {
        match e {
            marionette_core::Error::UnsupportedFormat(what) => StreamError::UnsupportedFormat(what),
            other => StreamError::Protocol(other.to_string()),
        }
    }
}

/// Map an I/O error from a fixed-size read, treating EOF as a closed peer
pub(crate) fn read_error(e: std::io::Error) -> StreamError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        StreamError::ConnectionClosed
    } else {
        StreamError::Io(e)
    }
}
