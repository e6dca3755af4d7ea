//! Error types for the enocean library.

use thiserror::Error;

/// The main error type for enocean operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Serial port error.
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame encoding/decoding error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Protocol error from the gateway.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// The transceiver has not been initialized.
    #[error("not connected")]
    NotConnected,

    /// The read loop is already running.
    #[error("already receiving")]
    AlreadyReceiving,

    /// The request left the queue without a response from the gateway.
    #[error("no response received")]
    NoResponse,
}

/// Frame-specific errors.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Payload does not fit the length fields of the wire format.
    #[error("payload too large: {size} bytes exceeds maximum {max}")]
    PayloadTooLarge { size: usize, max: usize },

    /// The packet cannot be expressed in this protocol version.
    #[error("unsupported packet: {reason}")]
    Unsupported { reason: String },

    /// Payload is shorter than its packet type requires.
    #[error("truncated packet: expected at least {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },
}

/// Result type alias for enocean operations.
pub type Result<T> = std::result::Result<T, Error>;
