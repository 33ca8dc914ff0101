//! Error types for the gateway core

use thiserror::Error;

/// Errors that can occur while submitting commands or driving the link
#[derive(Debug, Error)]
pub enum MuxError {
    /// The serial link is not open (never opened, closed, or lost)
    #[error("transceiver link is not connected")]
    NotConnected,

    /// No matching reply arrived in time
    #[error("no reply to {command} within {timeout_ms}ms")]
    Timeout {
        /// Command text that went unanswered
        command: String,
        /// Timeout that elapsed (milliseconds)
        timeout_ms: u64,
    },

    /// The caller stopped waiting; the command itself may still run
    #[error("caller cancelled the wait")]
    Cancelled,

    /// The command could not be encoded
    #[error("invalid command: {0}")]
    InvalidCommand(#[from] cat_protocol::ParseError),

    /// The reply could not be decoded
    #[error("protocol error: {0}")]
    Protocol(#[from] cat_protocol::ProtocolError),

    /// Failed to open the serial port
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// I/O error on the link
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MuxError {
    /// Soft failures leave the link usable and are not worth more than a debug log
    pub fn is_soft(&self) -> bool {
        matches!(self, MuxError::Timeout { .. } | MuxError::Cancelled)
    }
}
