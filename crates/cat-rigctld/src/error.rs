//! Error types for the rigctld front end

use cat_mux::MuxError;
use thiserror::Error;

/// Hamlib status codes sent as `RPRT <code>`
pub mod code {
    /// Invalid parameter or unknown command
    pub const EINVAL: i32 = -1;
    /// Function not implemented
    pub const ENIMPL: i32 = -4;
    /// Communication timed out
    pub const ETIMEOUT: i32 = -5;
    /// I/O error, including a closed link
    pub const EIO: i32 = -6;
    /// Protocol error (malformed device reply)
    pub const EPROTO: i32 = -8;
}

/// Failure of a single rigctld command
///
/// Every variant is reported to the client as `RPRT <code>` and leaves the
/// connection open.
#[derive(Debug, Error)]
pub enum RigctlError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("transceiver did not answer in time")]
    Timeout,

    #[error("transceiver I/O failed: {0}")]
    Io(String),

    #[error("unexpected transceiver reply: {0}")]
    Protocol(String),
}

impl RigctlError {
    /// Hamlib status code for this error
    pub fn code(&self) -> i32 {
        match self {
            RigctlError::UnknownCommand(_) | RigctlError::InvalidArgument(_) => code::EINVAL,
            RigctlError::NotImplemented(_) => code::ENIMPL,
            RigctlError::Timeout => code::ETIMEOUT,
            RigctlError::Io(_) => code::EIO,
            RigctlError::Protocol(_) => code::EPROTO,
        }
    }
}

impl From<cat_protocol::ParseError> for RigctlError {
    fn from(err: cat_protocol::ParseError) -> Self {
        RigctlError::InvalidArgument(err.to_string())
    }
}

impl From<MuxError> for RigctlError {
    fn from(err: MuxError) -> Self {
        match err {
            MuxError::Timeout { .. } | MuxError::Cancelled => RigctlError::Timeout,
            MuxError::InvalidCommand(e) => RigctlError::InvalidArgument(e.to_string()),
            MuxError::Protocol(e) => RigctlError::Protocol(e.to_string()),
            MuxError::NotConnected | MuxError::Serial(_) | MuxError::Io(_) => {
                RigctlError::Io(err.to_string())
            }
        }
    }
}
