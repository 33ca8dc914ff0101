//! Error types for CAT protocol parsing and encoding

use thiserror::Error;

/// Errors that can occur while parsing or encoding protocol text
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Frequency outside the transceiver's tunable range
    #[error("frequency {hz} Hz outside {min}..={max} Hz")]
    FrequencyOutOfRange { hz: u64, min: u64, max: u64 },

    /// Invalid mode value
    #[error("invalid mode: {0}")]
    InvalidMode(String),

    /// Numeric parameter outside its permitted range
    #[error("{what} out of range: {value}")]
    OutOfRange { what: &'static str, value: i64 },
}

/// Higher-level protocol errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Invalid response from radio
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OperatingMode;

    #[test]
    fn test_unknown_mode_name() {
        let err = "WFM".parse::<OperatingMode>().unwrap_err();
        assert_eq!(err, ParseError::InvalidMode("WFM".into()));
        assert_eq!(err.to_string(), "invalid mode: WFM");
    }

    #[test]
    fn test_out_of_range_message() {
        let err = ParseError::FrequencyOutOfRange {
            hz: 29_999,
            min: 30_000,
            max: 75_000_000,
        };
        assert_eq!(err.to_string(), "frequency 29999 Hz outside 30000..=75000000 Hz");
    }
}
