//! Domain types shared by the codec, the gateway state and the adapters
//!
//! The transceiver has two receivers (main and sub). Most commands carry a
//! receiver selector either in the command code (`FA`/`FB`) or as the first
//! parameter digit (`MD0`, `MD1`, `SM0`, `AN1`...).

use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;

/// Receiver selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Receiver {
    /// Main receiver (VFO A)
    Main,
    /// Sub receiver (VFO B)
    Sub,
}

impl Receiver {
    /// Parameter digit used by `MD`, `AN` and `SM`
    pub fn digit(self) -> char {
        match self {
            Receiver::Main => '0',
            Receiver::Sub => '1',
        }
    }

    /// Parse a receiver selector digit
    pub fn from_digit(c: char) -> Option<Self> {
        match c {
            '0' => Some(Receiver::Main),
            '1' => Some(Receiver::Sub),
            _ => None,
        }
    }

    /// Frequency command code for this receiver
    pub fn frequency_code(self) -> &'static str {
        match self {
            Receiver::Main => "FA",
            Receiver::Sub => "FB",
        }
    }
}

/// Operating modes understood by the transceiver
///
/// Each mode maps to exactly one single-character code on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OperatingMode {
    /// Lower Sideband
    Lsb,
    /// Upper Sideband
    Usb,
    /// CW on the upper side
    Cw,
    /// FM
    Fm,
    /// AM
    Am,
    /// RTTY, lower side
    RttyL,
    /// CW on the lower side (reverse)
    CwR,
    /// Data on LSB
    DataL,
    /// RTTY, upper side
    RttyU,
    /// Data over FM
    DataFm,
    /// Narrow FM
    FmN,
    /// Data on USB
    DataU,
    /// Narrow AM
    AmN,
    /// PSK
    Psk,
    /// Data over narrow FM
    DataFmN,
}

/// Wire code table, in transceiver order
const MODE_TABLE: [(char, OperatingMode); 15] = [
    ('1', OperatingMode::Lsb),
    ('2', OperatingMode::Usb),
    ('3', OperatingMode::Cw),
    ('4', OperatingMode::Fm),
    ('5', OperatingMode::Am),
    ('6', OperatingMode::RttyL),
    ('7', OperatingMode::CwR),
    ('8', OperatingMode::DataL),
    ('9', OperatingMode::RttyU),
    ('A', OperatingMode::DataFm),
    ('B', OperatingMode::FmN),
    ('C', OperatingMode::DataU),
    ('D', OperatingMode::AmN),
    ('E', OperatingMode::Psk),
    ('F', OperatingMode::DataFmN),
];

impl OperatingMode {
    /// All modes, in wire-code order
    pub fn all() -> impl Iterator<Item = OperatingMode> {
        MODE_TABLE.iter().map(|(_, m)| *m)
    }

    /// Single-character wire code
    pub fn code(self) -> char {
        MODE_TABLE
            .iter()
            .find(|(_, m)| *m == self)
            .map(|(c, _)| *c)
            .unwrap_or('2')
    }

    /// Look up a mode by wire code (case-insensitive for the hex letters)
    pub fn from_code(c: char) -> Option<Self> {
        let c = c.to_ascii_uppercase();
        MODE_TABLE.iter().find(|(code, _)| *code == c).map(|(_, m)| *m)
    }

    /// Hamlib mode name, as used by the rigctld protocol
    pub fn hamlib_name(self) -> &'static str {
        match self {
            OperatingMode::Lsb => "LSB",
            OperatingMode::Usb => "USB",
            OperatingMode::Cw => "CW",
            OperatingMode::Fm => "FM",
            OperatingMode::Am => "AM",
            OperatingMode::RttyL => "RTTY",
            OperatingMode::CwR => "CWR",
            OperatingMode::DataL => "PKTLSB",
            OperatingMode::RttyU => "RTTYR",
            OperatingMode::DataFm => "PKTFM",
            OperatingMode::FmN => "FMN",
            OperatingMode::DataU => "PKTUSB",
            OperatingMode::AmN => "AMN",
            OperatingMode::Psk => "PSK",
            OperatingMode::DataFmN => "PKTFMN",
        }
    }

    /// Parse a hamlib mode name
    pub fn from_hamlib_name(name: &str) -> Option<Self> {
        Self::all().find(|m| m.hamlib_name().eq_ignore_ascii_case(name))
    }

    /// Default passband reported to rigctld clients, in Hz
    pub fn default_passband_hz(self) -> u32 {
        match self {
            OperatingMode::Cw | OperatingMode::CwR => 500,
            OperatingMode::RttyL | OperatingMode::RttyU | OperatingMode::Psk => 500,
            OperatingMode::Am => 6000,
            OperatingMode::AmN => 3000,
            OperatingMode::Fm | OperatingMode::DataFm => 16000,
            OperatingMode::FmN | OperatingMode::DataFmN => 9000,
            OperatingMode::Lsb | OperatingMode::Usb => 2400,
            OperatingMode::DataL | OperatingMode::DataU => 3000,
        }
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.hamlib_name())
    }
}

impl FromStr for OperatingMode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hamlib_name(s).ok_or_else(|| ParseError::InvalidMode(s.to_string()))
    }
}

/// Meters the gateway reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MeterKind {
    /// S-meter of a receiver (`SM`)
    Signal(Receiver),
    /// Transmit power output (`RM5`)
    PowerOut,
    /// Standing wave ratio (`RM6`)
    Swr,
}

/// A decoded meter reading, raw 0..=255 scale
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeterReading {
    /// Which meter was read
    pub kind: MeterKind,
    /// Raw meter value
    pub value: u16,
}

/// Decoded composite information (`IF`) message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoReport {
    /// Memory channel number
    pub memory_channel: u16,
    /// Main receiver frequency in Hz
    pub frequency_hz: u64,
    /// Clarifier offset in Hz (signed)
    pub clarifier_offset: i32,
    /// RX clarifier enabled
    pub rx_clarifier: bool,
    /// TX clarifier enabled
    pub tx_clarifier: bool,
    /// Main receiver mode
    pub mode: Option<OperatingMode>,
    /// Memory mode active (false = VFO)
    pub memory_mode: bool,
    /// Split operation
    pub split: bool,
}
