//! Transceiver CAT codec
//!
//! Pure encode/decode functions for the subset of the ASCII command grammar
//! the gateway uses. Every message is `<2-letter code><params>;`.
//!
//! # Commands
//! - `FA` / `FB` - main / sub frequency, 9 digits, 1 Hz resolution: `FA014074000;`
//! - `MD` - mode, receiver digit then mode code: `MD0C;` (main, DATA-USB)
//! - `AN` - antenna, receiver digit then antenna digit: `AN01;`
//! - `PC` - transmit power setting, 3 digits in watts: `PC100;`
//! - `TX` - transmit status: `TX0;` receive, `TX1;` / `TX2;` transmitting
//! - `SM` - S-meter, receiver digit then 3 digits: `SM0120;`
//! - `RM` - auxiliary meters: `RM5xxx;` power out, `RM6xxx;` SWR
//! - `IF` - composite information
//! - `AI` - auto-information (unsolicited broadcasts) on/off
//!
//! Set commands are not acknowledged by the transceiver. Queries are the bare
//! code (plus receiver digit where applicable) and are answered with the full
//! message, so a query body is always a prefix of its reply.
//!
//! Decoders never fail loudly: malformed input yields `None` so the caller
//! keeps whatever value it knew before.

use crate::command::{InfoReport, MeterKind, MeterReading, OperatingMode, Receiver};
use crate::error::ParseError;
use crate::framer::FramedMessage;

/// Lowest frequency the transceiver tunes, in Hz
pub const MIN_FREQUENCY_HZ: u64 = 30_000;

/// Highest frequency the transceiver tunes, in Hz
pub const MAX_FREQUENCY_HZ: u64 = 75_000_000;

/// Frequency field width when encoding
const FREQ_DIGITS: usize = 9;

/// Width of the long frequency field some firmware answers with
const FREQ_DIGITS_LONG: usize = 11;

/// Transmit power range accepted by `PC`, in watts
pub const POWER_RANGE_W: std::ops::RangeInclusive<u16> = 5..=200;

/// Antenna connectors
pub const ANTENNA_RANGE: std::ops::RangeInclusive<u8> = 1..=3;

/// Check a frequency against the tunable range
pub fn validate_frequency(hz: u64) -> Result<u64, ParseError> {
    if (MIN_FREQUENCY_HZ..=MAX_FREQUENCY_HZ).contains(&hz) {
        Ok(hz)
    } else {
        Err(ParseError::FrequencyOutOfRange {
            hz,
            min: MIN_FREQUENCY_HZ,
            max: MAX_FREQUENCY_HZ,
        })
    }
}

// ---------------------------------------------------------------------------
// Frequency
// ---------------------------------------------------------------------------

/// `FA014074000;` / `FB007074000;`
pub fn encode_set_frequency(receiver: Receiver, hz: u64) -> Result<String, ParseError> {
    let hz = validate_frequency(hz)?;
    Ok(format!("{}{:09};", receiver.frequency_code(), hz))
}

/// `FA;` / `FB;`
pub fn encode_get_frequency(receiver: Receiver) -> String {
    format!("{};", receiver.frequency_code())
}

/// Decode an `FA`/`FB` report
///
/// Accepts both the 9-digit field and the 11-digit one: `FA00014074000;`.
pub fn decode_frequency(msg: &FramedMessage) -> Option<(Receiver, u64)> {
    let receiver = match msg.code() {
        "FA" => Receiver::Main,
        "FB" => Receiver::Sub,
        _ => return None,
    };
    let params = msg.params();
    if params.len() != FREQ_DIGITS && params.len() != FREQ_DIGITS_LONG {
        return None;
    }
    parse_digits(params).map(|hz| (receiver, hz))
}

// ---------------------------------------------------------------------------
// Mode
// ---------------------------------------------------------------------------

/// `MD0C;`
pub fn encode_set_mode(receiver: Receiver, mode: OperatingMode) -> String {
    format!("MD{}{};", receiver.digit(), mode.code())
}

/// `MD0;`
pub fn encode_get_mode(receiver: Receiver) -> String {
    format!("MD{};", receiver.digit())
}

/// Decode an `MD` report
pub fn decode_mode(msg: &FramedMessage) -> Option<(Receiver, OperatingMode)> {
    if msg.code() != "MD" {
        return None;
    }
    let mut chars = msg.params().chars();
    let receiver = Receiver::from_digit(chars.next()?)?;
    let mode = OperatingMode::from_code(chars.next()?)?;
    if chars.next().is_some() {
        return None;
    }
    Some((receiver, mode))
}

// ---------------------------------------------------------------------------
// Antenna
// ---------------------------------------------------------------------------

/// `AN01;`
pub fn encode_set_antenna(receiver: Receiver, antenna: u8) -> Result<String, ParseError> {
    if !ANTENNA_RANGE.contains(&antenna) {
        return Err(ParseError::OutOfRange {
            what: "antenna",
            value: antenna as i64,
        });
    }
    Ok(format!("AN{}{};", receiver.digit(), antenna))
}

/// `AN0;`
pub fn encode_get_antenna(receiver: Receiver) -> String {
    format!("AN{};", receiver.digit())
}

/// Decode an `AN` report
pub fn decode_antenna(msg: &FramedMessage) -> Option<(Receiver, u8)> {
    if msg.code() != "AN" {
        return None;
    }
    let mut chars = msg.params().chars();
    let receiver = Receiver::from_digit(chars.next()?)?;
    let antenna = chars.next()?.to_digit(10)? as u8;
    if chars.next().is_some() || !ANTENNA_RANGE.contains(&antenna) {
        return None;
    }
    Some((receiver, antenna))
}

// ---------------------------------------------------------------------------
// Transmit power
// ---------------------------------------------------------------------------

/// `PC100;`
pub fn encode_set_power(watts: u16) -> Result<String, ParseError> {
    if !POWER_RANGE_W.contains(&watts) {
        return Err(ParseError::OutOfRange {
            what: "power",
            value: watts as i64,
        });
    }
    Ok(format!("PC{:03};", watts))
}

/// `PC;`
pub fn encode_get_power() -> String {
    "PC;".to_string()
}

/// Decode a `PC` report, in watts
pub fn decode_power(msg: &FramedMessage) -> Option<u16> {
    if msg.code() != "PC" || msg.params().len() != 3 {
        return None;
    }
    parse_digits(msg.params()).and_then(|w| u16::try_from(w).ok())
}

// ---------------------------------------------------------------------------
// Meters
// ---------------------------------------------------------------------------

/// `SM0;`, `SM1;`, `RM5;`, `RM6;`
pub fn encode_get_meter(kind: MeterKind) -> String {
    match kind {
        MeterKind::Signal(receiver) => format!("SM{};", receiver.digit()),
        MeterKind::PowerOut => "RM5;".to_string(),
        MeterKind::Swr => "RM6;".to_string(),
    }
}

/// Decode an `SM` or `RM` report
pub fn decode_meter(msg: &FramedMessage) -> Option<MeterReading> {
    let params = msg.params();
    let selector = params.chars().next()?;
    let kind = match (msg.code(), selector) {
        ("SM", c) => MeterKind::Signal(Receiver::from_digit(c)?),
        ("RM", '5') => MeterKind::PowerOut,
        ("RM", '6') => MeterKind::Swr,
        _ => return None,
    };
    // Some firmware pads RM replies with trailing digits; the value is the first three
    let digits = params.get(1..4)?;
    let value = parse_digits(digits)?;
    Some(MeterReading {
        kind,
        value: u16::try_from(value).ok()?,
    })
}

// ---------------------------------------------------------------------------
// Transmit
// ---------------------------------------------------------------------------

/// `TX1;` / `TX0;`
pub fn encode_set_transmit(on: bool) -> String {
    if on {
        "TX1;".to_string()
    } else {
        "TX0;".to_string()
    }
}

/// `TX;`
pub fn encode_get_transmit() -> String {
    "TX;".to_string()
}

/// Decode a `TX` report: `true` while transmitting
pub fn decode_transmit_status(msg: &FramedMessage) -> Option<bool> {
    if msg.code() != "TX" {
        return None;
    }
    match msg.params() {
        "0" => Some(false),
        "1" | "2" => Some(true),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Composite information
// ---------------------------------------------------------------------------

/// `IF;`
pub fn encode_get_info() -> String {
    "IF;".to_string()
}

/// Decode an `IF` report
///
/// Layout after the code: memory channel (3), frequency (9), clarifier sign
/// and offset (5), RX clarifier (1), TX clarifier (1), mode (1), VFO/memory
/// (1), CTCSS (1), split (2), shift (1).
pub fn decode_composite(msg: &FramedMessage) -> Option<InfoReport> {
    if msg.code() != "IF" {
        return None;
    }
    let p = msg.params();
    if p.len() < 21 || !p.is_ascii() {
        return None;
    }

    let memory_channel = u16::try_from(parse_digits(&p[0..3])?).ok()?;
    let frequency_hz = parse_digits(&p[3..12])?;

    let sign = match &p[12..13] {
        "+" => 1,
        "-" => -1,
        _ => return None,
    };
    let clarifier_offset = parse_digits(&p[13..17])? as i32 * sign;

    let rx_clarifier = &p[17..18] == "1";
    let tx_clarifier = &p[18..19] == "1";
    let mode = p[19..20].chars().next().and_then(OperatingMode::from_code);
    let memory_mode = &p[20..21] != "0";
    let split = p.get(22..24).map(|s| s != "00").unwrap_or(false);

    Some(InfoReport {
        memory_channel,
        frequency_hz,
        clarifier_offset,
        rx_clarifier,
        tx_clarifier,
        mode,
        memory_mode,
        split,
    })
}

// ---------------------------------------------------------------------------
// Auto-information
// ---------------------------------------------------------------------------

/// `AI1;` / `AI0;`
pub fn encode_auto_info(enabled: bool) -> String {
    if enabled {
        "AI1;".to_string()
    } else {
        "AI0;".to_string()
    }
}

fn parse_digits(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}
