//! WSJT-X UDP message decoding
//!
//! Every datagram starts with a fixed header:
//!
//! ```text
//! magic   u32  0xADBCCBDA
//! schema  u32  2 or 3
//! type    u32  0 heartbeat, 1 status, 6 close, ...
//! id      utf8 client id
//! ```
//!
//! Integers are big-endian. A `utf8` field is a u32 byte length followed by
//! the bytes; length `0xFFFFFFFF` marks an absent string.

use thiserror::Error;

/// Datagram magic number
pub const MAGIC: u32 = 0xADBC_CBDA;

/// Schema versions this decoder accepts
pub const SUPPORTED_SCHEMAS: std::ops::RangeInclusive<u32> = 2..=3;

/// Length marking an absent string
const NULL_STRING: u32 = 0xFFFF_FFFF;

const TYPE_HEARTBEAT: u32 = 0;
const TYPE_STATUS: u32 = 1;
const TYPE_CLOSE: u32 = 6;

/// Why a datagram could not be decoded
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("datagram truncated at offset {offset} (needed {needed} more bytes)")]
    Truncated { offset: usize, needed: usize },

    #[error("bad magic {0:#010x}")]
    BadMagic(u32),

    #[error("unsupported schema {0}")]
    UnsupportedSchema(u32),

    #[error("string at offset {0} is not valid UTF-8")]
    InvalidUtf8(usize),
}

/// Decoded status report (message type 1)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    /// Client id
    pub id: String,
    /// Dial frequency in Hz
    pub dial_frequency_hz: u64,
    /// Mode name, e.g. `FT8`
    pub mode: Option<String>,
    /// Transmit enabled
    pub tx_enabled: bool,
    /// Transmitting right now
    pub transmitting: bool,
}

/// A decoded datagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Heartbeat { id: String },
    Status(StatusReport),
    Close { id: String },
    /// Any other message type; not acted upon
    Other { id: String, kind: u32 },
}

impl Message {
    /// Client id carried in the header
    pub fn id(&self) -> &str {
        match self {
            Message::Heartbeat { id } | Message::Close { id } | Message::Other { id, .. } => id,
            Message::Status(status) => &status.id,
        }
    }
}

/// Decode one datagram
pub fn decode(datagram: &[u8]) -> Result<Message, PacketError> {
    let mut r = Reader::new(datagram);

    let magic = r.u32()?;
    if magic != MAGIC {
        return Err(PacketError::BadMagic(magic));
    }
    let schema = r.u32()?;
    if !SUPPORTED_SCHEMAS.contains(&schema) {
        return Err(PacketError::UnsupportedSchema(schema));
    }
    let kind = r.u32()?;
    let id = r.utf8()?.unwrap_or_default();

    let msg = match kind {
        TYPE_HEARTBEAT => Message::Heartbeat { id },
        TYPE_STATUS => {
            let dial_frequency_hz = r.u64()?;
            let mode = r.utf8()?;
            // DX call, report, TX mode
            for _ in 0..3 {
                r.utf8()?;
            }
            let tx_enabled = r.bool()?;
            let transmitting = r.bool()?;
            Message::Status(StatusReport {
                id,
                dial_frequency_hz,
                mode,
                tx_enabled,
                transmitting,
            })
        }
        TYPE_CLOSE => Message::Close { id },
        kind => Message::Other { id, kind },
    };
    Ok(msg)
}

/// Big-endian cursor over a datagram
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], PacketError> {
        let remaining = self.buf.len() - self.pos;
        if remaining < n {
            return Err(PacketError::Truncated {
                offset: self.pos,
                needed: n - remaining,
            });
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn u32(&mut self) -> Result<u32, PacketError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64, PacketError> {
        let hi = u64::from(self.u32()?);
        let lo = u64::from(self.u32()?);
        Ok((hi << 32) | lo)
    }

    fn bool(&mut self) -> Result<bool, PacketError> {
        Ok(self.take(1)?[0] != 0)
    }

    fn utf8(&mut self) -> Result<Option<String>, PacketError> {
        let len = self.u32()?;
        if len == NULL_STRING {
            return Ok(None);
        }
        let offset = self.pos;
        let bytes = self.take(len as usize)?;
        std::str::from_utf8(bytes)
            .map(|s| Some(s.to_string()))
            .map_err(|_| PacketError::InvalidUtf8(offset))
    }
}

/// Builds datagrams in the same format, for tools and tests
#[derive(Debug, Clone)]
pub struct PacketWriter {
    buf: Vec<u8>,
}

impl PacketWriter {
    /// Start a datagram with the standard header
    pub fn new(schema: u32, kind: u32, id: &str) -> Self {
        let mut writer = Self { buf: Vec::new() };
        writer.u32(MAGIC).u32(schema).u32(kind).utf8(Some(id));
        writer
    }

    /// Heartbeat datagram
    pub fn heartbeat(id: &str) -> Vec<u8> {
        let mut w = Self::new(3, TYPE_HEARTBEAT, id);
        w.u32(3).utf8(Some("2.6.1")).utf8(Some(""));
        w.finish()
    }

    /// Status datagram with the fields the listener reads
    pub fn status(id: &str, dial_frequency_hz: u64, mode: &str, transmitting: bool) -> Vec<u8> {
        let mut w = Self::new(3, TYPE_STATUS, id);
        w.u64(dial_frequency_hz)
            .utf8(Some(mode))
            .utf8(None)
            .utf8(Some("-10"))
            .utf8(Some(mode))
            .bool(transmitting)
            .bool(transmitting)
            .bool(false);
        w.finish()
    }

    /// Close datagram
    pub fn close(id: &str) -> Vec<u8> {
        Self::new(3, TYPE_CLOSE, id).finish()
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn u64(&mut self, v: u64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn bool(&mut self, v: bool) -> &mut Self {
        self.buf.push(u8::from(v));
        self
    }

    pub fn utf8(&mut self, s: Option<&str>) -> &mut Self {
        match s {
            Some(s) => {
                self.u32(s.len() as u32);
                self.buf.extend_from_slice(s.as_bytes());
            }
            None => {
                self.u32(NULL_STRING);
            }
        }
        self
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_status() {
        let datagram = PacketWriter::status("WSJT-X", 14_074_000, "FT8", true);
        let msg = decode(&datagram).unwrap();
        assert_eq!(
            msg,
            Message::Status(StatusReport {
                id: "WSJT-X".into(),
                dial_frequency_hz: 14_074_000,
                mode: Some("FT8".into()),
                tx_enabled: true,
                transmitting: true,
            })
        );
    }

    #[test]
    fn test_decode_heartbeat_and_close() {
        assert_eq!(
            decode(&PacketWriter::heartbeat("JTDX")).unwrap(),
            Message::Heartbeat { id: "JTDX".into() }
        );
        assert_eq!(
            decode(&PacketWriter::close("JTDX")).unwrap(),
            Message::Close { id: "JTDX".into() }
        );
    }

    #[test]
    fn test_absent_strings() {
        let mut w = PacketWriter::new(2, TYPE_STATUS, "WSJT-X");
        w.u64(7_074_000)
            .utf8(None)
            .utf8(None)
            .utf8(None)
            .utf8(None)
            .bool(false)
            .bool(false);
        match decode(&w.finish()).unwrap() {
            Message::Status(status) => {
                assert_eq!(status.mode, None);
                assert_eq!(status.dial_frequency_hz, 7_074_000);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_other_types_pass_through() {
        let msg = decode(&PacketWriter::new(3, 2, "WSJT-X").finish()).unwrap();
        assert_eq!(
            msg,
            Message::Other {
                id: "WSJT-X".into(),
                kind: 2
            }
        );
    }

    #[test]
    fn test_header_rejections() {
        let mut bad_magic = PacketWriter::heartbeat("x");
        bad_magic[0] = 0;
        assert!(matches!(decode(&bad_magic), Err(PacketError::BadMagic(_))));

        let old = PacketWriter::new(1, TYPE_HEARTBEAT, "x").finish();
        assert_eq!(decode(&old), Err(PacketError::UnsupportedSchema(1)));

        assert!(matches!(
            decode(&[0xAD, 0xBC]),
            Err(PacketError::Truncated { .. })
        ));
    }

    #[test]
    fn test_truncated_status() {
        let full = PacketWriter::status("WSJT-X", 14_074_000, "FT8", false);
        for cut in 12..full.len() - 3 {
            assert!(decode(&full[..cut]).is_err(), "cut at {}", cut);
        }
    }

    #[test]
    fn test_invalid_utf8() {
        let mut w = PacketWriter::new(3, TYPE_CLOSE, "ok");
        w.u32(1);
        let mut datagram = w.finish();
        // Replace the id with a 1-byte invalid string
        datagram.truncate(12);
        datagram.extend_from_slice(&1u32.to_be_bytes());
        datagram.push(0xFF);
        assert_eq!(decode(&datagram), Err(PacketError::InvalidUtf8(16)));
    }
}
