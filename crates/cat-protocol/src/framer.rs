//! Incremental message framer
//!
//! Turns the raw byte stream coming off the serial link into discrete
//! `;`-terminated messages. Partial messages are kept across calls, so the
//! emitted sequence does not depend on how the stream was chunked.

use std::time::Instant;

/// Message terminator
pub const TERMINATOR: u8 = b';';

/// Shortest message worth emitting (a bare two-letter code)
pub const MIN_MESSAGE_LEN: usize = 2;

/// Longest partial message kept before it is considered line noise
const MAX_PARTIAL_LEN: usize = 256;

/// One complete protocol message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramedMessage {
    text: String,
    received_at: Instant,
}

impl FramedMessage {
    /// Build a message from its text, terminator included or not
    pub fn new(text: impl Into<String>) -> Self {
        let mut text = text.into();
        if !text.ends_with(';') {
            text.push(';');
        }
        Self {
            text,
            received_at: Instant::now(),
        }
    }

    /// Full message text including the terminator, e.g. `FA014074000;`
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Message body without the terminator
    pub fn body(&self) -> &str {
        self.text.strip_suffix(';').unwrap_or(&self.text)
    }

    /// Two-letter leading command code
    pub fn code(&self) -> &str {
        self.body().get(..2).unwrap_or("")
    }

    /// Parameters following the command code
    pub fn params(&self) -> &str {
        self.body().get(2..).unwrap_or("")
    }

    /// When the terminator for this message arrived
    pub fn received_at(&self) -> Instant {
        self.received_at
    }
}

/// Streaming framer for `;`-terminated messages
#[derive(Debug, Default)]
pub struct MessageFramer {
    buffer: Vec<u8>,
}

impl MessageFramer {
    /// Create an empty framer
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(64),
        }
    }

    /// Append a chunk and return every message it completes, in arrival order
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<FramedMessage> {
        let mut messages = Vec::new();

        for &byte in chunk {
            match byte {
                TERMINATOR => {
                    if let Some(msg) = self.take_segment() {
                        messages.push(msg);
                    }
                }
                b'\r' | b'\n' | 0 => {}
                _ => {
                    if self.buffer.len() >= MAX_PARTIAL_LEN {
                        tracing::warn!(
                            len = self.buffer.len(),
                            "framer buffer overflow without terminator, discarding"
                        );
                        self.buffer.clear();
                    }
                    self.buffer.push(byte);
                }
            }
        }

        messages
    }

    /// Bytes of the current partial message
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any partial message
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    fn take_segment(&mut self) -> Option<FramedMessage> {
        let bytes = std::mem::take(&mut self.buffer);
        if bytes.len() < MIN_MESSAGE_LEN {
            if !bytes.is_empty() {
                tracing::debug!(segment = ?bytes, "discarding short segment");
            }
            return None;
        }
        let text = String::from_utf8_lossy(&bytes).into_owned();
        Some(FramedMessage::new(text))
    }
}
