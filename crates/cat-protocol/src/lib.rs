//! CAT Protocol Library
//!
//! Framing and encoding for the transceiver's ASCII CAT grammar:
//! semicolon-terminated messages of the form `<2-letter code><params>;`.
//!
//! # Architecture
//!
//! - [`framer`]: a streaming framer that turns raw serial bytes into discrete
//!   [`FramedMessage`]s, keeping partial data between reads
//! - [`codec`]: stateless encode/decode functions between domain operations
//!   (set frequency, set mode, read meter...) and command text
//! - [`command`]: the domain types both sides share
//!
//! The same text means different things depending on direction:
//! - `FA014074000;` TO the radio = set main frequency
//! - `FA014074000;` FROM the radio = main frequency report
//! - `FA;` TO the radio = query main frequency
//!
//! # Example
//!
//! ```rust
//! use cat_protocol::{codec, MessageFramer, Receiver};
//!
//! let mut framer = MessageFramer::new();
//! let mut msgs = framer.feed(b"FA0140");
//! assert!(msgs.is_empty());
//! msgs = framer.feed(b"74000;");
//!
//! assert_eq!(
//!     codec::decode_frequency(&msgs[0]),
//!     Some((Receiver::Main, 14_074_000))
//! );
//! ```

pub mod codec;
pub mod command;
pub mod error;
pub mod framer;

pub use command::{InfoReport, MeterKind, MeterReading, OperatingMode, Receiver};
pub use error::{ParseError, ProtocolError};
pub use framer::{FramedMessage, MessageFramer};
