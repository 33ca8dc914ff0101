//! CAT Gateway Engine
//!
//! This crate lets many clients share one half-duplex CAT link to a
//! transceiver without corrupting each other's exchanges.
//!
//! # Architecture
//!
//! - A single reader task owns the read half of the link and the
//!   [`MessageFramer`](cat_protocol::MessageFramer)
//! - The [`Multiplexer`] consumer loop owns the write half, services
//!   submissions strictly FIFO and keeps at most one command in flight
//! - Framed messages that do not answer the in-flight command go to the
//!   [`StateDispatcher`], which keeps [`RadioState`] current
//! - All events (traffic, state changes, link loss) emit through a unified
//!   [`GatewayEvent`] stream
//!
//! # Example
//!
//! ```rust,no_run
//! use cat_mux::{Gateway, GatewayConfig};
//! use cat_protocol::{codec, Receiver};
//!
//! # async fn run() -> Result<(), cat_mux::MuxError> {
//! let gateway = Gateway::open_serial("/dev/ttyUSB0", 38_400, GatewayConfig::default())?;
//! gateway.initialize().await?;
//!
//! let handle = gateway.handle();
//! let reply = handle.query("example", &codec::encode_get_frequency(Receiver::Main)).await?;
//! println!("{:?}", codec::decode_frequency(&reply));
//! # Ok(())
//! # }
//! ```

pub mod dispatcher;
pub mod error;
pub mod events;
pub mod gateway;
pub mod init;
pub mod multiplexer;
pub mod poller;
pub mod state;
pub mod transport;

pub use dispatcher::{DispatchOutcome, StateDispatcher};
pub use error::MuxError;
pub use events::{GatewayEvent, StateField};
pub use gateway::{Gateway, GatewayConfig};
pub use init::{default_init_sequence, run_init_sequence, InitReport, InitStep};
pub use multiplexer::{
    CommandRequest, MuxHandle, Multiplexer, Reply, ReplyMatch, RequestState,
    DEFAULT_COMMAND_TIMEOUT, MAX_COMMAND_TIMEOUT,
};
pub use poller::MeterPoller;
pub use state::{RadioState, ReceiverState, SharedState};
pub use transport::{open_serial, run_reader, DEFAULT_BAUD_RATE};
