//! CAT Transceiver Simulation Library
//!
//! This crate provides a virtual transceiver for exercising the gateway
//! without physical hardware. It includes:
//!
//! - **VirtualRadio**: a state machine speaking the ASCII CAT grammar
//! - **run_virtual_radio / spawn_virtual_radio**: serve a virtual radio over
//!   an async byte stream (an in-memory duplex stands in for the serial port)
//!
//! # Example
//!
//! ```rust
//! use cat_protocol::{FramedMessage, OperatingMode, Receiver};
//! use cat_sim::VirtualRadio;
//!
//! let mut radio = VirtualRadio::new("FTDX101");
//! radio.set_auto_info(true);
//! radio.set_mode(Receiver::Main, OperatingMode::Cw);
//!
//! radio.handle_message(&FramedMessage::new("FA;"));
//! while let Some(text) = radio.take_output() {
//!     println!("Radio output: {}", text);
//! }
//! ```

pub mod radio;
pub mod radio_task;

pub use radio::{VirtualRadio, VirtualRadioConfig, ERROR_REPLY};
pub use radio_task::{
    run_virtual_radio, spawn_virtual_radio, VirtualRadioCommand, VirtualRadioHandle,
};
