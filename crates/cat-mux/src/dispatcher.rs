//! State dispatcher
//!
//! Routes messages nobody asked for (auto-information broadcasts, stray
//! replies) into [`RadioState`](crate::RadioState). The routing table is
//! fixed: one handler per leading command code.

use cat_protocol::{codec, FramedMessage};
use tracing::{debug, trace, warn};

use crate::state::SharedState;

/// What applying a message did to the state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// At least one field changed
    Updated,
    /// Decoded, but the state already held these values
    Unchanged,
    /// No handler for this command code
    Unknown,
    /// A handler exists but the parameters did not decode
    Malformed,
}

/// Decodes `msg` and writes the result; `None` when it does not decode
type Handler = fn(&SharedState, &FramedMessage) -> Option<bool>;

const HANDLERS: &[(&str, Handler)] = &[
    ("FA", apply_frequency),
    ("FB", apply_frequency),
    ("MD", apply_mode),
    ("AN", apply_antenna),
    ("SM", apply_meter),
    ("RM", apply_meter),
    ("PC", apply_power),
    ("TX", apply_transmit),
    ("IF", apply_info),
];

/// Applies decoded device messages to the shared radio state
#[derive(Debug, Clone)]
pub struct StateDispatcher {
    state: SharedState,
}

impl StateDispatcher {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }

    /// The state this dispatcher writes
    pub fn state(&self) -> &SharedState {
        &self.state
    }

    /// Handle a message no in-flight command claimed
    pub fn on_unclaimed_message(&self, msg: &FramedMessage) -> DispatchOutcome {
        trace!(text = msg.text(), "unsolicited message");
        self.apply(msg)
    }

    /// Apply a reply a command issuer received (used to prime state)
    pub fn apply_reply(&self, msg: &FramedMessage) -> DispatchOutcome {
        self.apply(msg)
    }

    fn apply(&self, msg: &FramedMessage) -> DispatchOutcome {
        let code = msg.code();
        let Some((_, handler)) = HANDLERS.iter().find(|(c, _)| *c == code) else {
            debug!(code, text = msg.text(), "ignoring message with unknown code");
            return DispatchOutcome::Unknown;
        };

        match handler(&self.state, msg) {
            Some(true) => DispatchOutcome::Updated,
            Some(false) => DispatchOutcome::Unchanged,
            None => {
                warn!(code, text = msg.text(), "failed to decode message, state left unchanged");
                DispatchOutcome::Malformed
            }
        }
    }
}

fn apply_frequency(state: &SharedState, msg: &FramedMessage) -> Option<bool> {
    let (receiver, hz) = codec::decode_frequency(msg)?;
    Some(state.set_frequency(receiver, hz))
}

fn apply_mode(state: &SharedState, msg: &FramedMessage) -> Option<bool> {
    let (receiver, mode) = codec::decode_mode(msg)?;
    Some(state.set_mode(receiver, mode))
}

fn apply_antenna(state: &SharedState, msg: &FramedMessage) -> Option<bool> {
    let (receiver, antenna) = codec::decode_antenna(msg)?;
    Some(state.set_antenna(receiver, antenna))
}

fn apply_meter(state: &SharedState, msg: &FramedMessage) -> Option<bool> {
    let reading = codec::decode_meter(msg)?;
    Some(state.set_meter(reading))
}

fn apply_power(state: &SharedState, msg: &FramedMessage) -> Option<bool> {
    let watts = codec::decode_power(msg)?;
    Some(state.set_power(watts))
}

fn apply_transmit(state: &SharedState, msg: &FramedMessage) -> Option<bool> {
    let on = codec::decode_transmit_status(msg)?;
    Some(state.set_transmitting(on))
}

fn apply_info(state: &SharedState, msg: &FramedMessage) -> Option<bool> {
    let info = codec::decode_composite(msg)?;
    Some(state.apply_info(&info))
}
