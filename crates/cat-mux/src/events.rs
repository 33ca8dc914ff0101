//! Unified event stream for the gateway
//!
//! Traffic, state changes and link lifecycle are all emitted on a single
//! broadcast channel so that observers (a traffic monitor, the push
//! notification layer) see them in one consistent order.

/// Which part of [`RadioState`](crate::RadioState) changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateField {
    /// Frequency of a receiver
    Frequency,
    /// Mode of a receiver
    Mode,
    /// Antenna selection of a receiver
    Antenna,
    /// Signal meter of a receiver
    Signal,
    /// Transmit power setting
    Power,
    /// Power output meter
    PowerOut,
    /// SWR meter
    Swr,
    /// Transmitting flag
    Transmit,
}

/// Event emitted by the gateway
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    // -------------------------------------------------------------------------
    // Traffic events (for traffic monitor)
    // -------------------------------------------------------------------------
    /// Raw bytes read from the transceiver
    DataIn {
        /// Raw data bytes
        data: Vec<u8>,
    },

    /// Command text written to the transceiver
    DataOut {
        /// Client that submitted the command
        client: String,
        /// Command text
        data: String,
    },

    // -------------------------------------------------------------------------
    // State events
    // -------------------------------------------------------------------------
    /// A field of the radio state changed
    StateChanged {
        /// What changed
        field: StateField,
    },

    /// A command got no reply in time
    CommandTimedOut {
        /// Client that submitted the command
        client: String,
        /// Command text
        command: String,
    },

    // -------------------------------------------------------------------------
    // Link events
    // -------------------------------------------------------------------------
    /// The serial link closed or failed
    Disconnected,

    /// An error occurred on the link
    Error {
        /// Source of the error
        source: String,
        /// Error message
        message: String,
    },
}

impl GatewayEvent {
    /// Check if this is a traffic event (for traffic monitor filtering)
    pub fn is_traffic(&self) -> bool {
        matches!(self, GatewayEvent::DataIn { .. } | GatewayEvent::DataOut { .. })
    }

    /// The state field this event reports, if any
    pub fn state_field(&self) -> Option<StateField> {
        match self {
            GatewayEvent::StateChanged { field } => Some(*field),
            _ => None,
        }
    }
}
