//! Virtual transceiver
//!
//! A state machine that speaks the transceiver's ASCII CAT grammar: it
//! answers queries, applies set commands (which the real radio never
//! acknowledges) and, with auto-information on, broadcasts every state
//! change the way the hardware does.

use std::collections::{HashSet, VecDeque};
use std::time::Instant;

use cat_protocol::{codec, FramedMessage, MeterKind, OperatingMode, Receiver};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Reply sent for commands the radio does not understand
pub const ERROR_REPLY: &str = "?;";

/// Configuration for creating a virtual radio
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualRadioConfig {
    /// Display name/identifier
    pub id: String,
    /// Initial main frequency in Hz
    pub main_frequency_hz: u64,
    /// Initial sub frequency in Hz
    pub sub_frequency_hz: u64,
    /// Initial main mode
    pub main_mode: OperatingMode,
    /// Initial sub mode
    pub sub_mode: OperatingMode,
    /// Initial power setting in watts
    pub power_w: u16,
    /// Initial S-meter level (0-255)
    pub signal: u16,
    /// Command codes the radio silently ignores (to exercise timeouts)
    pub unanswered: Vec<String>,
}

impl Default for VirtualRadioConfig {
    fn default() -> Self {
        Self {
            id: "Virtual FTDX101".to_string(),
            main_frequency_hz: 14_074_000, // 20m FT8
            sub_frequency_hz: 7_074_000,
            main_mode: OperatingMode::DataU,
            sub_mode: OperatingMode::DataU,
            power_w: 100,
            signal: 130,
            unanswered: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
struct ReceiverSim {
    frequency_hz: u64,
    mode: OperatingMode,
    antenna: u8,
    signal: u16,
}

/// A simulated transceiver
#[derive(Debug)]
pub struct VirtualRadio {
    id: String,
    main: ReceiverSim,
    sub: ReceiverSim,
    power_w: u16,
    transmitting: bool,
    auto_info: bool,
    unanswered: HashSet<String>,
    /// Pending output messages, terminator included
    pending_output: VecDeque<String>,
    last_change: Instant,
}

impl VirtualRadio {
    /// Create a virtual radio with default settings
    pub fn new(id: impl Into<String>) -> Self {
        let config = VirtualRadioConfig {
            id: id.into(),
            ..Default::default()
        };
        Self::from_config(config)
    }

    /// Create a virtual radio from configuration
    pub fn from_config(config: VirtualRadioConfig) -> Self {
        Self {
            id: config.id,
            main: ReceiverSim {
                frequency_hz: config.main_frequency_hz,
                mode: config.main_mode,
                antenna: 1,
                signal: config.signal,
            },
            sub: ReceiverSim {
                frequency_hz: config.sub_frequency_hz,
                mode: config.sub_mode,
                antenna: 1,
                signal: 0,
            },
            power_w: config.power_w,
            transmitting: false,
            auto_info: false,
            unanswered: config.unanswered.into_iter().collect(),
            pending_output: VecDeque::new(),
            last_change: Instant::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn frequency_hz(&self, receiver: Receiver) -> u64 {
        self.receiver(receiver).frequency_hz
    }

    pub fn mode(&self, receiver: Receiver) -> OperatingMode {
        self.receiver(receiver).mode
    }

    pub fn antenna(&self, receiver: Receiver) -> u8 {
        self.receiver(receiver).antenna
    }

    pub fn power_w(&self) -> u16 {
        self.power_w
    }

    pub fn transmitting(&self) -> bool {
        self.transmitting
    }

    pub fn auto_info(&self) -> bool {
        self.auto_info
    }

    /// Get the time of last state change
    pub fn last_change(&self) -> Instant {
        self.last_change
    }

    /// Turn auto-information on or off, as `AI1;` / `AI0;` would
    pub fn set_auto_info(&mut self, enabled: bool) {
        self.auto_info = enabled;
    }

    /// Tune from the front panel; broadcast if auto-information is on
    pub fn set_frequency(&mut self, receiver: Receiver, hz: u64) {
        if self.receiver(receiver).frequency_hz != hz {
            self.receiver_mut(receiver).frequency_hz = hz;
            self.touch();
            self.broadcast(frequency_report(receiver, hz));
        }
    }

    /// Change mode from the front panel; broadcast if auto-information is on
    pub fn set_mode(&mut self, receiver: Receiver, mode: OperatingMode) {
        if self.receiver(receiver).mode != mode {
            self.receiver_mut(receiver).mode = mode;
            self.touch();
            self.broadcast(codec::encode_set_mode(receiver, mode));
        }
    }

    /// Key or unkey; broadcast if auto-information is on
    pub fn set_transmitting(&mut self, on: bool) {
        if self.transmitting != on {
            self.transmitting = on;
            self.touch();
            self.broadcast(codec::encode_set_transmit(on));
        }
    }

    /// Set the S-meter level reported for a receiver
    pub fn set_signal(&mut self, receiver: Receiver, level: u16) {
        self.receiver_mut(receiver).signal = level.min(255);
    }

    /// Process one message written to the radio
    pub fn handle_message(&mut self, msg: &FramedMessage) {
        let code = msg.code().to_ascii_uppercase();
        if self.unanswered.contains(&code) {
            debug!("Virtual radio {} ignoring {}", self.id, msg.text());
            return;
        }

        let params = msg.params();
        let handled = match code.as_str() {
            "FA" | "FB" => self.handle_frequency(&code, params),
            "MD" => self.handle_mode(params),
            "AN" => self.handle_antenna(params),
            "PC" => self.handle_power(params),
            "TX" => self.handle_transmit(params),
            "SM" => self.handle_signal(params),
            "RM" => self.handle_aux_meter(params),
            "IF" if params.is_empty() => {
                let report = self.info_report();
                self.reply(report);
                true
            }
            "AI" => self.handle_auto_info(params),
            _ => false,
        };

        if !handled {
            debug!("Virtual radio {} rejecting {}", self.id, msg.text());
            self.reply(ERROR_REPLY.to_string());
        }
    }

    /// Take the next pending output message
    pub fn take_output(&mut self) -> Option<String> {
        self.pending_output.pop_front()
    }

    /// Check if there is pending output
    pub fn has_output(&self) -> bool {
        !self.pending_output.is_empty()
    }

    /// Get the number of pending output messages
    pub fn output_count(&self) -> usize {
        self.pending_output.len()
    }

    /// Clear all pending output
    pub fn clear_output(&mut self) {
        self.pending_output.clear();
    }

    /// Composite `IF` report for the main receiver
    pub fn info_report(&self) -> String {
        format!(
            "IF001{:09}+000000{}00000;",
            self.main.frequency_hz,
            self.main.mode.code()
        )
    }

    /// Format state for display
    pub fn state_summary(&self) -> String {
        format!(
            "{} - {:.3} MHz {} / {:.3} MHz {}{}",
            self.id,
            self.main.frequency_hz as f64 / 1_000_000.0,
            self.main.mode,
            self.sub.frequency_hz as f64 / 1_000_000.0,
            self.sub.mode,
            if self.transmitting { " [TX]" } else { "" }
        )
    }

    // -------------------------------------------------------------------------
    // Command handlers; `false` means "answer with ?;"
    // -------------------------------------------------------------------------

    fn handle_frequency(&mut self, code: &str, params: &str) -> bool {
        let receiver = if code == "FA" {
            Receiver::Main
        } else {
            Receiver::Sub
        };
        if params.is_empty() {
            self.reply(frequency_report(receiver, self.frequency_hz(receiver)));
            return true;
        }
        let msg = FramedMessage::new(format!("{}{}", code, params));
        match codec::decode_frequency(&msg).filter(|(_, hz)| codec::validate_frequency(*hz).is_ok()) {
            Some((receiver, hz)) => {
                self.set_frequency(receiver, hz);
                true
            }
            None => false,
        }
    }

    fn handle_mode(&mut self, params: &str) -> bool {
        if params.len() == 1 {
            return match receiver_param(params) {
                Some(receiver) => {
                    self.reply(codec::encode_set_mode(receiver, self.mode(receiver)));
                    true
                }
                None => false,
            };
        }
        match codec::decode_mode(&FramedMessage::new(format!("MD{}", params))) {
            Some((receiver, mode)) => {
                self.set_mode(receiver, mode);
                true
            }
            None => false,
        }
    }

    fn handle_antenna(&mut self, params: &str) -> bool {
        if params.len() == 1 {
            return match receiver_param(params) {
                Some(receiver) => {
                    let antenna = self.antenna(receiver);
                    self.reply(format!("AN{}{};", receiver.digit(), antenna));
                    true
                }
                None => false,
            };
        }
        match codec::decode_antenna(&FramedMessage::new(format!("AN{}", params))) {
            Some((receiver, antenna)) => {
                if self.antenna(receiver) != antenna {
                    self.receiver_mut(receiver).antenna = antenna;
                    self.touch();
                    self.broadcast(format!("AN{}{};", receiver.digit(), antenna));
                }
                true
            }
            None => false,
        }
    }

    fn handle_power(&mut self, params: &str) -> bool {
        if params.is_empty() {
            self.reply(format!("PC{:03};", self.power_w));
            return true;
        }
        match codec::decode_power(&FramedMessage::new(format!("PC{}", params))) {
            Some(watts) if codec::POWER_RANGE_W.contains(&watts) => {
                if self.power_w != watts {
                    self.power_w = watts;
                    self.touch();
                    self.broadcast(format!("PC{:03};", watts));
                }
                true
            }
            _ => false,
        }
    }

    fn handle_transmit(&mut self, params: &str) -> bool {
        match params {
            "" => {
                let status = if self.transmitting { "TX1;" } else { "TX0;" };
                self.reply(status.to_string());
                true
            }
            "0" => {
                self.set_transmitting(false);
                true
            }
            "1" | "2" => {
                self.set_transmitting(true);
                true
            }
            _ => false,
        }
    }

    fn handle_signal(&mut self, params: &str) -> bool {
        match (params.len(), receiver_param(params)) {
            (1, Some(receiver)) => {
                let level = if self.transmitting {
                    0
                } else {
                    self.receiver(receiver).signal
                };
                self.reply(meter_report(MeterKind::Signal(receiver), level));
                true
            }
            _ => false,
        }
    }

    fn handle_aux_meter(&mut self, params: &str) -> bool {
        let (kind, level) = match params {
            "5" => (
                MeterKind::PowerOut,
                if self.transmitting {
                    (self.power_w * 255 / 200).min(255)
                } else {
                    0
                },
            ),
            "6" => (MeterKind::Swr, if self.transmitting { 20 } else { 0 }),
            _ => return false,
        };
        self.reply(meter_report(kind, level));
        true
    }

    fn handle_auto_info(&mut self, params: &str) -> bool {
        match params {
            "" => {
                self.reply(codec::encode_auto_info(self.auto_info));
                true
            }
            "0" => {
                self.auto_info = false;
                true
            }
            "1" => {
                self.auto_info = true;
                true
            }
            _ => false,
        }
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    fn receiver(&self, receiver: Receiver) -> &ReceiverSim {
        match receiver {
            Receiver::Main => &self.main,
            Receiver::Sub => &self.sub,
        }
    }

    fn receiver_mut(&mut self, receiver: Receiver) -> &mut ReceiverSim {
        match receiver {
            Receiver::Main => &mut self.main,
            Receiver::Sub => &mut self.sub,
        }
    }

    fn touch(&mut self) {
        self.last_change = Instant::now();
    }

    fn reply(&mut self, text: String) {
        self.pending_output.push_back(text);
    }

    fn broadcast(&mut self, text: String) {
        if self.auto_info {
            self.pending_output.push_back(text);
        }
    }
}

fn receiver_param(params: &str) -> Option<Receiver> {
    params.chars().next().and_then(Receiver::from_digit)
}

fn frequency_report(receiver: Receiver, hz: u64) -> String {
    format!("{}{:09};", receiver.frequency_code(), hz)
}

fn meter_report(kind: MeterKind, level: u16) -> String {
    // Query text minus its terminator is the reply prefix
    let query = codec::encode_get_meter(kind);
    format!("{}{:03};", query.trim_end_matches(';'), level.min(255))
}
