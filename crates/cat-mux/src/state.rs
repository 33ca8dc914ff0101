//! Radio state tracking
//!
//! [`RadioState`] is the gateway's last-known view of the transceiver. It
//! lives behind a single `watch` channel: writers go through [`SharedState`],
//! readers get cloned snapshots and change notifications.

use std::sync::Arc;

use cat_protocol::{InfoReport, MeterKind, MeterReading, OperatingMode, Receiver};
use serde::Serialize;
use tokio::sync::{broadcast, watch};

use crate::events::{GatewayEvent, StateField};

/// State of one receiver
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReceiverState {
    /// Tuned frequency in Hz
    pub frequency_hz: Option<u64>,
    /// Operating mode
    pub mode: Option<OperatingMode>,
    /// Selected antenna (1-3)
    pub antenna: Option<u8>,
    /// Raw S-meter level (0-255)
    pub signal: Option<u16>,
}

/// Last-known transceiver state
///
/// Every field starts unknown; values are last-writer-wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RadioState {
    /// Main receiver
    pub main: ReceiverState,
    /// Sub receiver
    pub sub: ReceiverState,
    /// Transmit power setting in watts
    pub power_w: Option<u16>,
    /// Raw power output meter (0-255)
    pub power_out: Option<u16>,
    /// Raw SWR meter (0-255)
    pub swr: Option<u16>,
    /// Transmitting
    pub transmitting: bool,
}

impl RadioState {
    /// State of one receiver
    pub fn receiver(&self, receiver: Receiver) -> &ReceiverState {
        match receiver {
            Receiver::Main => &self.main,
            Receiver::Sub => &self.sub,
        }
    }

    fn receiver_mut(&mut self, receiver: Receiver) -> &mut ReceiverState {
        match receiver {
            Receiver::Main => &mut self.main,
            Receiver::Sub => &mut self.sub,
        }
    }
}

/// Writer side of the radio state
///
/// Cheap to clone; every clone writes the same channel. Each setter returns
/// whether the stored value actually changed, and only then are watchers
/// notified and a [`GatewayEvent::StateChanged`] emitted.
#[derive(Debug, Clone)]
pub struct SharedState {
    tx: Arc<watch::Sender<RadioState>>,
    events: broadcast::Sender<GatewayEvent>,
}

impl SharedState {
    /// Create a fresh, all-unknown state
    pub fn new(events: broadcast::Sender<GatewayEvent>) -> Self {
        let (tx, _rx) = watch::channel(RadioState::default());
        Self {
            tx: Arc::new(tx),
            events,
        }
    }

    /// Clone of the current state
    pub fn snapshot(&self) -> RadioState {
        self.tx.borrow().clone()
    }

    /// Subscribe to state changes
    pub fn subscribe(&self) -> watch::Receiver<RadioState> {
        self.tx.subscribe()
    }

    pub fn set_frequency(&self, receiver: Receiver, hz: u64) -> bool {
        self.update(StateField::Frequency, |s| {
            replace(&mut s.receiver_mut(receiver).frequency_hz, Some(hz))
        })
    }

    pub fn set_mode(&self, receiver: Receiver, mode: OperatingMode) -> bool {
        self.update(StateField::Mode, |s| {
            replace(&mut s.receiver_mut(receiver).mode, Some(mode))
        })
    }

    pub fn set_antenna(&self, receiver: Receiver, antenna: u8) -> bool {
        self.update(StateField::Antenna, |s| {
            replace(&mut s.receiver_mut(receiver).antenna, Some(antenna))
        })
    }

    pub fn set_power(&self, watts: u16) -> bool {
        self.update(StateField::Power, |s| replace(&mut s.power_w, Some(watts)))
    }

    pub fn set_transmitting(&self, on: bool) -> bool {
        self.update(StateField::Transmit, |s| replace(&mut s.transmitting, on))
    }

    /// Store a meter reading in the field its kind targets
    pub fn set_meter(&self, reading: MeterReading) -> bool {
        let value = Some(reading.value);
        match reading.kind {
            MeterKind::Signal(receiver) => self.update(StateField::Signal, |s| {
                replace(&mut s.receiver_mut(receiver).signal, value)
            }),
            MeterKind::PowerOut => {
                self.update(StateField::PowerOut, |s| replace(&mut s.power_out, value))
            }
            MeterKind::Swr => self.update(StateField::Swr, |s| replace(&mut s.swr, value)),
        }
    }

    /// Apply a composite report to the main receiver
    ///
    /// Only frequency and mode are tracked from `IF`; the clarifier and
    /// memory fields have no place in [`RadioState`].
    pub fn apply_info(&self, info: &InfoReport) -> bool {
        let freq = self.set_frequency(Receiver::Main, info.frequency_hz);
        let mode = match info.mode {
            Some(mode) => self.set_mode(Receiver::Main, mode),
            None => false,
        };
        freq || mode
    }

    fn update(&self, field: StateField, f: impl FnOnce(&mut RadioState) -> bool) -> bool {
        let changed = self.tx.send_if_modified(f);
        if changed {
            let _ = self.events.send(GatewayEvent::StateChanged { field });
        }
        changed
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared() -> (SharedState, broadcast::Receiver<GatewayEvent>) {
        let (tx, rx) = broadcast::channel(16);
        (SharedState::new(tx), rx)
    }

    #[test]
    fn test_initial_state_unknown() {
        let (state, _) = shared();
        let snap = state.snapshot();
        assert_eq!(snap.main.frequency_hz, None);
        assert_eq!(snap.sub.mode, None);
        assert!(!snap.transmitting);
    }

    #[test]
    fn test_setter_reports_change_once() {
        let (state, mut events) = shared();
        assert!(state.set_frequency(Receiver::Main, 14_074_000));
        assert!(!state.set_frequency(Receiver::Main, 14_074_000));
        assert_eq!(state.snapshot().main.frequency_hz, Some(14_074_000));
        assert_eq!(state.snapshot().sub.frequency_hz, None);

        let event = events.try_recv().unwrap();
        assert_eq!(event.state_field(), Some(StateField::Frequency));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_meter_targets_field() {
        let (state, _) = shared();
        state.set_meter(MeterReading {
            kind: MeterKind::Signal(Receiver::Sub),
            value: 130,
        });
        state.set_meter(MeterReading {
            kind: MeterKind::Swr,
            value: 20,
        });
        let snap = state.snapshot();
        assert_eq!(snap.sub.signal, Some(130));
        assert_eq!(snap.main.signal, None);
        assert_eq!(snap.swr, Some(20));
        assert_eq!(snap.power_out, None);
    }

    #[tokio::test]
    async fn test_watchers_notified_only_on_change() {
        let (state, _) = shared();
        let mut rx = state.subscribe();
        rx.borrow_and_update();

        state.set_transmitting(false);
        assert!(!rx.has_changed().unwrap());

        state.set_transmitting(true);
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().transmitting);
    }

    #[test]
    fn test_apply_info_updates_main() {
        let (state, _) = shared();
        let info = InfoReport {
            memory_channel: 1,
            frequency_hz: 7_030_000,
            clarifier_offset: 0,
            rx_clarifier: false,
            tx_clarifier: false,
            mode: Some(OperatingMode::Cw),
            memory_mode: false,
            split: false,
        };
        assert!(state.apply_info(&info));
        let snap = state.snapshot();
        assert_eq!(snap.main.frequency_hz, Some(7_030_000));
        assert_eq!(snap.main.mode, Some(OperatingMode::Cw));
    }
}
