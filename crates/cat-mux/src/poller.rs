//! Periodic meter polling
//!
//! The transceiver does not broadcast meter readings, so they are polled.
//! Power-out and SWR only mean something while transmitting and are skipped
//! otherwise.

use std::time::Duration;

use cat_protocol::{codec, MeterKind, Receiver};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::dispatcher::StateDispatcher;
use crate::error::MuxError;
use crate::multiplexer::MuxHandle;

/// Client id used for poll traffic
pub const POLLER_CLIENT: &str = "poller";

/// Polls meters through the multiplexer and stores the readings
pub struct MeterPoller {
    handle: MuxHandle,
    dispatcher: StateDispatcher,
    period: Duration,
}

impl MeterPoller {
    pub fn new(handle: MuxHandle, dispatcher: StateDispatcher, period: Duration) -> Self {
        Self {
            handle,
            dispatcher,
            period,
        }
    }

    /// Meters worth reading given the current transmit state
    pub fn meters(transmitting: bool) -> Vec<MeterKind> {
        let mut kinds = vec![MeterKind::Signal(Receiver::Main)];
        if transmitting {
            kinds.push(MeterKind::PowerOut);
            kinds.push(MeterKind::Swr);
        }
        kinds
    }

    /// Read each relevant meter once
    pub async fn poll_once(&self) -> Result<(), MuxError> {
        let transmitting = self.dispatcher.state().snapshot().transmitting;
        for kind in Self::meters(transmitting) {
            match self
                .handle
                .query(POLLER_CLIENT, &codec::encode_get_meter(kind))
                .await
            {
                Ok(msg) => {
                    self.dispatcher.apply_reply(&msg);
                }
                Err(e) if e.is_soft() => debug!(?kind, "meter poll failed: {}", e),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Poll until cancelled or the link goes away
    pub async fn run(self, cancel: CancellationToken) {
        if self.period.is_zero() {
            info!("Meter polling disabled");
            return;
        }

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        info!("Meter polling stopped: {}", e);
                        break;
                    }
                }
            }
        }
    }
}
