//! Gateway assembly
//!
//! Wires a link to the reader task, the multiplexer consumer loop, the state
//! dispatcher and the meter poller, and hands out the collaborator-facing
//! pieces: a [`MuxHandle`] for submissions, a `watch` receiver for state and a
//! `broadcast` receiver for events.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::dispatcher::StateDispatcher;
use crate::error::MuxError;
use crate::events::GatewayEvent;
use crate::init::{default_init_sequence, run_init_sequence, InitReport};
use crate::multiplexer::{MuxHandle, Multiplexer, DEFAULT_COMMAND_TIMEOUT};
use crate::poller::MeterPoller;
use crate::state::{RadioState, SharedState};
use crate::transport;

/// Runtime knobs for a gateway instance
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Per-command reply timeout
    pub command_timeout: Duration,
    /// Meter poll period; zero disables polling
    pub meter_poll_interval: Duration,
    /// Capacity of the event broadcast channel
    pub event_capacity: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            meter_poll_interval: Duration::from_millis(1000),
            event_capacity: 256,
        }
    }
}

/// A running gateway bound to one transceiver link
pub struct Gateway {
    handle: MuxHandle,
    state: SharedState,
    dispatcher: StateDispatcher,
    events: broadcast::Sender<GatewayEvent>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Gateway {
    /// Start the gateway on an already-open link
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<T>(io: T, config: GatewayConfig) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (events, _) = broadcast::channel(config.event_capacity);
        let state = SharedState::new(events.clone());
        let dispatcher = StateDispatcher::new(state.clone());
        let cancel = CancellationToken::new();

        let (reader, writer) = tokio::io::split(io);
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();

        let (mux, handle) = Multiplexer::new(
            writer,
            frames_rx,
            dispatcher.clone(),
            events.clone(),
            cancel.clone(),
            config.command_timeout,
        );

        let mut tasks = vec![
            tokio::spawn(transport::run_reader(
                reader,
                frames_tx,
                events.clone(),
                cancel.clone(),
            )),
            tokio::spawn(mux.run()),
        ];

        if !config.meter_poll_interval.is_zero() {
            let poller = MeterPoller::new(
                handle.clone(),
                dispatcher.clone(),
                config.meter_poll_interval,
            );
            tasks.push(tokio::spawn(poller.run(cancel.clone())));
        }

        Self {
            handle,
            state,
            dispatcher,
            events,
            cancel,
            tasks,
        }
    }

    /// Open a serial port and start the gateway on it
    pub fn open_serial(port: &str, baud_rate: u32, config: GatewayConfig) -> Result<Self, MuxError> {
        let stream = transport::open_serial(port, baud_rate)?;
        Ok(Self::start(stream, config))
    }

    /// Run the default startup sequence
    pub async fn initialize(&self) -> Result<InitReport, MuxError> {
        run_init_sequence(&self.handle, &self.dispatcher, &default_init_sequence()).await
    }

    /// Submission handle
    pub fn handle(&self) -> MuxHandle {
        self.handle.clone()
    }

    /// State receiver for snapshots and change notification
    pub fn state(&self) -> watch::Receiver<RadioState> {
        self.state.subscribe()
    }

    /// Clone of the current state
    pub fn snapshot(&self) -> RadioState {
        self.state.snapshot()
    }

    /// Writer side of the state, for optimistic updates after sets
    pub fn shared_state(&self) -> SharedState {
        self.state.clone()
    }

    pub fn dispatcher(&self) -> StateDispatcher {
        self.dispatcher.clone()
    }

    /// Subscribe to gateway events
    pub fn events(&self) -> broadcast::Receiver<GatewayEvent> {
        self.events.subscribe()
    }

    /// Cancellation token shared by every gateway task
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop every task and wait for them to finish
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                debug!("gateway task ended abnormally: {}", e);
            }
        }
    }
}
