//! Command multiplexer
//!
//! Many submitters share one half-duplex link. Submissions go into a single
//! FIFO queue; one consumer loop owns the write half of the link and services
//! the queue strictly in order, with at most one command in flight. A reply
//! is the first framed message that matches the in-flight command; every
//! other message goes to the [`StateDispatcher`].
//!
//! ```text
//!   rigctld ─┐                       ┌─────────── consumer loop ───────────┐
//!   wsjtx  ──┼─► queue (mpsc) ──────►│ dequeue ─► write ─► await match     │──► link
//!   poller ──┘                       │                 ▲                   │
//!                                    │  reader frames ─┴─► dispatcher      │◄── link
//!                                    └─────────────────────────────────────┘
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cat_protocol::{FramedMessage, ProtocolError};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dispatcher::StateDispatcher;
use crate::error::MuxError;
use crate::events::GatewayEvent;

/// Default time a command may wait for its reply
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(1);

/// Longest reply timeout a command may ask for; larger values are clamped
pub const MAX_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// How a reply to a command is recognised
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyMatch {
    /// The device does not answer; the command completes once written
    None,
    /// The reply body starts with this text
    Prefix(String),
}

impl ReplyMatch {
    /// Matcher for a query: the reply starts with the query body
    ///
    /// `FA;` is answered by `FA014074000;`, `SM0;` by `SM0120;`.
    pub fn for_query(text: &str) -> Self {
        ReplyMatch::Prefix(text.trim_end_matches(';').to_string())
    }

    /// Whether `msg` is the reply this matcher waits for
    pub fn matches(&self, msg: &FramedMessage) -> bool {
        match self {
            ReplyMatch::None => false,
            ReplyMatch::Prefix(prefix) => msg.body().starts_with(prefix.as_str()),
        }
    }

    /// Whether a reply is expected at all
    pub fn expects_reply(&self) -> bool {
        !matches!(self, ReplyMatch::None)
    }
}

/// Successful completion of a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// The matching reply
    Message(FramedMessage),
    /// Written; no reply expected
    Written,
}

/// Lifecycle of a queued command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Queued,
    InFlight,
    Completed,
    TimedOut,
}

/// One submitted command, owned by the multiplexer until it completes
#[derive(Debug)]
pub struct CommandRequest {
    /// Monotonic request id
    pub id: u64,
    /// Submitting client
    pub client: String,
    /// Encoded command text
    pub text: String,
    /// Reply matcher
    pub expect: ReplyMatch,
    /// How long the reply may take once the command is written
    pub timeout: Duration,
    /// When the command was submitted
    pub submitted_at: Instant,
    /// Current lifecycle state
    pub state: RequestState,
    reply: oneshot::Sender<Result<Reply, MuxError>>,
}

impl CommandRequest {
    /// Hand the result to the submitter; a submitter that stopped waiting is ignored
    fn complete(mut self, result: Result<Reply, MuxError>) {
        self.state = match result {
            Err(MuxError::Timeout { .. }) => RequestState::TimedOut,
            _ => RequestState::Completed,
        };
        debug!(
            id = self.id,
            client = %self.client,
            state = ?self.state,
            elapsed_ms = self.submitted_at.elapsed().as_millis() as u64,
            "command finished"
        );
        let _ = self.reply.send(result);
    }
}

/// Submission side of the multiplexer
///
/// Cheap to clone; hand one to every collaborator.
#[derive(Debug, Clone)]
pub struct MuxHandle {
    queue: mpsc::UnboundedSender<CommandRequest>,
    connected: Arc<AtomicBool>,
    next_id: Arc<AtomicU64>,
    default_timeout: Duration,
}

impl MuxHandle {
    /// Whether the link is currently open
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Timeout used by [`query`](Self::query) and [`send_set`](Self::send_set)
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Queue a command and wait for its completion
    ///
    /// The wait is bounded by `timeout` measured from submission, so a caller
    /// stuck behind a slow queue still returns on time. The command itself
    /// stays queued and runs later; its late result is discarded.
    pub async fn submit(
        &self,
        client: &str,
        text: impl Into<String>,
        expect: ReplyMatch,
        timeout: Duration,
    ) -> Result<Reply, MuxError> {
        let timeout = timeout.min(MAX_COMMAND_TIMEOUT);
        let (text, rx) = self.enqueue(client, text.into(), expect, timeout)?;
        wait(rx, text, timeout).await
    }

    /// Like [`submit`](Self::submit), but the caller may stop waiting early
    ///
    /// Cancelling only abandons the wait; the queued command still runs.
    pub async fn submit_with_cancel(
        &self,
        client: &str,
        text: impl Into<String>,
        expect: ReplyMatch,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Reply, MuxError> {
        let timeout = timeout.min(MAX_COMMAND_TIMEOUT);
        let (text, rx) = self.enqueue(client, text.into(), expect, timeout)?;
        tokio::select! {
            _ = cancel.cancelled() => Err(MuxError::Cancelled),
            result = wait(rx, text, timeout) => result,
        }
    }

    /// Send a query and return its reply message
    pub async fn query(&self, client: &str, text: &str) -> Result<FramedMessage, MuxError> {
        let expect = ReplyMatch::for_query(text);
        match self.submit(client, text, expect, self.default_timeout).await? {
            Reply::Message(msg) => Ok(msg),
            Reply::Written => Err(ProtocolError::InvalidResponse(format!(
                "no reply message for {}",
                text
            ))
            .into()),
        }
    }

    /// Send a command the device does not acknowledge
    pub async fn send_set(&self, client: &str, text: &str) -> Result<(), MuxError> {
        self.submit(client, text, ReplyMatch::None, self.default_timeout)
            .await
            .map(|_| ())
    }

    fn enqueue(
        &self,
        client: &str,
        text: String,
        expect: ReplyMatch,
        timeout: Duration,
    ) -> Result<(String, oneshot::Receiver<Result<Reply, MuxError>>), MuxError> {
        if !self.is_connected() {
            return Err(MuxError::NotConnected);
        }

        let (tx, rx) = oneshot::channel();
        let request = CommandRequest {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            client: client.to_string(),
            text: text.clone(),
            expect,
            timeout,
            submitted_at: Instant::now(),
            state: RequestState::Queued,
            reply: tx,
        };
        debug!(id = request.id, client, text = %request.text, "queueing command");
        self.queue
            .send(request)
            .map_err(|_| MuxError::NotConnected)?;
        Ok((text, rx))
    }
}

async fn wait(
    rx: oneshot::Receiver<Result<Reply, MuxError>>,
    command: String,
    timeout: Duration,
) -> Result<Reply, MuxError> {
    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(result)) => result,
        // Consumer dropped the request: the link went away
        Ok(Err(_)) => Err(MuxError::NotConnected),
        Err(_) => Err(MuxError::Timeout {
            command,
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

struct InFlight {
    request: CommandRequest,
    deadline: Instant,
}

/// The consumer loop: sole owner of the link's write half
pub struct Multiplexer<W> {
    writer: W,
    queue: mpsc::UnboundedReceiver<CommandRequest>,
    frames: mpsc::UnboundedReceiver<FramedMessage>,
    dispatcher: StateDispatcher,
    events: broadcast::Sender<GatewayEvent>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl<W> Multiplexer<W>
where
    W: AsyncWrite + Unpin,
{
    /// Build the consumer and its submission handle
    ///
    /// `frames` is the output of the transport reader. The link is treated as
    /// open from here until the reader ends or a write fails.
    pub fn new(
        writer: W,
        frames: mpsc::UnboundedReceiver<FramedMessage>,
        dispatcher: StateDispatcher,
        events: broadcast::Sender<GatewayEvent>,
        cancel: CancellationToken,
        default_timeout: Duration,
    ) -> (Self, MuxHandle) {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(true));

        let handle = MuxHandle {
            queue: queue_tx,
            connected: connected.clone(),
            next_id: Arc::new(AtomicU64::new(1)),
            default_timeout,
        };

        let mux = Self {
            writer,
            queue: queue_rx,
            frames,
            dispatcher,
            events,
            connected,
            cancel,
        };

        (mux, handle)
    }

    /// Run until cancelled or the link is lost
    pub async fn run(mut self) {
        info!("Command multiplexer started");
        let mut in_flight: Option<InFlight> = None;

        loop {
            let deadline = in_flight
                .as_ref()
                .map(|f| f.deadline)
                .unwrap_or_else(Instant::now);

            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    debug!("multiplexer cancelled");
                    break;
                }

                frame = self.frames.recv() => match frame {
                    Some(msg) => self.route(msg, &mut in_flight),
                    None => {
                        warn!("Transceiver link lost");
                        let _ = self.events.send(GatewayEvent::Disconnected);
                        break;
                    }
                },

                _ = sleep_until(deadline), if in_flight.is_some() => {
                    if let Some(InFlight { request, .. }) = in_flight.take() {
                        self.time_out(request);
                    }
                }

                request = self.queue.recv(), if in_flight.is_none() => match request {
                    Some(request) => match self.dispatch(request).await {
                        Ok(pending) => in_flight = pending,
                        Err(e) => {
                            warn!("Write to transceiver failed: {}", e);
                            let _ = self.events.send(GatewayEvent::Error {
                                source: "multiplexer".to_string(),
                                message: format!("Write error: {}", e),
                            });
                            let _ = self.events.send(GatewayEvent::Disconnected);
                            break;
                        }
                    },
                    // Every handle dropped
                    None => break,
                },
            }
        }

        self.shut_down(in_flight);
    }

    /// Write a request; returns it as in-flight when a reply is expected
    async fn dispatch(&mut self, mut request: CommandRequest) -> Result<Option<InFlight>, MuxError> {
        request.state = RequestState::InFlight;
        debug!(
            id = request.id,
            client = %request.client,
            text = %request.text,
            queued_ms = request.submitted_at.elapsed().as_millis() as u64,
            "dispatching command"
        );

        let written = async {
            self.writer.write_all(request.text.as_bytes()).await?;
            self.writer.flush().await
        }
        .await;

        if let Err(e) = written {
            let message = e.to_string();
            request.complete(Err(MuxError::Io(e)));
            return Err(MuxError::Io(std::io::Error::other(message)));
        }

        let _ = self.events.send(GatewayEvent::DataOut {
            client: request.client.clone(),
            data: request.text.clone(),
        });

        if !request.expect.expects_reply() {
            request.complete(Ok(Reply::Written));
            return Ok(None);
        }

        let deadline = Instant::now() + request.timeout.min(MAX_COMMAND_TIMEOUT);
        Ok(Some(InFlight { request, deadline }))
    }

    fn route(&self, msg: FramedMessage, in_flight: &mut Option<InFlight>) {
        let claimed = in_flight
            .as_ref()
            .is_some_and(|f| f.request.expect.matches(&msg));

        if claimed {
            if let Some(InFlight { request, .. }) = in_flight.take() {
                request.complete(Ok(Reply::Message(msg)));
            }
        } else {
            self.dispatcher.on_unclaimed_message(&msg);
        }
    }

    fn time_out(&self, request: CommandRequest) {
        debug!(
            id = request.id,
            client = %request.client,
            text = %request.text,
            "command timed out"
        );
        let _ = self.events.send(GatewayEvent::CommandTimedOut {
            client: request.client.clone(),
            command: request.text.clone(),
        });
        let err = MuxError::Timeout {
            command: request.text.clone(),
            timeout_ms: request.timeout.as_millis() as u64,
        };
        request.complete(Err(err));
    }

    /// Fail everything still pending; later submissions see `NotConnected`
    fn shut_down(mut self, in_flight: Option<InFlight>) {
        self.connected.store(false, Ordering::Release);

        if let Some(InFlight { request, .. }) = in_flight {
            request.complete(Err(MuxError::NotConnected));
        }
        self.queue.close();
        while let Ok(request) = self.queue.try_recv() {
            request.complete(Err(MuxError::NotConnected));
        }
        info!("Command multiplexer stopped");
    }
}
