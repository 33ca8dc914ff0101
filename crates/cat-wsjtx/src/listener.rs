//! UDP loop that follows WSJT-X's dial frequency

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cat_mux::{MuxError, MuxHandle, SharedState};
use cat_protocol::{codec, Receiver};
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::packet::{self, Message, PacketError, StatusReport};
use crate::peers::{PeerStatus, PeerTable, DEFAULT_LIVENESS};

/// Default WSJT-X UDP server port
pub const DEFAULT_WSJTX_PORT: u16 = 2237;

/// Dial changes smaller than this are not sent to the transceiver
pub const FREQUENCY_TOLERANCE_HZ: u64 = 100;

/// Largest datagram we read
const MAX_DATAGRAM: usize = 65_536;

/// Where and how to listen
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub bind: SocketAddr,
    /// Multicast group to join, e.g. 224.0.0.1
    pub multicast_group: Option<Ipv4Addr>,
    pub liveness: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_WSJTX_PORT)),
            multicast_group: None,
            liveness: DEFAULT_LIVENESS,
        }
    }
}

/// Bind the UDP socket, joining the multicast group if one is configured
///
/// A failed multicast join is logged and the socket is still returned, so
/// unicast datagrams keep working.
pub async fn bind_socket(config: &ListenerConfig) -> std::io::Result<UdpSocket> {
    let socket = UdpSocket::bind(config.bind).await?;

    if let Some(group) = config.multicast_group {
        match socket.join_multicast_v4(group, Ipv4Addr::UNSPECIFIED) {
            Ok(()) => info!(group = %group, "Joined WSJT-X multicast group"),
            Err(e) => warn!(group = %group, "Failed to join multicast group: {}", e),
        }
    }

    Ok(socket)
}

/// What one datagram led to
#[derive(Debug)]
pub enum DatagramOutcome {
    /// Status asked for a new frequency and it was sent
    FrequencyFollowed(u64),
    /// Status within tolerance of the current frequency
    InSync,
    /// Status carried a frequency the transceiver cannot tune
    OutOfRange(u64),
    /// Setting the frequency failed
    SetFailed(MuxError),
    /// Heartbeat refreshed the peer
    PeerSeen,
    /// Peer announced it is closing
    PeerClosed,
    /// Message type we do not act on
    Ignored(u32),
    /// Datagram could not be decoded
    Rejected(PacketError),
}

/// WSJT-X status listener bound to one gateway
#[derive(Debug, Clone)]
pub struct WsjtxListener {
    handle: MuxHandle,
    state: SharedState,
    peers: Arc<Mutex<PeerTable>>,
}

impl WsjtxListener {
    pub fn new(handle: MuxHandle, state: SharedState, liveness: Duration) -> Self {
        Self {
            handle,
            state,
            peers: Arc::new(Mutex::new(PeerTable::new(liveness))),
        }
    }

    /// Peers heard from within the liveness window
    pub fn peers(&self) -> Vec<PeerStatus> {
        let now = Instant::now();
        self.with_peers(|peers| peers.alive(now).into_iter().cloned().collect())
    }

    fn with_peers<R>(&self, f: impl FnOnce(&mut PeerTable) -> R) -> R {
        // A poisoned table only means a panic elsewhere; the data is still usable
        let mut guard = match self.peers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    /// Receive datagrams until cancelled
    pub async fn run(self, socket: UdpSocket, cancel: CancellationToken) -> std::io::Result<()> {
        info!("WSJT-X listener on {}", socket.local_addr()?);

        let liveness = self.with_peers(|peers| peers.liveness());
        let mut prune = tokio::time::interval(liveness.max(Duration::from_secs(1)));
        prune.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut buf = vec![0u8; MAX_DATAGRAM];

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("WSJT-X listener stopping");
                    return Ok(());
                }
                _ = prune.tick() => {
                    let now = Instant::now();
                    for id in self.with_peers(|peers| peers.prune(now)) {
                        info!(peer = %id, "WSJT-X peer timed out");
                    }
                }
                res = socket.recv_from(&mut buf) => {
                    let (len, from) = match res {
                        Ok(received) => received,
                        Err(e) => {
                            warn!("WSJT-X receive failed: {}", e);
                            continue;
                        }
                    };
                    let outcome = self.handle_datagram(&buf[..len]).await;
                    debug!(from = %from, len, "WSJT-X datagram: {:?}", outcome);
                }
            }
        }
    }

    /// Decode one datagram and act on it
    pub async fn handle_datagram(&self, datagram: &[u8]) -> DatagramOutcome {
        let msg = match packet::decode(datagram) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("Dropping WSJT-X datagram: {}", e);
                return DatagramOutcome::Rejected(e);
            }
        };
        let now = Instant::now();

        match msg {
            Message::Heartbeat { id } => {
                if self.with_peers(|peers| peers.touch(&id, now)) {
                    info!(peer = %id, "WSJT-X peer appeared");
                }
                DatagramOutcome::PeerSeen
            }
            Message::Close { id } => {
                if self.with_peers(|peers| peers.remove(&id)).is_some() {
                    info!(peer = %id, "WSJT-X peer closed");
                }
                DatagramOutcome::PeerClosed
            }
            Message::Other { id, kind } => {
                debug!(peer = %id, kind, "Ignoring WSJT-X message");
                self.with_peers(|peers| peers.touch(&id, now));
                DatagramOutcome::Ignored(kind)
            }
            Message::Status(status) => {
                self.with_peers(|peers| {
                    peers.update_status(&status, now);
                });
                self.follow(&status).await
            }
        }
    }

    async fn follow(&self, status: &StatusReport) -> DatagramOutcome {
        let dial = status.dial_frequency_hz;
        let current = self.state.snapshot().main.frequency_hz;
        if let Some(current) = current {
            if current.abs_diff(dial) <= FREQUENCY_TOLERANCE_HZ {
                return DatagramOutcome::InSync;
            }
        }

        let text = match codec::encode_set_frequency(Receiver::Main, dial) {
            Ok(text) => text,
            Err(e) => {
                warn!(peer = %status.id, "Not following dial frequency: {}", e);
                return DatagramOutcome::OutOfRange(dial);
            }
        };

        let client = format!("wsjtx:{}", status.id);
        match self.handle.send_set(&client, &text).await {
            Ok(()) => {
                info!(peer = %status.id, hz = dial, "Following WSJT-X dial frequency");
                self.state.set_frequency(Receiver::Main, dial);
                DatagramOutcome::FrequencyFollowed(dial)
            }
            Err(e) => {
                warn!(peer = %status.id, "Failed to set frequency: {}", e);
                DatagramOutcome::SetFailed(e)
            }
        }
    }
}
