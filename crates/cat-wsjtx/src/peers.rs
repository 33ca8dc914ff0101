//! Liveness tracking for WSJT-X instances

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::packet::StatusReport;

/// Peers silent for longer than this are considered gone
///
/// WSJT-X sends a heartbeat every 15 s.
pub const DEFAULT_LIVENESS: Duration = Duration::from_secs(30);

/// What we last heard from one WSJT-X instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerStatus {
    pub id: String,
    pub last_seen: Instant,
    pub mode: Option<String>,
    pub dial_frequency_hz: Option<u64>,
    pub tx_enabled: bool,
    pub transmitting: bool,
}

impl PeerStatus {
    fn new(id: &str, now: Instant) -> Self {
        Self {
            id: id.to_string(),
            last_seen: now,
            mode: None,
            dial_frequency_hz: None,
            tx_enabled: false,
            transmitting: false,
        }
    }

    pub fn is_alive(&self, now: Instant, liveness: Duration) -> bool {
        now.saturating_duration_since(self.last_seen) <= liveness
    }
}

/// Known peers keyed by client id
#[derive(Debug, Clone)]
pub struct PeerTable {
    peers: HashMap<String, PeerStatus>,
    liveness: Duration,
}

impl Default for PeerTable {
    fn default() -> Self {
        Self::new(DEFAULT_LIVENESS)
    }
}

impl PeerTable {
    pub fn new(liveness: Duration) -> Self {
        Self {
            peers: HashMap::new(),
            liveness,
        }
    }

    /// Refresh a peer's last-seen time, adding it if new
    ///
    /// Returns true when the peer was not known before.
    pub fn touch(&mut self, id: &str, now: Instant) -> bool {
        match self.peers.get_mut(id) {
            Some(peer) => {
                peer.last_seen = now;
                false
            }
            None => {
                self.peers.insert(id.to_string(), PeerStatus::new(id, now));
                true
            }
        }
    }

    /// Record a status report
    pub fn update_status(&mut self, status: &StatusReport, now: Instant) -> &PeerStatus {
        let peer = self
            .peers
            .entry(status.id.clone())
            .or_insert_with(|| PeerStatus::new(&status.id, now));
        peer.last_seen = now;
        peer.mode = status.mode.clone();
        peer.dial_frequency_hz = Some(status.dial_frequency_hz);
        peer.tx_enabled = status.tx_enabled;
        peer.transmitting = status.transmitting;
        peer
    }

    pub fn remove(&mut self, id: &str) -> Option<PeerStatus> {
        self.peers.remove(id)
    }

    /// Drop peers outside the liveness window, returning their ids
    pub fn prune(&mut self, now: Instant) -> Vec<String> {
        let liveness = self.liveness;
        let stale: Vec<String> = self
            .peers
            .values()
            .filter(|p| !p.is_alive(now, liveness))
            .map(|p| p.id.clone())
            .collect();
        for id in &stale {
            self.peers.remove(id);
        }
        stale
    }

    /// Peers heard from within the liveness window
    pub fn alive(&self, now: Instant) -> Vec<&PeerStatus> {
        self.peers
            .values()
            .filter(|p| p.is_alive(now, self.liveness))
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<&PeerStatus> {
        self.peers.get(id)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn liveness(&self) -> Duration {
        self.liveness
    }
}
