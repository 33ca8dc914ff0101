//! WSJT-X status listener
//!
//! Listens for the binary UDP datagrams WSJT-X (and JTDX, MSHV) send to
//! their "UDP server" and keeps the transceiver on the dial frequency the
//! decoder reports. Heartbeats and close messages maintain a table of live
//! peers.

pub mod listener;
pub mod packet;
pub mod peers;

pub use listener::{
    bind_socket, DatagramOutcome, ListenerConfig, WsjtxListener, DEFAULT_WSJTX_PORT,
    FREQUENCY_TOLERANCE_HZ,
};
pub use packet::{decode, Message, PacketError, PacketWriter, StatusReport};
pub use peers::{PeerStatus, PeerTable, DEFAULT_LIVENESS};
