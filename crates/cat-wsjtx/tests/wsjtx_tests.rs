//! End-to-end tests: WSJT-X datagrams -> listener -> gateway -> virtual transceiver

use std::time::Duration;

use cat_mux::{Gateway, GatewayConfig};
use cat_protocol::{codec, Receiver};
use cat_sim::{spawn_virtual_radio, VirtualRadioConfig};
use cat_wsjtx::{
    bind_socket, DatagramOutcome, ListenerConfig, PacketError, PacketWriter, WsjtxListener,
    DEFAULT_LIVENESS,
};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Helper Functions
// ============================================================================

mod helpers {
    use super::*;

    pub fn start() -> (Gateway, WsjtxListener) {
        let (link, _panel) = spawn_virtual_radio(VirtualRadioConfig::default());
        let config = GatewayConfig {
            command_timeout: Duration::from_millis(200),
            meter_poll_interval: Duration::ZERO,
            ..Default::default()
        };
        let gateway = Gateway::start(link, config);
        let listener =
            WsjtxListener::new(gateway.handle(), gateway.shared_state(), DEFAULT_LIVENESS);
        (gateway, listener)
    }

    /// Frequency the transceiver itself reports
    pub async fn radio_frequency(gateway: &Gateway) -> u64 {
        let reply = gateway
            .handle()
            .query("test", &codec::encode_get_frequency(Receiver::Main))
            .await
            .unwrap();
        codec::decode_frequency(&reply).unwrap().1
    }
}

// ============================================================================
// Status Tests
// ============================================================================

#[tokio::test]
async fn status_sets_frequency() {
    let (gateway, listener) = helpers::start();

    let outcome = listener
        .handle_datagram(&PacketWriter::status("WSJT-X", 7_074_000, "FT8", false))
        .await;
    assert!(matches!(outcome, DatagramOutcome::FrequencyFollowed(7_074_000)));
    assert_eq!(helpers::radio_frequency(&gateway).await, 7_074_000);
    assert_eq!(gateway.snapshot().main.frequency_hz, Some(7_074_000));
}

#[tokio::test]
async fn small_drift_is_ignored() {
    let (gateway, listener) = helpers::start();

    listener
        .handle_datagram(&PacketWriter::status("WSJT-X", 7_074_000, "FT8", false))
        .await;
    let outcome = listener
        .handle_datagram(&PacketWriter::status("WSJT-X", 7_074_100, "FT8", false))
        .await;
    assert!(matches!(outcome, DatagramOutcome::InSync));
    assert_eq!(helpers::radio_frequency(&gateway).await, 7_074_000);

    let outcome = listener
        .handle_datagram(&PacketWriter::status("WSJT-X", 7_074_101, "FT8", false))
        .await;
    assert!(matches!(outcome, DatagramOutcome::FrequencyFollowed(7_074_101)));
}

#[tokio::test]
async fn bad_magic_then_valid_status() {
    let (gateway, listener) = helpers::start();

    let mut bad = PacketWriter::status("WSJT-X", 3_573_000, "FT8", false);
    bad[0] = 0x00;
    let outcome = listener.handle_datagram(&bad).await;
    assert!(matches!(
        outcome,
        DatagramOutcome::Rejected(PacketError::BadMagic(_))
    ));
    assert_eq!(helpers::radio_frequency(&gateway).await, 14_074_000);

    let outcome = listener
        .handle_datagram(&PacketWriter::status("WSJT-X", 3_573_000, "FT8", false))
        .await;
    assert!(matches!(outcome, DatagramOutcome::FrequencyFollowed(3_573_000)));
    assert_eq!(helpers::radio_frequency(&gateway).await, 3_573_000);
}

#[tokio::test]
async fn out_of_range_dial_is_not_sent() {
    let (gateway, listener) = helpers::start();

    let outcome = listener
        .handle_datagram(&PacketWriter::status("WSJT-X", 144_174_000, "FT8", false))
        .await;
    assert!(matches!(outcome, DatagramOutcome::OutOfRange(144_174_000)));
    assert_eq!(helpers::radio_frequency(&gateway).await, 14_074_000);
}

#[tokio::test]
async fn link_loss_reported_per_datagram() {
    let (gateway, listener) = helpers::start();
    gateway.shutdown().await;

    let outcome = listener
        .handle_datagram(&PacketWriter::status("WSJT-X", 7_074_000, "FT8", false))
        .await;
    assert!(matches!(outcome, DatagramOutcome::SetFailed(_)));
}

// ============================================================================
// Peer Tests
// ============================================================================

#[tokio::test]
async fn heartbeat_and_close_track_peers() {
    let (_gateway, listener) = helpers::start();

    let outcome = listener
        .handle_datagram(&PacketWriter::heartbeat("WSJT-X"))
        .await;
    assert!(matches!(outcome, DatagramOutcome::PeerSeen));
    listener.handle_datagram(&PacketWriter::heartbeat("JTDX")).await;
    assert_eq!(listener.peers().len(), 2);

    let outcome = listener.handle_datagram(&PacketWriter::close("JTDX")).await;
    assert!(matches!(outcome, DatagramOutcome::PeerClosed));
    let peers = listener.peers();
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].id, "WSJT-X");
}

#[tokio::test]
async fn status_records_peer_details() {
    let (_gateway, listener) = helpers::start();

    listener
        .handle_datagram(&PacketWriter::status("WSJT-X", 14_074_000, "FT8", true))
        .await;
    let peers = listener.peers();
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].id, "WSJT-X");
    assert_eq!(peers[0].dial_frequency_hz, Some(14_074_000));
    assert_eq!(peers[0].mode.as_deref(), Some("FT8"));
    assert!(peers[0].transmitting);

    listener
        .handle_datagram(&PacketWriter::status("WSJT-X", 10_136_000, "FT4", false))
        .await;
    let peers = listener.peers();
    assert_eq!(peers[0].mode.as_deref(), Some("FT4"));
    assert!(!peers[0].transmitting);
}

#[tokio::test]
async fn unhandled_types_are_ignored() {
    let (gateway, listener) = helpers::start();

    // Decode message
    let outcome = listener
        .handle_datagram(&PacketWriter::new(3, 2, "WSJT-X").finish())
        .await;
    assert!(matches!(outcome, DatagramOutcome::Ignored(2)));
    assert_eq!(helpers::radio_frequency(&gateway).await, 14_074_000);
}

// ============================================================================
// Socket Tests
// ============================================================================

#[tokio::test]
async fn udp_datagram_moves_radio() {
    let (gateway, listener) = helpers::start();
    let config = ListenerConfig {
        bind: "127.0.0.1:0".parse().unwrap(),
        ..Default::default()
    };
    let socket = bind_socket(&config).await.unwrap();
    let addr = socket.local_addr().unwrap();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(listener.clone().run(socket, cancel.clone()));

    let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    sender
        .send_to(&[0xDE, 0xAD, 0xBE, 0xEF], addr)
        .await
        .unwrap();
    sender
        .send_to(&PacketWriter::status("WSJT-X", 21_074_000, "FT8", false), addr)
        .await
        .unwrap();

    let mut state = gateway.state();
    tokio::time::timeout(
        Duration::from_secs(2),
        state.wait_for(|s| s.main.frequency_hz == Some(21_074_000)),
    )
    .await
    .expect("frequency followed in time")
    .unwrap();
    assert_eq!(helpers::radio_frequency(&gateway).await, 21_074_000);

    cancel.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn multicast_join_failure_is_not_fatal() {
    // Not a multicast address, so the join fails
    let config = ListenerConfig {
        bind: "127.0.0.1:0".parse().unwrap(),
        multicast_group: Some("10.0.0.1".parse().unwrap()),
        ..Default::default()
    };
    assert!(bind_socket(&config).await.is_ok());
}
