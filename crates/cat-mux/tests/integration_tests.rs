//! Integration tests for the CAT gateway engine
//!
//! These tests verify end-to-end behavior over an in-memory link:
//! - FIFO servicing and at most one command in flight
//! - Per-caller timeouts that do not depend on other submitters
//! - Reply disambiguation against unsolicited broadcasts
//! - Round trips through the virtual transceiver
//! - Link loss and `NotConnected`

use std::sync::{Arc, Mutex};
use std::time::Duration;

use cat_mux::{Gateway, GatewayConfig, GatewayEvent, MuxError, Reply, ReplyMatch};
use cat_protocol::{codec, MessageFramer, OperatingMode, Receiver};
use cat_sim::{spawn_virtual_radio, VirtualRadioConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

// ============================================================================
// Helper Functions
// ============================================================================

mod helpers {
    use super::*;

    /// Gateway config with polling off so tests see only their own traffic
    pub fn quiet_config(timeout_ms: u64) -> GatewayConfig {
        GatewayConfig {
            command_timeout: Duration::from_millis(timeout_ms),
            meter_poll_interval: Duration::ZERO,
            ..Default::default()
        }
    }

    /// Gateway on a virtual transceiver
    pub fn simulated(config: VirtualRadioConfig, timeout_ms: u64) -> Gateway {
        let (link, _radio) = spawn_virtual_radio(config);
        Gateway::start(link, quiet_config(timeout_ms))
    }

    /// What a scripted device saw
    #[derive(Debug, Default)]
    pub struct DeviceLog {
        /// Commands in arrival order
        pub commands: Vec<String>,
        /// Commands that arrived while a query was still unanswered
        pub overlapping: Vec<String>,
    }

    /// A device that answers queries after `delay`, using `answer` to build
    /// each reply; `None` means stay silent. While a query is pending, any
    /// incoming bytes are recorded as an overlap.
    pub fn scripted_device(
        mut link: DuplexStream,
        delay: Duration,
        answer: fn(&str) -> Option<String>,
    ) -> Arc<Mutex<DeviceLog>> {
        let log = Arc::new(Mutex::new(DeviceLog::default()));
        let task_log = log.clone();

        tokio::spawn(async move {
            let mut framer = MessageFramer::new();
            let mut buf = [0u8; 256];
            loop {
                let n = match link.read(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => n,
                };
                for msg in framer.feed(&buf[..n]) {
                    let text = msg.text().to_string();
                    task_log.lock().unwrap().commands.push(text.clone());

                    let Some(reply) = answer(&text) else { continue };

                    // Anything written before we reply violates half-duplex
                    let mut probe = [0u8; 256];
                    if let Ok(Ok(m)) =
                        tokio::time::timeout(delay, link.read(&mut probe)).await
                    {
                        if m > 0 {
                            let extra = String::from_utf8_lossy(&probe[..m]).into_owned();
                            task_log.lock().unwrap().overlapping.push(extra);
                        }
                    }
                    if link.write_all(reply.as_bytes()).await.is_err() {
                        return;
                    }
                }
            }
        });

        log
    }

    /// Echo-style answers: `XX;` -> `XX<n>;` for a fixed table
    pub fn table_answer(text: &str) -> Option<String> {
        match text {
            "FA;" => Some("FA014074000;".into()),
            "FB;" => Some("FB007074000;".into()),
            "MD0;" => Some("MD0C;".into()),
            "PC;" => Some("PC100;".into()),
            "TX;" => Some("TX0;".into()),
            "SM0;" => Some("SM0120;".into()),
            _ => None,
        }
    }
}

// ============================================================================
// Queue Discipline Tests
// ============================================================================

mod queue_tests {
    use super::*;

    #[tokio::test]
    async fn commands_written_in_submission_order() {
        let (device, link) = tokio::io::duplex(1024);
        let log = helpers::scripted_device(device, Duration::from_millis(10), helpers::table_answer);
        let gateway = Gateway::start(link, helpers::quiet_config(1000));

        let queries = ["FA;", "FB;", "MD0;", "PC;", "TX;"];
        let mut tasks = Vec::new();
        for q in queries {
            let handle = gateway.handle();
            tasks.push(tokio::spawn(async move { handle.query("test", q).await }));
            tokio::task::yield_now().await;
        }

        for (task, q) in tasks.into_iter().zip(queries) {
            let reply = task.await.unwrap().unwrap();
            assert_eq!(reply.code(), &q[..2]);
        }

        let log = log.lock().unwrap();
        assert_eq!(log.commands, queries);
    }

    #[tokio::test]
    async fn at_most_one_command_in_flight() {
        let (device, link) = tokio::io::duplex(1024);
        let log = helpers::scripted_device(device, Duration::from_millis(30), helpers::table_answer);
        let gateway = Gateway::start(link, helpers::quiet_config(1000));

        let mut tasks = Vec::new();
        for q in ["FA;", "FB;", "MD0;", "PC;"] {
            let handle = gateway.handle();
            tasks.push(tokio::spawn(async move { handle.query("test", q).await }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let log = log.lock().unwrap();
        assert_eq!(log.commands.len(), 4);
        assert!(log.overlapping.is_empty(), "overlap: {:?}", log.overlapping);
    }

    #[tokio::test]
    async fn set_commands_complete_without_reply() {
        let (device, link) = tokio::io::duplex(1024);
        let log = helpers::scripted_device(device, Duration::from_millis(10), helpers::table_answer);
        let gateway = Gateway::start(link, helpers::quiet_config(1000));

        let handle = gateway.handle();
        let cmd = codec::encode_set_frequency(Receiver::Main, 7_074_000).unwrap();
        let reply = handle
            .submit("test", cmd, ReplyMatch::None, Duration::from_millis(200))
            .await
            .unwrap();
        assert_eq!(reply, Reply::Written);

        // The next query is still answered normally
        assert_eq!(handle.query("test", "TX;").await.unwrap().text(), "TX0;");
        assert_eq!(log.lock().unwrap().commands, ["FA007074000;", "TX;"]);
    }
}

// ============================================================================
// Timeout Tests
// ============================================================================

mod timeout_tests {
    use super::*;

    #[tokio::test]
    async fn timeout_does_not_stall_queue() {
        let radio = VirtualRadioConfig {
            unanswered: vec!["PC".to_string()],
            ..Default::default()
        };
        let gateway = helpers::simulated(radio, 100);
        let a = gateway.handle();
        let b = gateway.handle();

        let first = tokio::spawn(async move { a.query("a", "PC;").await });
        tokio::task::yield_now().await;
        let second = tokio::spawn(async move {
            b.submit(
                "b",
                "FA;",
                ReplyMatch::for_query("FA;"),
                Duration::from_millis(1000),
            )
            .await
        });

        let err = first.await.unwrap().unwrap_err();
        assert!(matches!(err, MuxError::Timeout { .. }));

        match second.await.unwrap().unwrap() {
            Reply::Message(msg) => assert_eq!(msg.text(), "FA014074000;"),
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[tokio::test]
    async fn caller_wait_bounded_from_submission() {
        let radio = VirtualRadioConfig {
            unanswered: vec!["PC".to_string()],
            ..Default::default()
        };
        // Device-side timeout far longer than the second caller's own bound
        let gateway = helpers::simulated(radio, 1000);
        let a = gateway.handle();
        let b = gateway.handle();

        let _stuck = tokio::spawn(async move { a.query("a", "PC;").await });
        tokio::task::yield_now().await;

        let started = tokio::time::Instant::now();
        let err = b
            .submit("b", "FA;", ReplyMatch::for_query("FA;"), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, MuxError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn timeout_emits_event() {
        let radio = VirtualRadioConfig {
            unanswered: vec!["TX".to_string()],
            ..Default::default()
        };
        let gateway = helpers::simulated(radio, 50);
        let mut events = gateway.events();

        let _ = gateway.handle().query("poller", "TX;").await;

        let timed_out = tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                if let Ok(GatewayEvent::CommandTimedOut { client, command }) = events.recv().await {
                    return (client, command);
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(timed_out, ("poller".to_string(), "TX;".to_string()));
    }
}

// ============================================================================
// Disambiguation Tests
// ============================================================================

mod disambiguation_tests {
    use super::*;

    #[tokio::test]
    async fn unsolicited_broadcast_not_taken_as_reply() {
        let (mut device, link) = tokio::io::duplex(1024);
        let gateway = Gateway::start(link, helpers::quiet_config(1000));
        let mut state = gateway.state();

        let handle = gateway.handle();
        let query = tokio::spawn(async move { handle.query("test", "SM0;").await });

        let mut buf = [0u8; 16];
        let n = device.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"SM0;");

        // Sub-receiver meter and a frequency change arrive before the answer
        device.write_all(b"SM1042;FA007030000;SM0120;").await.unwrap();

        assert_eq!(query.await.unwrap().unwrap().text(), "SM0120;");

        tokio::time::timeout(Duration::from_secs(1), state.wait_for(|s| {
            s.sub.signal == Some(42) && s.main.frequency_hz == Some(7_030_000)
        }))
        .await
        .unwrap()
        .unwrap();
        assert_eq!(gateway.snapshot().main.signal, None);
    }

    #[tokio::test]
    async fn broadcasts_update_state_between_commands() {
        let (mut device, link) = tokio::io::duplex(1024);
        let gateway = Gateway::start(link, helpers::quiet_config(1000));
        let mut state = gateway.state();

        device.write_all(b"MD03;TX1;RM5090;").await.unwrap();

        let snap = tokio::time::timeout(Duration::from_secs(1), state.wait_for(|s| {
            s.power_out.is_some()
        }))
        .await
        .unwrap()
        .unwrap()
        .clone();
        assert_eq!(snap.main.mode, Some(OperatingMode::Cw));
        assert!(snap.transmitting);
        assert_eq!(snap.power_out, Some(90));
    }
}

// ============================================================================
// Virtual Transceiver Tests
// ============================================================================

mod simulator_tests {
    use super::*;

    #[tokio::test]
    async fn init_sequence_primes_state() {
        let gateway = helpers::simulated(VirtualRadioConfig::default(), 200);
        let report = gateway.initialize().await.unwrap();
        assert!(report.failed.is_empty(), "failed: {:?}", report.failed);

        let snap = gateway.snapshot();
        assert_eq!(snap.main.frequency_hz, Some(14_074_000));
        assert_eq!(snap.sub.frequency_hz, Some(7_074_000));
        assert_eq!(snap.main.mode, Some(OperatingMode::DataU));
        assert_eq!(snap.sub.mode, Some(OperatingMode::DataU));
        assert_eq!(snap.power_w, Some(100));
        assert!(!snap.transmitting);
    }

    #[tokio::test]
    async fn init_skips_sub_mode_without_sub_receiver() {
        let radio = VirtualRadioConfig {
            unanswered: vec!["FB".to_string()],
            ..Default::default()
        };
        let gateway = helpers::simulated(radio, 50);
        let report = gateway.initialize().await.unwrap();

        assert_eq!(report.failed, vec!["sub frequency"]);
        assert_eq!(report.skipped, vec!["sub mode"]);
    }

    #[tokio::test]
    async fn auto_info_follows_own_sets() {
        let gateway = helpers::simulated(VirtualRadioConfig::default(), 200);
        gateway.initialize().await.unwrap();
        let mut state = gateway.state();

        let handle = gateway.handle();
        handle
            .send_set("test", &codec::encode_set_mode(Receiver::Main, OperatingMode::Usb))
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(1), state.wait_for(|s| {
            s.main.mode == Some(OperatingMode::Usb)
        }))
        .await
        .unwrap()
        .unwrap();
    }
}

// ============================================================================
// Link Lifecycle Tests
// ============================================================================

mod link_tests {
    use super::*;

    #[tokio::test]
    async fn device_eof_disconnects() {
        let (device, link) = tokio::io::duplex(64);
        let gateway = Gateway::start(link, helpers::quiet_config(200));
        let mut events = gateway.events();
        let handle = gateway.handle();

        drop(device);

        tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                if let Ok(GatewayEvent::Disconnected) = events.recv().await {
                    return;
                }
            }
        })
        .await
        .unwrap();

        let err = handle.query("test", "FA;").await.unwrap_err();
        assert!(matches!(err, MuxError::NotConnected));
    }

    #[tokio::test]
    async fn shutdown_rejects_new_submissions() {
        let gateway = helpers::simulated(VirtualRadioConfig::default(), 200);
        let handle = gateway.handle();
        assert!(handle.query("test", "FA;").await.is_ok());

        gateway.shutdown().await;
        assert!(!handle.is_connected());
        let err = handle.send_set("test", "TX0;").await.unwrap_err();
        assert!(matches!(err, MuxError::NotConnected));
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    fn frequency() -> impl Strategy<Value = u64> {
        codec::MIN_FREQUENCY_HZ..=codec::MAX_FREQUENCY_HZ
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn frequency_round_trips_through_transceiver(hz in frequency()) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            let read_back = rt.block_on(async {
                let gateway = helpers::simulated(VirtualRadioConfig::default(), 500);
                let handle = gateway.handle();

                let set = codec::encode_set_frequency(Receiver::Main, hz).unwrap();
                handle.send_set("test", &set).await.unwrap();

                let reply = handle
                    .query("test", &codec::encode_get_frequency(Receiver::Main))
                    .await
                    .unwrap();
                codec::decode_frequency(&reply)
            });

            prop_assert_eq!(read_back, Some((Receiver::Main, hz)));
        }
    }
}
