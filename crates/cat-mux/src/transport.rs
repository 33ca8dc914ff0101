//! Serial transport
//!
//! The link is split in two halves: the read half is owned by a single
//! reader task running the [`MessageFramer`], the write half is owned by the
//! multiplexer consumer loop. Nothing else touches the link.
//!
//! The transport is generic over `AsyncRead`/`AsyncWrite` so tests and the
//! simulator can use `tokio::io::duplex()` in place of a serial port.

use std::io::ErrorKind;
use std::time::Duration;

use cat_protocol::{FramedMessage, MessageFramer};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{broadcast, mpsc};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::MuxError;
use crate::events::GatewayEvent;

/// Default CAT baud rate
pub const DEFAULT_BAUD_RATE: u32 = 38_400;

/// Size of one read from the link
const READ_CHUNK: usize = 1024;

/// Open a serial port in async mode, 8N1
pub fn open_serial(port: &str, baud_rate: u32) -> Result<SerialStream, MuxError> {
    let stream = tokio_serial::new(port, baud_rate)
        .timeout(Duration::from_millis(100))
        .open_native_async()?;
    info!("Opened {} at {} baud", port, baud_rate);
    Ok(stream)
}

/// Read loop: bytes in, framed messages out
///
/// Runs until EOF, a read error, cancellation, or the frame receiver going
/// away. Dropping `frames` on exit is what tells the consumer the link is
/// gone.
pub async fn run_reader<R>(
    mut reader: R,
    frames: mpsc::UnboundedSender<FramedMessage>,
    events: broadcast::Sender<GatewayEvent>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    let mut framer = MessageFramer::new();
    let mut buf = vec![0u8; READ_CHUNK];

    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("reader cancelled");
                break;
            }
            result = reader.read(&mut buf) => result,
        };

        match result {
            Ok(0) => {
                info!("Transceiver link closed (EOF)");
                break;
            }
            Ok(n) => {
                let data = &buf[..n];
                debug!("Read {} bytes: {:?}", n, String::from_utf8_lossy(data));
                let _ = events.send(GatewayEvent::DataIn {
                    data: data.to_vec(),
                });

                for msg in framer.feed(data) {
                    if frames.send(msg).is_err() {
                        debug!("frame receiver dropped, stopping reader");
                        return;
                    }
                }
            }
            // Serial ports in async mode surface idle periods this way
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => continue,
            Err(e) => {
                warn!("Read error on transceiver link: {}", e);
                let _ = events.send(GatewayEvent::Error {
                    source: "transport".to_string(),
                    message: format!("Read error: {}", e),
                });
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_reader_frames_across_writes() {
        let (mut device, gateway) = tokio::io::duplex(64);
        let (frames_tx, mut frames_rx) = mpsc::unbounded_channel();
        let (events_tx, _) = broadcast::channel(16);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_reader(gateway, frames_tx, events_tx, cancel.clone()));

        device.write_all(b"FA0140").await.unwrap();
        device.write_all(b"74000;MD0C;").await.unwrap();

        assert_eq!(frames_rx.recv().await.unwrap().text(), "FA014074000;");
        assert_eq!(frames_rx.recv().await.unwrap().text(), "MD0C;");

        drop(device);
        task.await.unwrap();
        assert!(frames_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_reader_stops_on_cancel() {
        let (_device, gateway) = tokio::io::duplex(64);
        let (frames_tx, mut frames_rx) = mpsc::unbounded_channel();
        let (events_tx, _) = broadcast::channel(16);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_reader(gateway, frames_tx, events_tx, cancel.clone()));
        cancel.cancel();
        task.await.unwrap();
        assert!(frames_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_reader_emits_data_in() {
        let (mut device, gateway) = tokio::io::duplex(64);
        let (frames_tx, _frames_rx) = mpsc::unbounded_channel();
        let (events_tx, mut events_rx) = broadcast::channel(16);

        tokio::spawn(run_reader(
            gateway,
            frames_tx,
            events_tx,
            CancellationToken::new(),
        ));
        device.write_all(b"TX0;").await.unwrap();

        match events_rx.recv().await.unwrap() {
            GatewayEvent::DataIn { data } => assert_eq!(data, b"TX0;"),
            other => panic!("unexpected event {:?}", other),
        }
    }
}
