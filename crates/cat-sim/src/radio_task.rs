//! Virtual radio actor task
//!
//! Owns a [`VirtualRadio`] and serves it over an async byte stream, so the
//! gateway can drive it exactly like a serial port. The task uses a select!
//! loop to:
//! - Read CAT commands from the stream and answer them
//! - Apply front-panel actions sent over a command channel
//! - Flush any resulting output back to the stream

use std::io;
use std::time::Duration;

use cat_protocol::{MessageFramer, OperatingMode, Receiver};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::radio::{VirtualRadio, VirtualRadioConfig};

/// Front-panel actions for a running virtual radio
#[derive(Debug, Clone)]
pub enum VirtualRadioCommand {
    /// Tune a receiver
    Tune { receiver: Receiver, hz: u64 },
    /// Change a receiver's mode
    SetMode {
        receiver: Receiver,
        mode: OperatingMode,
    },
    /// Key or unkey the transmitter
    SetTransmit(bool),
    /// Set the S-meter level of a receiver
    SetSignal { receiver: Receiver, level: u16 },
    /// Shutdown the virtual radio task
    Shutdown,
}

/// Delay before answering, mimicking the radio's turnaround time
const DEFAULT_REPLY_DELAY: Duration = Duration::from_millis(5);

/// Run the virtual radio task until the stream closes or shutdown is requested
///
/// Closing `cmd_rx` (dropping every handle) does not stop the radio.
pub async fn run_virtual_radio<S>(
    mut stream: S,
    mut radio: VirtualRadio,
    mut cmd_rx: mpsc::Receiver<VirtualRadioCommand>,
    reply_delay: Duration,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framer = MessageFramer::new();
    let mut buf = [0u8; 256];
    let mut panel_open = true;

    info!("Starting virtual radio {}", radio.id());

    loop {
        tokio::select! {
            result = stream.read(&mut buf) => {
                match result {
                    Ok(0) => {
                        debug!("Virtual radio stream closed for {}", radio.id());
                        break;
                    }
                    Ok(n) => {
                        for msg in framer.feed(&buf[..n]) {
                            debug!("Virtual radio {} received {}", radio.id(), msg.text());
                            radio.handle_message(&msg);
                        }
                    }
                    Err(e) => return Err(e),
                }
            }

            cmd = cmd_rx.recv(), if panel_open => {
                match cmd {
                    Some(VirtualRadioCommand::Tune { receiver, hz }) => radio.set_frequency(receiver, hz),
                    Some(VirtualRadioCommand::SetMode { receiver, mode }) => radio.set_mode(receiver, mode),
                    Some(VirtualRadioCommand::SetTransmit(on)) => radio.set_transmitting(on),
                    Some(VirtualRadioCommand::SetSignal { receiver, level }) => radio.set_signal(receiver, level),
                    Some(VirtualRadioCommand::Shutdown) => {
                        info!("Shutdown requested for virtual radio {}", radio.id());
                        break;
                    }
                    None => panel_open = false,
                }
            }
        }

        if radio.has_output() && !reply_delay.is_zero() {
            tokio::time::sleep(reply_delay).await;
        }
        while let Some(out) = radio.take_output() {
            stream.write_all(out.as_bytes()).await?;
        }
        stream.flush().await?;
    }

    Ok(())
}

/// Control handle for a spawned virtual radio
#[derive(Debug, Clone)]
pub struct VirtualRadioHandle {
    cmd_tx: mpsc::Sender<VirtualRadioCommand>,
}

impl VirtualRadioHandle {
    /// Send a front-panel action; false once the radio task has ended
    pub async fn send(&self, cmd: VirtualRadioCommand) -> bool {
        self.cmd_tx.send(cmd).await.is_ok()
    }

    pub async fn tune(&self, receiver: Receiver, hz: u64) -> bool {
        self.send(VirtualRadioCommand::Tune { receiver, hz }).await
    }

    pub async fn shutdown(&self) -> bool {
        self.send(VirtualRadioCommand::Shutdown).await
    }
}

/// Spawn a virtual radio on an in-memory link
///
/// Returns the gateway's end of the link and a control handle. Must be called
/// from within a tokio runtime.
pub fn spawn_virtual_radio(config: VirtualRadioConfig) -> (DuplexStream, VirtualRadioHandle) {
    let (gateway_end, radio_end) = tokio::io::duplex(1024);
    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    let radio = VirtualRadio::from_config(config);

    tokio::spawn(async move {
        if let Err(e) = run_virtual_radio(radio_end, radio, cmd_rx, DEFAULT_REPLY_DELAY).await {
            debug!("Virtual radio task ended: {}", e);
        }
    });

    (gateway_end, VirtualRadioHandle { cmd_tx })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn read_reply(stream: &mut DuplexStream) -> String {
        let mut framer = MessageFramer::new();
        let mut buf = [0u8; 64];
        loop {
            let n = stream.read(&mut buf).await.unwrap();
            assert!(n > 0, "stream closed");
            if let Some(msg) = framer.feed(&buf[..n]).into_iter().next() {
                return msg.text().to_string();
            }
        }
    }

    #[tokio::test]
    async fn test_virtual_radio_answers_over_stream() {
        let (mut link, _handle) = spawn_virtual_radio(VirtualRadioConfig::default());

        link.write_all(b"FA;").await.unwrap();
        assert_eq!(read_reply(&mut link).await, "FA014074000;");

        link.write_all(b"FA007030000;FA;").await.unwrap();
        assert_eq!(read_reply(&mut link).await, "FA007030000;");
    }

    #[tokio::test]
    async fn test_front_panel_tune_broadcasts() {
        let (mut link, handle) = spawn_virtual_radio(VirtualRadioConfig::default());

        link.write_all(b"AI1;").await.unwrap();
        // Round trip so AI1 is applied before tuning
        link.write_all(b"TX;").await.unwrap();
        assert_eq!(read_reply(&mut link).await, "TX0;");

        assert!(handle.tune(Receiver::Sub, 10_136_000).await);
        assert_eq!(read_reply(&mut link).await, "FB010136000;");
    }

    #[tokio::test]
    async fn test_shutdown_closes_stream() {
        let (mut link, handle) = spawn_virtual_radio(VirtualRadioConfig::default());
        assert!(handle.shutdown().await);

        let mut buf = [0u8; 8];
        let n = link.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
    }
}
