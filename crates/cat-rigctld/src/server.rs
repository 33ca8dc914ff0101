//! rigctld TCP server
//!
//! Each client connection runs in its own task; all of them submit through
//! the same [`MuxHandle`], so their commands interleave on the link in
//! arrival order and never overlap.

use std::net::SocketAddr;

use cat_mux::{MuxHandle, SharedState};
use cat_protocol::{codec, MeterKind, Receiver};
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::{Level, RigctlCommand};
use crate::error::RigctlError;
use crate::levels;

/// Default rigctld TCP port
pub const DEFAULT_RIGCTLD_PORT: u16 = 4532;

/// Reply for a successful set command
const RPRT_OK: &str = "RPRT 0\n";

/// Longest command line accepted from a client, newline included
pub const MAX_LINE_LEN: usize = 1024;

/// What a command produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Text to send back, newline-terminated
    Text(String),
    /// Close the connection without replying
    Close,
}

/// rigctld front end bound to one gateway
#[derive(Debug, Clone)]
pub struct RigctlServer {
    handle: MuxHandle,
    state: SharedState,
}

impl RigctlServer {
    pub fn new(handle: MuxHandle, state: SharedState) -> Self {
        Self { handle, state }
    }

    /// Accept connections until cancelled
    pub async fn serve(self, listener: TcpListener, cancel: CancellationToken) -> std::io::Result<()> {
        info!("rigctld listening on {}", listener.local_addr()?);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("rigctld server stopping");
                    return Ok(());
                }
                res = listener.accept() => {
                    let (socket, addr) = match res {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!("Failed to accept rigctld connection: {}", e);
                            continue;
                        }
                    };
                    info!("rigctld client connected: {}", addr);

                    let server = self.clone();
                    let cancel = cancel.clone();
                    tokio::spawn(async move {
                        if let Err(e) = server.handle_connection(socket, addr, cancel).await {
                            debug!("rigctld client {} error: {}", addr, e);
                        }
                        info!("rigctld client disconnected: {}", addr);
                    });
                }
            }
        }
    }

    /// Serve one client until it quits, disconnects or the server stops
    ///
    /// Lines that are too long or not UTF-8 get `RPRT -1`; only I/O errors
    /// and end of stream close the connection.
    pub async fn handle_connection<S>(
        &self,
        stream: S,
        peer: SocketAddr,
        cancel: CancellationToken,
    ) -> std::io::Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let client = format!("rigctld:{}", peer);
        let (reader, mut writer) = tokio::io::split(stream);
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::with_capacity(128);

        loop {
            buf.clear();
            let line = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                res = read_line_capped(&mut reader, &mut buf) => res?,
            };

            let text = match line {
                Line::Eof => return Ok(()),
                Line::TooLong => {
                    warn!("rigctld {} sent a line over {} bytes", client, MAX_LINE_LEN);
                    invalid_line()
                }
                Line::Complete => match std::str::from_utf8(&buf) {
                    Ok(line) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        debug!("rigctld {} <- {}", client, trimmed);
                        match self.respond(&client, trimmed).await {
                            Response::Close => return Ok(()),
                            Response::Text(text) => text,
                        }
                    }
                    Err(e) => {
                        debug!("rigctld {} sent a line that is not UTF-8: {}", client, e);
                        invalid_line()
                    }
                },
            };
            writer.write_all(text.as_bytes()).await?;
            writer.flush().await?;
        }
    }

    /// Parse and run one line, rendering success or failure as protocol text
    pub async fn respond(&self, client: &str, line: &str) -> Response {
        let result = match RigctlCommand::parse(line) {
            Ok(RigctlCommand::Quit) => return Response::Close,
            Ok(cmd) => self.execute(client, &cmd).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(text) => Response::Text(text),
            Err(e) => {
                debug!("rigctld {} command {:?} failed: {}", client, line, e);
                Response::Text(format!("RPRT {}\n", e.code()))
            }
        }
    }

    /// Run a parsed command against the transceiver
    pub async fn execute(&self, client: &str, cmd: &RigctlCommand) -> Result<String, RigctlError> {
        match cmd {
            RigctlCommand::GetFreq => {
                let msg = self
                    .handle
                    .query(client, &codec::encode_get_frequency(Receiver::Main))
                    .await?;
                let (_, hz) = codec::decode_frequency(&msg)
                    .ok_or_else(|| RigctlError::Protocol(msg.text().to_string()))?;
                Ok(format!("{}\n", hz))
            }
            RigctlCommand::SetFreq(hz) => {
                let text = codec::encode_set_frequency(Receiver::Main, *hz)?;
                self.handle.send_set(client, &text).await?;
                self.state.set_frequency(Receiver::Main, *hz);
                Ok(RPRT_OK.to_string())
            }
            RigctlCommand::GetMode => {
                let msg = self
                    .handle
                    .query(client, &codec::encode_get_mode(Receiver::Main))
                    .await?;
                let (_, mode) = codec::decode_mode(&msg)
                    .ok_or_else(|| RigctlError::Protocol(msg.text().to_string()))?;
                Ok(format!(
                    "{}\n{}\n",
                    mode.hamlib_name(),
                    mode.default_passband_hz()
                ))
            }
            RigctlCommand::SetMode(mode, _passband) => {
                let text = codec::encode_set_mode(Receiver::Main, *mode);
                self.handle.send_set(client, &text).await?;
                self.state.set_mode(Receiver::Main, *mode);
                Ok(RPRT_OK.to_string())
            }
            RigctlCommand::GetPtt => {
                let msg = self
                    .handle
                    .query(client, &codec::encode_get_transmit())
                    .await?;
                let on = codec::decode_transmit_status(&msg)
                    .ok_or_else(|| RigctlError::Protocol(msg.text().to_string()))?;
                Ok(format!("{}\n", u8::from(on)))
            }
            RigctlCommand::SetPtt(on) => {
                self.handle
                    .send_set(client, &codec::encode_set_transmit(*on))
                    .await?;
                self.state.set_transmitting(*on);
                Ok(RPRT_OK.to_string())
            }
            RigctlCommand::GetLevel(level) => self.get_level(client, *level).await,
            RigctlCommand::GetVfo => Ok("VFOA\n".to_string()),
            RigctlCommand::ChkVfo => Ok("0\n".to_string()),
            RigctlCommand::Quit => Ok(String::new()),
        }
    }

    async fn get_level(&self, client: &str, level: Level) -> Result<String, RigctlError> {
        match level {
            Level::Strength => {
                let raw = self.read_meter(client, MeterKind::Signal(Receiver::Main)).await?;
                Ok(format!("{}\n", levels::strength_db(raw)))
            }
            Level::Swr => {
                let raw = self.read_meter(client, MeterKind::Swr).await?;
                Ok(format!("{:.6}\n", levels::swr_ratio(raw)))
            }
            Level::RfPower => {
                let msg = self.handle.query(client, &codec::encode_get_power()).await?;
                let watts = codec::decode_power(&msg)
                    .ok_or_else(|| RigctlError::Protocol(msg.text().to_string()))?;
                Ok(format!("{:.6}\n", levels::rf_power_fraction(watts)))
            }
        }
    }

    async fn read_meter(&self, client: &str, kind: MeterKind) -> Result<u16, RigctlError> {
        let msg = self
            .handle
            .query(client, &codec::encode_get_meter(kind))
            .await?;
        let reading = codec::decode_meter(&msg)
            .filter(|r| r.kind == kind)
            .ok_or_else(|| RigctlError::Protocol(msg.text().to_string()))?;
        self.state.set_meter(reading);
        Ok(reading.value)
    }
}

/// Result of reading one client line
enum Line {
    Complete,
    TooLong,
    Eof,
}

/// Read up to and including the next newline into `buf`, at most
/// [`MAX_LINE_LEN`] bytes
///
/// An overlong line is discarded through its newline without buffering it.
async fn read_line_capped<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Line>
where
    R: AsyncBufRead + Unpin,
{
    let n = (&mut *reader)
        .take(MAX_LINE_LEN as u64)
        .read_until(b'\n', buf)
        .await?;
    if n == 0 {
        return Ok(Line::Eof);
    }
    if buf.last() == Some(&b'\n') || n < MAX_LINE_LEN {
        // Short read without a newline is the last line before EOF
        return Ok(Line::Complete);
    }

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(Line::TooLong);
        }
        match available.iter().position(|&b| b == b'\n') {
            Some(i) => {
                reader.consume(i + 1);
                return Ok(Line::TooLong);
            }
            None => {
                let len = available.len();
                reader.consume(len);
            }
        }
    }
}

fn invalid_line() -> String {
    format!("RPRT {}\n", crate::error::code::EINVAL)
}
