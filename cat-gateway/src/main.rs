//! CAT Gateway
//!
//! Shares one transceiver CAT link between rigctld clients (loggers, contest
//! software) and WSJT-X, which steers the dial frequency through UDP status
//! broadcasts.

mod ports;
mod settings;

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use anyhow::Context;
use cat_mux::{Gateway, GatewayEvent};
use cat_rigctld::RigctlServer;
use cat_sim::spawn_virtual_radio;
use cat_wsjtx::{bind_socket, WsjtxListener};
use clap::Parser;
use settings::Settings;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(
    author = env!("CARGO_PKG_AUTHORS"),
    version = env!("CARGO_PKG_VERSION"),
    about = env!("CARGO_PKG_DESCRIPTION")
)]
struct Cli {
    /// Serial port of the transceiver (e.g. /dev/ttyUSB0, COM3)
    #[arg(short = 'p', long = "port")]
    port: Option<String>,
    /// Serial baud rate
    #[arg(short = 'b', long = "baud")]
    baud: Option<u32>,
    /// rigctld listen address
    #[arg(long = "rigctld")]
    rigctld: Option<SocketAddr>,
    /// WSJT-X UDP listen address
    #[arg(long = "wsjtx")]
    wsjtx: Option<SocketAddr>,
    /// WSJT-X multicast group to join
    #[arg(long = "wsjtx-multicast")]
    wsjtx_multicast: Option<Ipv4Addr>,
    /// Use a simulated transceiver instead of a serial port
    #[arg(long = "simulate")]
    simulate: bool,
    /// List serial ports and exit
    #[arg(long = "list-ports")]
    list_ports: bool,
    /// Settings file (default: <config dir>/cat-gateway/settings.json)
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,
    /// Write the effective settings to the settings file and exit
    #[arg(long = "save-config")]
    save_config: bool,
}

impl Cli {
    fn apply(&self, settings: &mut Settings) {
        if let Some(port) = &self.port {
            settings.port = Some(port.clone());
        }
        if let Some(baud) = self.baud {
            settings.baud_rate = baud;
        }
        if let Some(addr) = self.rigctld {
            settings.rigctld_bind = addr;
        }
        if let Some(addr) = self.wsjtx {
            settings.wsjtx_bind = addr;
        }
        if let Some(group) = self.wsjtx_multicast {
            settings.wsjtx_multicast = Some(group);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "cat_gateway=info,cat_protocol=info,cat_mux=info,cat_rigctld=info,cat_wsjtx=info,cat_sim=info"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    if cli.list_ports {
        let ports = ports::list_ports().context("enumerating serial ports")?;
        if ports.is_empty() {
            println!("No serial ports found");
        }
        for port in ports {
            println!("{}", port.display_label());
        }
        return Ok(());
    }

    let mut settings = Settings::load(cli.config.as_deref())?;
    cli.apply(&mut settings);

    if cli.save_config {
        let path = cli
            .config
            .clone()
            .or_else(Settings::default_path)
            .context("could not determine settings path")?;
        settings.save(&path)?;
        println!("Settings written to {}", path.display());
        return Ok(());
    }

    run(cli.simulate, settings).await
}

async fn run(simulate: bool, settings: Settings) -> anyhow::Result<()> {
    info!("Starting CAT gateway");

    // The panel handle keeps the simulated transceiver's control channel open
    let (gateway, _panel) = if simulate {
        let (link, panel) = spawn_virtual_radio(settings.simulator.clone());
        info!("Using simulated transceiver '{}'", settings.simulator.id);
        (Gateway::start(link, settings.gateway_config()), Some(panel))
    } else {
        let port = settings
            .port
            .as_deref()
            .context("no serial port configured (use --port or --simulate)")?;
        let gateway = Gateway::open_serial(port, settings.baud_rate, settings.gateway_config())
            .with_context(|| format!("opening {} at {} baud", port, settings.baud_rate))?;
        (gateway, None)
    };

    let report = gateway.initialize().await.context("initializing transceiver")?;
    if !report.failed.is_empty() {
        warn!("Startup steps without a reply: {}", report.failed.join(", "));
    }

    let cancel = CancellationToken::new();
    let link_lost = tokio::spawn(log_events(gateway.events()));

    match TcpListener::bind(settings.rigctld_bind).await {
        Ok(listener) => {
            let server = RigctlServer::new(gateway.handle(), gateway.shared_state());
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if let Err(e) = server.serve(listener, cancel).await {
                    warn!("rigctld server stopped: {}", e);
                }
            });
        }
        Err(e) => warn!("rigctld disabled, cannot bind {}: {}", settings.rigctld_bind, e),
    }

    let listener_config = settings.listener_config();
    match bind_socket(&listener_config).await {
        Ok(socket) => {
            let listener =
                WsjtxListener::new(gateway.handle(), gateway.shared_state(), listener_config.liveness);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if let Err(e) = listener.run(socket, cancel).await {
                    warn!("WSJT-X listener stopped: {}", e);
                }
            });
        }
        Err(e) => warn!("WSJT-X listener disabled, cannot bind {}: {}", listener_config.bind, e),
    }

    let result = tokio::select! {
        res = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            res.context("waiting for ctrl-c")
        }
        _ = link_lost => Err(anyhow::anyhow!("transceiver link lost")),
    };

    cancel.cancel();
    gateway.shutdown().await;
    result
}

/// Log gateway events until the link goes away
async fn log_events(mut events: broadcast::Receiver<GatewayEvent>) {
    loop {
        match events.recv().await {
            Ok(GatewayEvent::Disconnected) => {
                warn!("Transceiver disconnected");
                return;
            }
            Ok(GatewayEvent::Error { source, message }) => {
                warn!("{}: {}", source, message);
            }
            Ok(GatewayEvent::CommandTimedOut { client, command }) => {
                debug!(client = %client, "No reply to {}", command);
            }
            Ok(GatewayEvent::DataOut { client, data }) => {
                debug!(client = %client, "-> {}", data);
            }
            Ok(GatewayEvent::DataIn { data }) => {
                debug!("<- {}", String::from_utf8_lossy(&data));
            }
            Ok(GatewayEvent::StateChanged { field }) => {
                debug!("State changed: {:?}", field);
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                debug!("Event log skipped {} events", n);
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}
