//! Gateway settings

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use cat_mux::{GatewayConfig, DEFAULT_BAUD_RATE, DEFAULT_COMMAND_TIMEOUT};
use cat_rigctld::DEFAULT_RIGCTLD_PORT;
use cat_sim::VirtualRadioConfig;
use cat_wsjtx::{ListenerConfig, DEFAULT_WSJTX_PORT};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Settings file contents
///
/// Every field has a default, so a partial file only overrides what it names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Serial port of the transceiver
    pub port: Option<String>,
    pub baud_rate: u32,
    /// Per-command reply timeout in milliseconds
    pub command_timeout_ms: u64,
    /// Meter poll period in milliseconds, 0 to disable
    pub meter_poll_ms: u64,
    pub rigctld_bind: SocketAddr,
    pub wsjtx_bind: SocketAddr,
    pub wsjtx_multicast: Option<Ipv4Addr>,
    /// Seconds without a heartbeat before a WSJT-X peer is dropped
    pub wsjtx_liveness_s: u64,
    /// Transceiver used with `--simulate`
    pub simulator: VirtualRadioConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            command_timeout_ms: DEFAULT_COMMAND_TIMEOUT.as_millis() as u64,
            meter_poll_ms: 1000,
            rigctld_bind: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_RIGCTLD_PORT)),
            wsjtx_bind: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_WSJTX_PORT)),
            wsjtx_multicast: None,
            wsjtx_liveness_s: 30,
            simulator: VirtualRadioConfig::default(),
        }
    }
}

impl Settings {
    /// Default settings file: `<config dir>/cat-gateway/settings.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("cat-gateway").join("settings.json"))
    }

    /// Load settings
    ///
    /// An explicit path must exist and parse. The default path falls back to
    /// defaults when missing or unreadable.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = explicit {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading settings from {}", path.display()))?;
            return serde_json::from_str(&text)
                .with_context(|| format!("parsing settings in {}", path.display()));
        }

        let Some(path) = Self::default_path() else {
            return Ok(Self::default());
        };
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(_) => return Ok(Self::default()),
        };
        match serde_json::from_str(&text) {
            Ok(settings) => Ok(settings),
            Err(e) => {
                warn!("Ignoring invalid settings file {}: {}", path.display(), e);
                Ok(Self::default())
            }
        }
    }

    /// Write settings as pretty JSON, creating the directory if needed
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            command_timeout: Duration::from_millis(self.command_timeout_ms),
            meter_poll_interval: Duration::from_millis(self.meter_poll_ms),
            ..Default::default()
        }
    }

    pub fn listener_config(&self) -> ListenerConfig {
        ListenerConfig {
            bind: self.wsjtx_bind,
            multicast_group: self.wsjtx_multicast,
            liveness: Duration::from_secs(self.wsjtx_liveness_s),
        }
    }
}
