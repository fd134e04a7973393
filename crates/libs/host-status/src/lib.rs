//! Host telemetry snapshot for the MediaRelay gateway
//!
//! Reads power, network, temperature, and storage state on demand. Every
//! field degrades to a fixed placeholder instead of failing, so a snapshot
//! is always available.
//!
//! # Example
//!
//! ```
//! use mediarelay_host_status::{HostStatusProbe, ProbeConfig};
//!
//! let probe = HostStatusProbe::with_config(ProbeConfig {
//!     use_commands: false,
//!     ..ProbeConfig::default()
//! });
//! let status = probe.snapshot_blocking();
//! assert!(!status.temperature.is_empty());
//! ```

pub mod error;
pub mod network;
pub mod power;
pub mod storage;
pub mod thermal;

pub use error::{Error, Result};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// Fixed-field host status record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub battery: String,
    pub signal: String,
    pub temperature: String,
    pub storage: String,
}

/// Where the probe looks
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// `/sys/class/power_supply`
    pub power_supply_root: PathBuf,
    /// `/sys/class/net`
    pub net_root: PathBuf,
    /// Thermal zone files tried in order
    pub thermal_zones: Vec<PathBuf>,
    /// Filesystem reported by `df`
    pub storage_path: PathBuf,
    /// Allow `nmcli`, `sensors`, and `df`
    pub use_commands: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            power_supply_root: PathBuf::from("/sys/class/power_supply"),
            net_root: PathBuf::from("/sys/class/net"),
            thermal_zones: vec![
                PathBuf::from("/sys/class/thermal/thermal_zone0/temp"),
                PathBuf::from("/sys/class/thermal/thermal_zone1/temp"),
                PathBuf::from("/sys/devices/virtual/thermal/thermal_zone0/temp"),
            ],
            storage_path: PathBuf::from("/"),
            use_commands: true,
        }
    }
}

/// On-demand host telemetry reader
#[derive(Debug, Clone, Default)]
pub struct HostStatusProbe {
    config: ProbeConfig,
}

/// Placeholder when no power supply information exists at all
pub const NO_POWER_INFO: &str = "No power info";

impl HostStatusProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ProbeConfig) -> Self {
        Self { config }
    }

    /// Take a snapshot on the calling thread
    pub fn snapshot_blocking(&self) -> SystemStatus {
        let config = &self.config;

        let battery = power::probe(&config.power_supply_root).unwrap_or_else(|e| {
            debug!("Power probe failed: {}", e);
            NO_POWER_INFO.to_string()
        });
        let signal = network::probe(&config.net_root, config.use_commands);
        let temperature = thermal::probe(&config.thermal_zones, config.use_commands);
        let storage = if config.use_commands {
            storage::probe(&config.storage_path).unwrap_or_else(|e| {
                debug!("Storage probe failed: {}", e);
                storage::UNAVAILABLE.to_string()
            })
        } else {
            storage::UNAVAILABLE.to_string()
        };

        SystemStatus {
            battery,
            signal,
            temperature,
            storage,
        }
    }

    /// Take a snapshot on the blocking pool
    ///
    /// ```
    /// # use mediarelay_host_status::{HostStatusProbe, ProbeConfig};
    /// # tokio_test::block_on(async {
    /// let probe = HostStatusProbe::with_config(ProbeConfig {
    ///     use_commands: false,
    ///     ..ProbeConfig::default()
    /// });
    /// let status = probe.snapshot().await;
    /// assert_eq!(status.storage, "N/A");
    /// # });
    /// ```
    pub async fn snapshot(&self) -> SystemStatus {
        let probe = self.clone();
        match tokio::task::spawn_blocking(move || probe.snapshot_blocking()).await {
            Ok(status) => status,
            Err(e) => {
                debug!("Status probe task failed: {}", e);
                SystemStatus {
                    battery: NO_POWER_INFO.to_string(),
                    signal: network::NO_CONNECTION.to_string(),
                    temperature: thermal::UNAVAILABLE.to_string(),
                    storage: storage::UNAVAILABLE.to_string(),
                }
            }
        }
    }
}

pub(crate) fn read_trimmed(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .map_err(|source| Error::Read {
            path: path.to_path_buf(),
            source,
        })
}

pub(crate) fn run_command(program: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| Error::Command {
            program: program.to_string(),
            message: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(Error::Command {
            program: program.to_string(),
            message: output.status.to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
