//! Runtime configuration, persisted as JSON

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backup::DEFAULT_RETENTION;
use crate::network::{DEFAULT_TCP_PORT, DEFAULT_UDP_PORT};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Transport settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    pub tcp_port: u16,
    pub udp_port: u16,
    /// Where the host sends discovery beacons.
    pub discovery_target: SocketAddr,
    /// Length of one host/client tick.
    pub tick_interval_ms: u64,
    /// The host broadcasts once every this many ticks.
    pub broadcast_every_ticks: u64,
}

impl NetConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            tcp_port: DEFAULT_TCP_PORT,
            udp_port: DEFAULT_UDP_PORT,
            discovery_target: SocketAddr::from(([255, 255, 255, 255], DEFAULT_UDP_PORT)),
            tick_interval_ms: 16,
            broadcast_every_ticks: 60,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SD working directory: merged snapshot, backups, counter, names.
    pub data_dir: PathBuf,
    /// File standing in for the hardware save region.
    pub archive_path: PathBuf,
    pub backup_retention: usize,
    pub network: NetConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./activity-log-pp"),
            archive_path: PathBuf::from("pld.dat"),
            backup_retention: DEFAULT_RETENTION,
            network: NetConfig::default(),
        }
    }
}

impl Config {
    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(json) => Ok(serde_json::from_str(&json)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
