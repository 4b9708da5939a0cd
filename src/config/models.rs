use crate::humanize::ByteSize;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            dispatch: DispatchConfig::default(),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Root directory of the package store
    #[serde(default = "default_packages_path")]
    pub packages_path: PathBuf,
    /// Upper bound on package archive uploads
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: ByteSize,
    /// Upper bound on the total decompressed size of one package
    #[serde(default = "default_max_unpacked_bytes")]
    pub max_unpacked_bytes: ByteSize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            packages_path: default_packages_path(),
            max_upload_bytes: default_max_upload_bytes(),
            max_unpacked_bytes: default_max_unpacked_bytes(),
        }
    }
}

/// Job dispatch tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DispatchConfig {
    /// Pending queue is refilled from the job source whenever it drops
    /// below this mark. Bounds memory regardless of source size.
    #[serde(default = "default_queue_low_water")]
    pub queue_low_water: usize,
    /// In-progress jobs older than this are requeued for another client.
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,
    /// How often the requeue sweep runs.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl DispatchConfig {
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_low_water: default_queue_low_water(),
            job_timeout_secs: default_job_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    "0.0.0.0:8080".parse().unwrap()
}

fn default_packages_path() -> PathBuf {
    PathBuf::from("data/packages")
}

fn default_max_upload_bytes() -> ByteSize {
    ByteSize(16 << 20) // 16 MB
}

fn default_max_unpacked_bytes() -> ByteSize {
    ByteSize(256 << 20) // 256 MB
}

fn default_queue_low_water() -> usize {
    50
}

fn default_job_timeout_secs() -> u64 {
    300
}

fn default_sweep_interval_secs() -> u64 {
    30
}
