//! Configuration management for jobgrid
//!
//! Layered configuration: default values embedded in the structs, a TOML
//! file (default `config/jobgrid.toml`, overridable via `JOBGRID_CONFIG`),
//! and `JOBGRID__<section>__<key>` environment variables on top.
//!
//! Examples:
//! - `JOBGRID__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `JOBGRID__DISPATCH__JOB_TIMEOUT_SECS=120`

mod models;
mod sources;

pub use crate::humanize::ByteSize;
pub use models::{Config, DispatchConfig, ServerConfig};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),
}

impl Config {
    /// Load configuration from all sources (file + environment).
    pub fn load() -> Result<Self, ConfigError> {
        Ok(sources::load()?)
    }

    /// Load configuration from a specific path.
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        Ok(sources::load_from_sources(path)?)
    }
}
