use std::net::AddrParseError;
use std::path::PathBuf;

use s7link_registry::ConfigError;

/// Errors reported by the engine outside its steady-state loops.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The configured bind address is not an IP address.
    #[error("invalid bind address {address:?}: {source}")]
    InvalidAddress {
        address: String,
        source: AddrParseError,
    },

    /// The message descriptors could not be registered.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The engine was built with a configuration error and will not start.
    #[error("engine is misconfigured: {0}")]
    Misconfigured(String),

    /// A worker thread could not be started.
    #[error("failed to spawn {name} worker: {source}")]
    Spawn {
        name: &'static str,
        source: std::io::Error,
    },

    /// A configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    ConfigFile {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A configuration file is not valid JSON for [`crate::EngineConfig`].
    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
