use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while assembling the run configuration. All are fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("invalid {service} address {address:?}: {reason}")]
    InvalidAddress {
        service: &'static str,
        address: String,
        reason: String,
    },

    #[error("invalid timezone {0:?}")]
    InvalidTimezone(String),

    #[error("tariff plan id required when loading from the staging store")]
    MissingTpid,

    #[error("{0} must be greater than zero")]
    ZeroValue(&'static str),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
