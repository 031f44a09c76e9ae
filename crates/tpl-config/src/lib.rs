//! Run configuration for the tariff plan loader.
//!
//! A [`LoaderConfig`] is built exactly once per process: built-in defaults,
//! then an optional TOML file, then command-line flags, each layer expressed
//! as [`ConfigOverrides`]. The result is validated and never mutated again.

pub mod config;
pub mod error;

pub use config::{
    ConfigFile, ConfigOverrides, ConnConfig, DataDbConfig, LoaderConfig, RpcConfig, RunMode,
    SourceConfig, Timezone, DEFAULT_SERVICE_ADDR,
};
pub use error::{ConfigError, ConfigResult};
