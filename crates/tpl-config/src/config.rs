use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Default address for the cache, scheduler and users services.
pub const DEFAULT_SERVICE_ADDR: &str = "127.0.0.1:2012";

/// Where the tariff plan is read from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    /// One JSON file per category in a directory.
    Files { path: PathBuf },
    /// A staging directory holding one sub-directory per tariff plan id.
    StorDb { path: PathBuf },
}

/// Where the tariff plan is written to. `None` keeps everything in memory.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataDbConfig {
    pub path: Option<PathBuf>,
}

/// A remote service endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnConfig {
    pub address: String,
}

impl ConnConfig {
    fn parse(service: &'static str, address: &str) -> ConfigResult<Option<Self>> {
        let address = address.trim();
        if address.is_empty() {
            return Ok(None);
        }
        let invalid = |reason: &str| ConfigError::InvalidAddress {
            service,
            address: address.to_string(),
            reason: reason.to_string(),
        };
        let (host, port) = address
            .rsplit_once(':')
            .ok_or_else(|| invalid("expected host:port"))?;
        if host.is_empty() {
            return Err(invalid("empty host"));
        }
        let port: u16 = port.parse().map_err(|_| invalid("port is not a number"))?;
        if port == 0 {
            return Err(invalid("port must be non-zero"));
        }
        Ok(Some(Self {
            address: address.to_string(),
        }))
    }
}

/// Timezone applied to timestamps the source leaves unqualified.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Timezone {
    Utc,
    Local,
    Named(String),
}

impl Timezone {
    /// Accepts `""`, `UTC`, `Local` or an IANA name such as `Europe/Berlin`.
    pub fn parse(raw: &str) -> ConfigResult<Self> {
        match raw {
            "" | "UTC" => Ok(Self::Utc),
            "Local" => Ok(Self::Local),
            name => {
                let valid = name.split('/').all(|part| {
                    !part.is_empty()
                        && part
                            .chars()
                            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '+'))
                });
                if valid {
                    Ok(Self::Named(name.to_string()))
                } else {
                    Err(ConfigError::InvalidTimezone(name.to_string()))
                }
            }
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Utc => "UTC",
            Self::Local => "Local",
            Self::Named(name) => name,
        }
    }
}

/// Connection limits for remote calls.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcConfig {
    pub connect_timeout: Duration,
    pub reply_timeout: Duration,
    pub connect_attempts: u32,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(1),
            reply_timeout: Duration::from_secs(5 * 60),
            connect_attempts: 3,
        }
    }
}

/// What the pass does with the dataset it reads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunMode {
    #[default]
    Load,
    Remove,
}

/// The complete, validated configuration of one loader run.
///
/// Assembled once at startup and handed by reference to the writer, the
/// tracker and the orchestrator. Nothing mutates it afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoaderConfig {
    pub source: SourceConfig,
    pub data_db: DataDbConfig,
    pub tpid: String,
    pub run_id: Option<String>,
    pub mode: RunMode,
    pub dry_run: bool,
    /// Check references between records and stop before writing on issues.
    pub check_references: bool,
    pub flush: bool,
    pub verbose: bool,
    pub stats: bool,
    pub disable_reverse: bool,
    pub caches: Option<ConnConfig>,
    pub scheduler: Option<ConnConfig>,
    pub users: Option<ConnConfig>,
    pub timezone: Timezone,
    pub load_history_size: usize,
    pub rpc: RpcConfig,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        let default_conn = Some(ConnConfig {
            address: DEFAULT_SERVICE_ADDR.to_string(),
        });
        Self {
            source: SourceConfig::Files {
                path: PathBuf::from("./"),
            },
            data_db: DataDbConfig::default(),
            tpid: String::new(),
            run_id: None,
            mode: RunMode::Load,
            dry_run: false,
            check_references: false,
            flush: false,
            verbose: false,
            stats: false,
            disable_reverse: false,
            caches: default_conn.clone(),
            scheduler: default_conn.clone(),
            users: default_conn,
            timezone: Timezone::Utc,
            load_history_size: 10,
            rpc: RpcConfig::default(),
        }
    }
}

impl LoaderConfig {
    /// Start from built-in defaults, layered with a TOML file if given.
    ///
    /// Not validated yet: further layers may still complete it. Call
    /// [`LoaderConfig::validate`] once the last layer is applied.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let file = match path {
            Some(path) => ConfigFile::from_path(path)?,
            None => ConfigFile::default(),
        };
        Self::default().with_overrides(file.into_overrides())
    }

    /// Apply overrides. Unset fields keep their value.
    ///
    /// Values that cannot be parsed (addresses, timezones) fail here;
    /// cross-field rules are left to [`LoaderConfig::validate`].
    pub fn with_overrides(mut self, o: ConfigOverrides) -> ConfigResult<Self> {
        if let Some(path) = o.path {
            self.source = SourceConfig::Files { path };
        }
        if let Some(path) = o.stordb_path {
            self.source = SourceConfig::StorDb { path };
        }
        if let Some(path) = o.datadb_path {
            self.data_db.path = (!path.as_os_str().is_empty()).then_some(path);
        }
        if let Some(tpid) = o.tpid {
            self.tpid = tpid;
        }
        if let Some(run_id) = o.run_id {
            self.run_id = (!run_id.is_empty()).then_some(run_id);
        }
        if let Some(remove) = o.remove {
            self.mode = if remove { RunMode::Remove } else { RunMode::Load };
        }
        self.dry_run = o.dry_run.unwrap_or(self.dry_run);
        self.check_references = o.check_references.unwrap_or(self.check_references);
        self.flush = o.flush.unwrap_or(self.flush);
        self.verbose = o.verbose.unwrap_or(self.verbose);
        self.stats = o.stats.unwrap_or(self.stats);
        self.disable_reverse = o.disable_reverse.unwrap_or(self.disable_reverse);
        if let Some(addr) = o.caches {
            self.caches = ConnConfig::parse("caches", &addr)?;
        }
        if let Some(addr) = o.scheduler {
            self.scheduler = ConnConfig::parse("scheduler", &addr)?;
        }
        if let Some(addr) = o.users {
            self.users = ConnConfig::parse("users", &addr)?;
        }
        if let Some(tz) = o.timezone {
            self.timezone = Timezone::parse(&tz)?;
        }
        self.load_history_size = o.load_history_size.unwrap_or(self.load_history_size);
        if let Some(ms) = o.connect_timeout_ms {
            self.rpc.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = o.reply_timeout_ms {
            self.rpc.reply_timeout = Duration::from_millis(ms);
        }
        self.rpc.connect_attempts = o.connect_attempts.unwrap_or(self.rpc.connect_attempts);
        Ok(self)
    }

    /// Check the fully layered configuration.
    pub fn validate(self) -> ConfigResult<Self> {
        if matches!(self.source, SourceConfig::StorDb { .. }) && self.tpid.is_empty() {
            return Err(ConfigError::MissingTpid);
        }
        if self.rpc.connect_attempts == 0 {
            return Err(ConfigError::ZeroValue("connect_attempts"));
        }
        if self.rpc.connect_timeout.is_zero() {
            return Err(ConfigError::ZeroValue("connect_timeout"));
        }
        if self.rpc.reply_timeout.is_zero() {
            return Err(ConfigError::ZeroValue("reply_timeout"));
        }
        Ok(self)
    }

    /// `true` when the cache service integration is active.
    pub fn cache_enabled(&self) -> bool {
        self.caches.is_some()
    }
}

/// Field-by-field overrides; `None` leaves the current value untouched.
///
/// For service addresses, `Some("")` disables the integration.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub path: Option<PathBuf>,
    pub stordb_path: Option<PathBuf>,
    pub datadb_path: Option<PathBuf>,
    pub tpid: Option<String>,
    pub run_id: Option<String>,
    pub remove: Option<bool>,
    pub dry_run: Option<bool>,
    pub check_references: Option<bool>,
    pub flush: Option<bool>,
    pub verbose: Option<bool>,
    pub stats: Option<bool>,
    pub disable_reverse: Option<bool>,
    pub caches: Option<String>,
    pub scheduler: Option<String>,
    pub users: Option<String>,
    pub timezone: Option<String>,
    pub load_history_size: Option<usize>,
    pub connect_timeout_ms: Option<u64>,
    pub reply_timeout_ms: Option<u64>,
    pub connect_attempts: Option<u32>,
}

/// On-disk TOML layout.
///
/// ```toml
/// tpid = "TP_RETAIL"
///
/// [source]
/// path = "/var/spool/tariffs"
///
/// [data_db]
/// path = "/var/lib/tpl/datadb"
///
/// [services]
/// caches = "127.0.0.1:2012"
/// scheduler = "127.0.0.1:2012"
/// users = ""
/// ```
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub tpid: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub load_history_size: Option<usize>,
    #[serde(default)]
    pub disable_reverse_mappings: Option<bool>,
    #[serde(default)]
    pub source: FileSource,
    #[serde(default)]
    pub data_db: FileDataDb,
    #[serde(default)]
    pub services: FileServices,
    #[serde(default)]
    pub rpc: FileRpc,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileSource {
    pub path: Option<PathBuf>,
    pub stordb_path: Option<PathBuf>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileDataDb {
    pub path: Option<PathBuf>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileServices {
    pub caches: Option<String>,
    pub scheduler: Option<String>,
    pub users: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileRpc {
    pub connect_timeout_ms: Option<u64>,
    pub reply_timeout_ms: Option<u64>,
    pub connect_attempts: Option<u32>,
}

impl ConfigFile {
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &raw)
    }

    fn parse(path: &Path, raw: &str) -> ConfigResult<Self> {
        toml::from_str(raw).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn into_overrides(self) -> ConfigOverrides {
        ConfigOverrides {
            path: self.source.path,
            stordb_path: self.source.stordb_path,
            datadb_path: self.data_db.path,
            tpid: self.tpid,
            disable_reverse: self.disable_reverse_mappings,
            caches: self.services.caches,
            scheduler: self.services.scheduler,
            users: self.services.users,
            timezone: self.timezone,
            load_history_size: self.load_history_size,
            connect_timeout_ms: self.rpc.connect_timeout_ms,
            reply_timeout_ms: self.rpc.reply_timeout_ms,
            connect_attempts: self.rpc.connect_attempts,
            ..Default::default()
        }
    }
}
