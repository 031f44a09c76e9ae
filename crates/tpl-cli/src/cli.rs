use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tpl_config::ConfigOverrides;

#[derive(Parser, Debug)]
#[command(
    name = "tpl-loader",
    about = "Loads tariff plans into the data store and tells the caching services what changed",
    version,
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Arguments of `load` when no subcommand is given
    #[command(flatten)]
    pub load: LoadArgs,

    /// Log at debug level and report every category written
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// TOML file providing defaults; flags override it
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

impl Cli {
    /// The command to run; `load` when none was named.
    pub fn into_command(self) -> Command {
        match self.command {
            Some(command) => command,
            None => Command::Load(self.load),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load (or remove) a tariff plan, then invalidate caches
    Load(LoadArgs),
    /// Stage a tariff plan from files into the staging store
    Import(ImportArgs),
    /// Ask the services to reload everything
    Reload(ReloadArgs),
    /// Show the data store's schema versions
    Versions(VersionsArgs),
}

/// Remote service addresses. An empty string disables the service.
#[derive(Args, Debug, Default, Clone)]
pub struct ServiceArgs {
    /// Cache service address
    #[arg(long)]
    pub caches: Option<String>,
    /// Scheduler address
    #[arg(long)]
    pub scheduler: Option<String>,
    /// Users service address
    #[arg(long)]
    pub users: Option<String>,
}

#[derive(Args, Debug, Default, Clone)]
pub struct LoadArgs {
    /// Directory holding one JSON file per category
    #[arg(long)]
    pub path: Option<PathBuf>,
    /// Read the tariff plan from the staging store instead of files
    #[arg(long, requires = "stordb_path")]
    pub from_stordb: bool,
    /// Staging store root
    #[arg(long, requires = "from_stordb")]
    pub stordb_path: Option<PathBuf>,
    /// Tariff plan id
    #[arg(long)]
    pub tpid: Option<String>,
    /// Data store directory; empty keeps data in memory
    #[arg(long)]
    pub datadb_path: Option<PathBuf>,
    /// Parse and report only; write nothing, call nobody
    #[arg(long)]
    pub dry_run: bool,
    /// Check references between records and stop before writing if any dangle
    #[arg(long)]
    pub validate: bool,
    /// Wipe tariff data before loading
    #[arg(long)]
    pub flush: bool,
    /// Remove the tariff plan's records instead of loading them
    #[arg(long)]
    pub remove: bool,
    #[arg(long)]
    pub disable_reverse_mappings: bool,
    #[command(flatten)]
    pub services: ServiceArgs,
    /// Timezone for unqualified timestamps (UTC, Local or an IANA name)
    #[arg(long)]
    pub timezone: Option<String>,
    /// Load history entries to keep; 0 disables history
    #[arg(long)]
    pub load_history_size: Option<usize>,
    /// Tag recorded with this load in the history
    #[arg(long)]
    pub run_id: Option<String>,
    /// Print per-category statistics of the tariff plan
    #[arg(long)]
    pub stats: bool,
}

impl LoadArgs {
    pub fn overrides(&self, verbose: bool) -> ConfigOverrides {
        ConfigOverrides {
            path: self.path.clone(),
            stordb_path: self.stordb_path.clone().filter(|_| self.from_stordb),
            datadb_path: self.datadb_path.clone(),
            tpid: self.tpid.clone(),
            run_id: self.run_id.clone(),
            remove: flag(self.remove),
            dry_run: flag(self.dry_run),
            check_references: flag(self.validate),
            flush: flag(self.flush),
            verbose: flag(verbose),
            stats: flag(self.stats),
            disable_reverse: flag(self.disable_reverse_mappings),
            caches: self.services.caches.clone(),
            scheduler: self.services.scheduler.clone(),
            users: self.services.users.clone(),
            timezone: self.timezone.clone(),
            load_history_size: self.load_history_size,
            ..Default::default()
        }
    }
}

#[derive(Args, Debug, Default, Clone)]
pub struct ImportArgs {
    /// Directory holding one JSON file per category
    #[arg(long)]
    pub path: Option<PathBuf>,
    /// Staging store root; the plan lands in `<stordb-path>/<tpid>/`
    #[arg(long)]
    pub stordb_path: PathBuf,
    /// Tariff plan id to stage under
    #[arg(long)]
    pub tpid: Option<String>,
    /// Drop the tariff plan's staged records before importing
    #[arg(long)]
    pub flush_stordb: bool,
    /// Check references between records and stop before staging if any dangle
    #[arg(long)]
    pub validate: bool,
}

impl ImportArgs {
    pub fn overrides(&self, verbose: bool) -> ConfigOverrides {
        ConfigOverrides {
            path: self.path.clone(),
            tpid: self.tpid.clone(),
            check_references: flag(self.validate),
            verbose: flag(verbose),
            ..Default::default()
        }
    }
}

#[derive(Args, Debug, Default, Clone)]
pub struct ReloadArgs {
    /// Flush every cache instead of reloading it
    #[arg(long)]
    pub flush: bool,
    #[command(flatten)]
    pub services: ServiceArgs,
}

impl ReloadArgs {
    pub fn overrides(&self, verbose: bool) -> ConfigOverrides {
        ConfigOverrides {
            flush: flag(self.flush),
            verbose: flag(verbose),
            caches: self.services.caches.clone(),
            scheduler: self.services.scheduler.clone(),
            users: self.services.users.clone(),
            ..Default::default()
        }
    }
}

#[derive(Args, Debug, Default, Clone)]
pub struct VersionsArgs {
    /// Data store directory
    #[arg(long)]
    pub datadb_path: Option<PathBuf>,
}

/// An unset switch leaves the configured value alone.
fn flag(set: bool) -> Option<bool> {
    set.then_some(true)
}
