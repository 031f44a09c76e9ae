use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tpl_config::SourceConfig;
use tpl_types::{EntityCategory, TpDataset, TpRecord};
use tracing::{debug, warn};

use crate::error::{LoaderError, LoaderResult};

/// Anything that can produce a tariff plan dataset.
pub trait TpSource {
    /// Read the complete dataset.
    fn read(&self) -> LoaderResult<TpDataset>;

    /// Human-readable description for logs.
    fn describe(&self) -> String;
}

/// Reads `<dir>/<category>.json`, each holding an array of records.
///
/// Missing files mean "nothing of that kind". Files for derived categories
/// are ignored with a warning since the writer rebuilds those itself.
#[derive(Clone, Debug)]
pub struct JsonDirSource {
    dir: PathBuf,
}

impl JsonDirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub(crate) fn file_for(&self, category: EntityCategory) -> PathBuf {
        self.dir.join(format!("{}.json", category.as_str()))
    }

    pub(crate) fn read_file(path: &Path) -> LoaderResult<Option<Vec<TpRecord>>> {
        let raw = match fs::read(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(LoaderError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|e| LoaderError::Parse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }
}

impl TpSource for JsonDirSource {
    fn read(&self) -> LoaderResult<TpDataset> {
        if !self.dir.is_dir() {
            return Err(LoaderError::SourceNotFound(self.dir.clone()));
        }
        let mut dataset = TpDataset::new();
        for category in EntityCategory::ALL {
            let path = self.file_for(category);
            if category.is_derived() {
                if path.exists() {
                    warn!(path = %path.display(), "ignoring derived category file");
                }
                continue;
            }
            if let Some(records) = Self::read_file(&path)? {
                debug!(%category, count = records.len(), "read records");
                dataset.insert(category, records)?;
            }
        }
        Ok(dataset)
    }

    fn describe(&self) -> String {
        format!("files in {}", self.dir.display())
    }
}

/// Staging store: one [`JsonDirSource`] per tariff plan id under a root.
#[derive(Clone, Debug)]
pub struct StorDbSource {
    root: PathBuf,
    tpid: String,
}

impl StorDbSource {
    pub fn new(root: impl Into<PathBuf>, tpid: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            tpid: tpid.into(),
        }
    }
}

impl TpSource for StorDbSource {
    fn read(&self) -> LoaderResult<TpDataset> {
        JsonDirSource::new(self.root.join(&self.tpid)).read()
    }

    fn describe(&self) -> String {
        format!("staging store {} (tpid {})", self.root.display(), self.tpid)
    }
}

/// A dataset already in memory.
#[derive(Clone, Debug, Default)]
pub struct MemorySource {
    dataset: TpDataset,
}

impl MemorySource {
    pub fn new(dataset: TpDataset) -> Self {
        Self { dataset }
    }
}

impl TpSource for MemorySource {
    fn read(&self) -> LoaderResult<TpDataset> {
        Ok(self.dataset.clone())
    }

    fn describe(&self) -> String {
        format!("in-memory dataset ({} records)", self.dataset.len())
    }
}

/// Build the source selected by configuration.
pub fn source_for(config: &SourceConfig, tpid: &str) -> Box<dyn TpSource> {
    match config {
        SourceConfig::Files { path } => Box::new(JsonDirSource::new(path)),
        SourceConfig::StorDb { path } => Box::new(StorDbSource::new(path, tpid)),
    }
}
