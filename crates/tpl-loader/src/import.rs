use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tpl_types::{EntityCategory, TpDataset, TpRecord};
use tracing::{debug, info};

use crate::error::{LoaderError, LoaderResult};
use crate::source::JsonDirSource;

/// What an import into the staging store did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportSummary {
    pub tpid: String,
    pub flushed: bool,
    /// Records imported per category.
    pub counts: BTreeMap<EntityCategory, usize>,
}

impl ImportSummary {
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }
}

/// Writes a dataset into the staging store under `<root>/<tpid>/`.
///
/// The layout is the one [`StorDbSource`](crate::StorDbSource) reads back.
/// Records are upserted by id: existing ids are replaced in place, new ones
/// appended. With `flush` the tariff plan's directory is wiped first.
#[derive(Clone, Debug)]
pub struct StorDbImporter {
    root: PathBuf,
    tpid: String,
}

impl StorDbImporter {
    pub fn new(root: impl Into<PathBuf>, tpid: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            tpid: tpid.into(),
        }
    }

    /// Directory holding this tariff plan.
    pub fn dir(&self) -> PathBuf {
        self.root.join(&self.tpid)
    }

    pub fn import(&self, dataset: &TpDataset, flush: bool) -> LoaderResult<ImportSummary> {
        if self.tpid.is_empty() {
            return Err(LoaderError::MissingTpid);
        }
        let dir = self.dir();
        if flush && dir.exists() {
            info!(tpid = %self.tpid, "flushing staged tariff plan");
            fs::remove_dir_all(&dir).map_err(|source| LoaderError::Write {
                path: dir.clone(),
                source,
            })?;
        }
        fs::create_dir_all(&dir).map_err(|source| LoaderError::Write {
            path: dir.clone(),
            source,
        })?;

        let files = JsonDirSource::new(&dir);
        let mut counts = BTreeMap::new();
        for (category, records) in dataset.iter() {
            let path = files.file_for(category);
            let existing = JsonDirSource::read_file(&path)?.unwrap_or_default();
            let merged = upsert(existing, records);
            write_records(&dir, &path, &merged)?;
            debug!(%category, imported = records.len(), stored = merged.len(), "staged");
            counts.insert(category, records.len());
        }

        let summary = ImportSummary {
            tpid: self.tpid.clone(),
            flushed: flush,
            counts,
        };
        info!(tpid = %self.tpid, total = summary.total(), "tariff plan staged");
        Ok(summary)
    }
}

fn upsert(mut existing: Vec<TpRecord>, incoming: &[TpRecord]) -> Vec<TpRecord> {
    for record in incoming {
        match existing.iter_mut().find(|r| r.id == record.id) {
            Some(slot) => *slot = record.clone(),
            None => existing.push(record.clone()),
        }
    }
    existing
}

/// Replace `path` atomically with the pretty-printed records.
fn write_records(dir: &Path, path: &Path, records: &[TpRecord]) -> LoaderResult<()> {
    let failed = |source: std::io::Error| LoaderError::Write {
        path: path.to_path_buf(),
        source,
    };
    let bytes = serde_json::to_vec_pretty(records).map_err(|e| failed(e.into()))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(failed)?;
    tmp.write_all(&bytes).map_err(failed)?;
    tmp.persist(path).map_err(|e| failed(e.error))?;
    Ok(())
}
