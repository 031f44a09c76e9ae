use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tpl_types::EntityCategory;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::memory::InMemoryDataStore;
use crate::model::{Account, LoadInstance, Versions};
use crate::traits::DataStore;

const DATA_FILE: &str = "datadb.json";

/// Directory-backed data store.
///
/// Keeps the working set in memory and writes it to `<dir>/datadb.json` on
/// [`DataStore::commit`]. The file is replaced atomically: readers see
/// either the previous or the new state, never a torn one.
pub struct DirDataStore {
    root: PathBuf,
    inner: InMemoryDataStore,
}

impl DirDataStore {
    /// Open (or create) a store rooted at `root`.
    pub fn open(root: &Path) -> StoreResult<Self> {
        fs::create_dir_all(root)?;
        let file = root.join(DATA_FILE);
        let entries: BTreeMap<String, Value> = if file.exists() {
            let raw = fs::read(&file)?;
            serde_json::from_slice(&raw).map_err(|e| StoreError::Corrupt {
                key: file.display().to_string(),
                reason: e.to_string(),
            })?
        } else {
            BTreeMap::new()
        };
        debug!(path = %file.display(), keys = entries.len(), "opened data store");
        Ok(Self {
            root: root.to_path_buf(),
            inner: InMemoryDataStore::from_snapshot(entries),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl DataStore for DirDataStore {
    fn get(&self, category: EntityCategory, id: &str) -> StoreResult<Option<Value>> {
        self.inner.get(category, id)
    }

    fn set(&self, category: EntityCategory, id: &str, value: &Value) -> StoreResult<()> {
        self.inner.set(category, id, value)
    }

    fn remove(&self, category: EntityCategory, id: &str) -> StoreResult<bool> {
        self.inner.remove(category, id)
    }

    fn ids(&self, category: EntityCategory) -> StoreResult<Vec<String>> {
        self.inner.ids(category)
    }

    fn flush_tariff_data(&self) -> StoreResult<()> {
        self.inner.flush_tariff_data()
    }

    fn versions(&self) -> StoreResult<Option<Versions>> {
        self.inner.versions()
    }

    fn set_versions(&self, versions: &Versions) -> StoreResult<()> {
        self.inner.set_versions(versions)
    }

    fn load_history(&self) -> StoreResult<Vec<LoadInstance>> {
        self.inner.load_history()
    }

    fn add_load_history(&self, instance: &LoadInstance, limit: usize) -> StoreResult<()> {
        self.inner.add_load_history(instance, limit)
    }

    fn get_account(&self, tenant: &str, account: &str) -> StoreResult<Option<Account>> {
        self.inner.get_account(tenant, account)
    }

    fn set_account(&self, account: &Account) -> StoreResult<()> {
        self.inner.set_account(account)
    }

    fn remove_account(&self, tenant: &str, account: &str) -> StoreResult<bool> {
        self.inner.remove_account(tenant, account)
    }

    fn commit(&self) -> StoreResult<()> {
        let snapshot = self.inner.snapshot()?;
        let bytes = serde_json::to_vec_pretty(&snapshot)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.root)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        let target = self.root.join(DATA_FILE);
        tmp.persist(&target).map_err(|e| StoreError::Io(e.error))?;
        debug!(path = %target.display(), keys = snapshot.len(), "committed data store");
        Ok(())
    }
}

impl std::fmt::Debug for DirDataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirDataStore")
            .field("root", &self.root)
            .field("key_count", &self.inner.len())
            .finish()
    }
}
