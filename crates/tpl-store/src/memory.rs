use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;
use tpl_types::EntityCategory;

use crate::error::{StoreError, StoreResult};
use crate::model::{account_id, Account, LoadInstance, Versions};
use crate::traits::DataStore;

const VERSIONS_KEY: &str = "versions";
const LOAD_HISTORY_KEY: &str = "load_history";
const ACCOUNT_PREFIX: &str = "acc_";

/// In-memory, BTreeMap-based data store.
///
/// Keys are laid out exactly as a key-value database would hold them
/// (`rpl_RP_RETAIL`, `acc_cgrates.org:1001`, ...), which keeps
/// [`Self::snapshot`] comparable across runs.
pub struct InMemoryDataStore {
    entries: RwLock<BTreeMap<String, Value>>,
}

impl InMemoryDataStore {
    pub fn new() -> Self {
        Self::from_snapshot(BTreeMap::new())
    }

    /// Rebuild a store from a previously taken snapshot.
    pub fn from_snapshot(entries: BTreeMap<String, Value>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Copy of every key and value currently held.
    pub fn snapshot(&self) -> StoreResult<BTreeMap<String, Value>> {
        Ok(self.read()?.clone())
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, BTreeMap<String, Value>>> {
        self.entries
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, BTreeMap<String, Value>>> {
        self.entries
            .write()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }

    fn decode<T: serde::de::DeserializeOwned>(key: &str, value: &Value) -> StoreResult<T> {
        serde_json::from_value(value.clone()).map_err(|e| StoreError::Corrupt {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }
}

impl Default for InMemoryDataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DataStore for InMemoryDataStore {
    fn get(&self, category: EntityCategory, id: &str) -> StoreResult<Option<Value>> {
        Ok(self.read()?.get(&category.key(id)).cloned())
    }

    fn set(&self, category: EntityCategory, id: &str, value: &Value) -> StoreResult<()> {
        self.write()?.insert(category.key(id), value.clone());
        Ok(())
    }

    fn remove(&self, category: EntityCategory, id: &str) -> StoreResult<bool> {
        Ok(self.write()?.remove(&category.key(id)).is_some())
    }

    fn ids(&self, category: EntityCategory) -> StoreResult<Vec<String>> {
        let map = self.read()?;
        let prefix = category.prefix();
        Ok(map
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k[prefix.len()..].to_string())
            .collect())
    }

    fn flush_tariff_data(&self) -> StoreResult<()> {
        self.write()?
            .retain(|key, _| EntityCategory::from_key(key).is_none());
        Ok(())
    }

    fn versions(&self) -> StoreResult<Option<Versions>> {
        self.read()?
            .get(VERSIONS_KEY)
            .map(|v| Self::decode(VERSIONS_KEY, v))
            .transpose()
    }

    fn set_versions(&self, versions: &Versions) -> StoreResult<()> {
        let value = serde_json::to_value(versions)?;
        self.write()?.insert(VERSIONS_KEY.to_string(), value);
        Ok(())
    }

    fn load_history(&self) -> StoreResult<Vec<LoadInstance>> {
        Ok(self
            .read()?
            .get(LOAD_HISTORY_KEY)
            .map(|v| Self::decode(LOAD_HISTORY_KEY, v))
            .transpose()?
            .unwrap_or_default())
    }

    fn add_load_history(&self, instance: &LoadInstance, limit: usize) -> StoreResult<()> {
        if limit == 0 {
            return Ok(());
        }
        let mut history = self.load_history()?;
        history.insert(0, instance.clone());
        history.truncate(limit);
        let value = serde_json::to_value(&history)?;
        self.write()?.insert(LOAD_HISTORY_KEY.to_string(), value);
        Ok(())
    }

    fn get_account(&self, tenant: &str, account: &str) -> StoreResult<Option<Account>> {
        let key = format!("{ACCOUNT_PREFIX}{}", account_id(tenant, account));
        self.read()?
            .get(&key)
            .map(|v| Self::decode(&key, v))
            .transpose()
    }

    fn set_account(&self, account: &Account) -> StoreResult<()> {
        let key = format!("{ACCOUNT_PREFIX}{}", account.full_id());
        let value = serde_json::to_value(account)?;
        self.write()?.insert(key, value);
        Ok(())
    }

    fn remove_account(&self, tenant: &str, account: &str) -> StoreResult<bool> {
        let key = format!("{ACCOUNT_PREFIX}{}", account_id(tenant, account));
        Ok(self.write()?.remove(&key).is_some())
    }
}

impl std::fmt::Debug for InMemoryDataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryDataStore")
            .field("key_count", &self.len())
            .finish()
    }
}
