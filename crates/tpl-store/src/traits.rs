use serde_json::Value;
use tpl_types::EntityCategory;

use crate::error::StoreResult;
use crate::model::{Account, LoadInstance, Versions};

/// The primary store tariff plans are committed into.
///
/// Every category lives in its own key-space (`<prefix><id>`). Writes are
/// keyed overwrites, so writing the same record twice leaves the same state.
pub trait DataStore: Send + Sync {
    /// Read a record. Returns `Ok(None)` if absent.
    fn get(&self, category: EntityCategory, id: &str) -> StoreResult<Option<Value>>;

    /// Create or overwrite a record.
    fn set(&self, category: EntityCategory, id: &str, value: &Value) -> StoreResult<()>;

    /// Delete a record. Returns `true` if it existed.
    fn remove(&self, category: EntityCategory, id: &str) -> StoreResult<bool>;

    /// All identifiers stored for a category, sorted.
    fn ids(&self, category: EntityCategory) -> StoreResult<Vec<String>>;

    /// Wipe every tariff category. Accounts, versions and history survive.
    fn flush_tariff_data(&self) -> StoreResult<()>;

    /// The schema version record, if one was ever written.
    fn versions(&self) -> StoreResult<Option<Versions>>;

    fn set_versions(&self, versions: &Versions) -> StoreResult<()>;

    /// Load history, most recent first.
    fn load_history(&self) -> StoreResult<Vec<LoadInstance>>;

    /// Prepend a history entry, keeping at most `limit` entries.
    /// A `limit` of zero disables history.
    fn add_load_history(&self, instance: &LoadInstance, limit: usize) -> StoreResult<()>;

    fn get_account(&self, tenant: &str, account: &str) -> StoreResult<Option<Account>>;

    fn set_account(&self, account: &Account) -> StoreResult<()>;

    /// Delete an account. Returns `true` if it existed.
    fn remove_account(&self, tenant: &str, account: &str) -> StoreResult<bool>;

    /// Make everything written so far durable.
    ///
    /// Default is a no-op for backends that write through.
    fn commit(&self) -> StoreResult<()> {
        Ok(())
    }
}
