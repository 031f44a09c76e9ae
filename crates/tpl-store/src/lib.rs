//! Primary data store for the tariff plan loader.
//!
//! The loader commits tariff plan records into a [`DataStore`]; downstream
//! services then reload their caches from it. Each entity category lives in
//! its own key-space (`dst_`, `rpl_`, ...) so records of different kinds
//! never collide.
//!
//! # Backends
//!
//! - [`InMemoryDataStore`] -- `BTreeMap`-based store for tests, dry runs and embedding
//! - [`DirDataStore`] -- directory-backed store with atomic commits
//!
//! Besides tariff records the store holds a schema version record
//! ([`current_versions`], [`version_drift`]), the load history, and accounts.

pub mod dir;
pub mod error;
pub mod memory;
pub mod model;
pub mod traits;

pub use dir::DirDataStore;
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryDataStore;
pub use model::{
    account_id, current_versions, version_drift, Account, LoadInstance, VersionDrift, Versions,
};
pub use traits::DataStore;
