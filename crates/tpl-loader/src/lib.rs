//! Tariff plan ingestion and persistence.
//!
//! A pass reads a [`TpDataset`](tpl_types::TpDataset) from a [`TpSource`],
//! then hands it to a [`TpWriter`] which commits (or removes) it in the
//! primary store. While writing, the [`LoadedIdTracker`] records which
//! identifiers were touched so cache invalidation can be targeted.
//!
//! [`validate_dataset`] checks references between records before a write,
//! and [`StorDbImporter`] stages a dataset under a tariff plan id instead.

pub mod error;
pub mod import;
pub mod source;
pub mod tracker;
pub mod validate;
pub mod writer;

pub use error::{LoaderError, LoaderResult};
pub use import::{ImportSummary, StorDbImporter};
pub use source::{source_for, JsonDirSource, MemorySource, StorDbSource, TpSource};
pub use tracker::{LoadedIdTracker, NotTracked};
pub use validate::{validate_dataset, Problem, ValidationIssue, ValidationReport};
pub use writer::{TpWriter, WriteOptions, WriteSummary};
