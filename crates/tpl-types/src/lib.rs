//! Foundation types for the tariff plan loader.
//!
//! Every other `tpl` crate depends on this one.
//!
//! # Key Types
//!
//! - [`EntityCategory`]: the closed set of tariff/configuration kinds and their key prefixes
//! - [`FilterIndex`]: secondary filter-index caches derived from profile categories
//! - [`TpRecord`] / [`TpDataset`]: records read from a tariff plan source
//! - [`LoadedIdSet`]: identifiers touched in the current pass, per category
//! - [`LoadId`]: UUID v7 identifier of a loader run

pub mod category;
pub mod error;
pub mod loaded;
pub mod record;

pub use category::{EntityCategory, FilterIndex};
pub use error::TypeError;
pub use loaded::{LoadId, LoadedIdSet};
pub use record::{Alias, AliasValue, Destination, TpDataset, TpRecord};
