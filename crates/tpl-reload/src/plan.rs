use std::collections::BTreeMap;

use tpl_rpc::AttrReloadCache;
use tpl_types::{EntityCategory, FilterIndex, LoadedIdSet};

/// Which identifiers of a category the cache service must reload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IdSelection {
    Ids(Vec<String>),
    All,
}

/// What the cache service is told after a load.
///
/// Only categories touched by the pass appear; an untouched category is
/// never reloaded. The filter-index keys to clear travel with the plan.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InvalidationPlan {
    pub flush_all: bool,
    entries: BTreeMap<EntityCategory, IdSelection>,
    index_keys: Vec<String>,
}

impl InvalidationPlan {
    /// Plan for the identifiers a pass touched.
    ///
    /// With `flush`, every touched category is reloaded in full.
    pub fn from_loaded(loaded: &LoadedIdSet, flush: bool) -> Self {
        let entries = loaded
            .iter()
            .filter(|(_, ids)| !ids.is_empty())
            .map(|(category, ids)| {
                let selection = if flush {
                    IdSelection::All
                } else {
                    IdSelection::Ids(ids.to_vec())
                };
                (category, selection)
            })
            .collect();
        let index_keys = loaded
            .touched_indexes()
            .into_iter()
            .map(|idx| idx.cache_key().to_string())
            .collect();
        Self {
            flush_all: flush,
            entries,
            index_keys,
        }
    }

    /// Reload every category and clear every filter index.
    pub fn reload_all(flush: bool) -> Self {
        Self {
            flush_all: flush,
            entries: EntityCategory::ALL
                .into_iter()
                .map(|c| (c, IdSelection::All))
                .collect(),
            index_keys: FilterIndex::ALL
                .into_iter()
                .map(|idx| idx.cache_key().to_string())
                .collect(),
        }
    }

    pub fn get(&self, category: EntityCategory) -> Option<&IdSelection> {
        self.entries.get(&category)
    }

    pub fn contains(&self, category: EntityCategory) -> bool {
        self.entries.contains_key(&category)
    }

    pub fn categories(&self) -> impl Iterator<Item = EntityCategory> + '_ {
        self.entries.keys().copied()
    }

    /// Filter-index cache keys to clear. May be empty.
    pub fn index_keys(&self) -> &[String] {
        &self.index_keys
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Wire argument of the cache reload call.
    ///
    /// Every reload field is present. An untouched category is sent as an
    /// empty list, since a missing or `null` field means "reload all".
    pub fn to_args(&self) -> AttrReloadCache {
        let ids = EntityCategory::ALL
            .into_iter()
            .filter_map(|category| {
                let field = category.reload_field()?;
                let ids = match self.entries.get(&category) {
                    Some(IdSelection::Ids(ids)) => Some(ids.clone()),
                    Some(IdSelection::All) => None,
                    None => Some(Vec::new()),
                };
                Some((field.to_string(), ids))
            })
            .collect();
        AttrReloadCache {
            flush_all: self.flush_all,
            ids,
        }
    }
}
