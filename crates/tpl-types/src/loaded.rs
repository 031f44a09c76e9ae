use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::category::{EntityCategory, FilterIndex};

/// Identifiers touched during one load or removal pass, per category.
///
/// Insertion order is preserved and duplicates are dropped, so the same
/// dataset always produces the same sequence. Never persisted.
#[derive(Clone, Debug, Default)]
pub struct LoadedIdSet {
    ids: BTreeMap<EntityCategory, Vec<String>>,
    seen: HashSet<(EntityCategory, String)>,
}

impl PartialEq for LoadedIdSet {
    fn eq(&self, other: &Self) -> bool {
        self.ids == other.ids
    }
}

impl Eq for LoadedIdSet {}

impl LoadedIdSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an identifier. Returns `false` if it was already present.
    pub fn insert(&mut self, category: EntityCategory, id: impl Into<String>) -> bool {
        let id = id.into();
        if !self.seen.insert((category, id.clone())) {
            return false;
        }
        self.ids.entry(category).or_default().push(id);
        true
    }

    /// IDs recorded for a category (empty if none).
    pub fn get(&self, category: EntityCategory) -> &[String] {
        self.ids.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains_any(&self, category: EntityCategory) -> bool {
        !self.get(category).is_empty()
    }

    /// Categories with at least one ID, in canonical order.
    pub fn categories(&self) -> impl Iterator<Item = EntityCategory> + '_ {
        self.ids.iter().filter(|(_, v)| !v.is_empty()).map(|(c, _)| *c)
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityCategory, &[String])> {
        self.ids
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(c, v)| (*c, v.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.ids.values().all(Vec::is_empty)
    }

    /// Total number of IDs across all categories.
    pub fn len(&self) -> usize {
        self.ids.values().map(Vec::len).sum()
    }

    /// Filter indexes whose backing category changed, in [`FilterIndex::ALL`] order.
    pub fn touched_indexes(&self) -> Vec<FilterIndex> {
        FilterIndex::ALL
            .into_iter()
            .filter(|idx| self.contains_any(idx.backing_category()))
            .collect()
    }
}

/// Identifier of a single loader run (UUID v7, time-ordered).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LoadId(uuid::Uuid);

impl LoadId {
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }

    pub fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// First 8 characters, for log lines.
    pub fn short_id(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for LoadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LoadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LoadId({})", self.short_id())
    }
}

impl fmt::Display for LoadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn insert_deduplicates_and_keeps_order() {
        let mut set = LoadedIdSet::new();
        assert!(set.insert(EntityCategory::Actions, "B"));
        assert!(set.insert(EntityCategory::Actions, "A"));
        assert!(!set.insert(EntityCategory::Actions, "B"));
        assert_eq!(set.get(EntityCategory::Actions), &["B".to_string(), "A".to_string()]);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn empty_set_reports_nothing() {
        let set = LoadedIdSet::new();
        assert!(set.is_empty());
        assert!(set.get(EntityCategory::Users).is_empty());
        assert_eq!(set.categories().count(), 0);
        assert!(set.touched_indexes().is_empty());
    }

    #[test]
    fn touched_indexes_follow_profile_categories() {
        let mut set = LoadedIdSet::new();
        set.insert(EntityCategory::ChargerProfiles, "CHRG_1");
        set.insert(EntityCategory::AttributeProfiles, "ATTR_1");
        set.insert(EntityCategory::Thresholds, "THD_1");
        assert_eq!(
            set.touched_indexes(),
            vec![FilterIndex::Attribute, FilterIndex::Charger]
        );
    }

    #[test]
    fn load_id_short_form() {
        let id = LoadId::new();
        assert_eq!(id.short_id().len(), 8);
        assert!(id.to_string().starts_with(&id.short_id()));
    }

    proptest! {
        #[test]
        fn index_named_iff_backing_category_non_empty(
            picks in proptest::collection::vec((0usize..23, "[A-Z]{1,4}"), 0..40)
        ) {
            let mut set = LoadedIdSet::new();
            for (idx, id) in &picks {
                set.insert(EntityCategory::ALL[*idx], id.clone());
            }
            let touched = set.touched_indexes();
            for index in FilterIndex::ALL {
                let loaded = !set.get(index.backing_category()).is_empty();
                prop_assert_eq!(touched.contains(&index), loaded);
            }
        }
    }
}
