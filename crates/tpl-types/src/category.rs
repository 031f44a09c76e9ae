use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// The closed set of tariff/configuration kinds the loader knows about.
///
/// Every category owns a stable key prefix in the data store (`dst_`,
/// `rpl_`, ...). Persisted keys are always `<prefix><id>`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityCategory {
    Destinations,
    ReverseDestinations,
    RatingPlans,
    RatingProfiles,
    Actions,
    ActionPlans,
    AccountActionPlans,
    SharedGroups,
    Aliases,
    ReverseAliases,
    DerivedChargers,
    ResourceProfiles,
    Resources,
    ActionTriggers,
    StatQueues,
    StatQueueProfiles,
    Thresholds,
    ThresholdProfiles,
    Filters,
    SupplierProfiles,
    AttributeProfiles,
    ChargerProfiles,
    Users,
}

impl EntityCategory {
    /// All categories in canonical order.
    pub const ALL: [EntityCategory; 23] = [
        Self::Destinations,
        Self::ReverseDestinations,
        Self::RatingPlans,
        Self::RatingProfiles,
        Self::Actions,
        Self::ActionPlans,
        Self::AccountActionPlans,
        Self::SharedGroups,
        Self::Aliases,
        Self::ReverseAliases,
        Self::DerivedChargers,
        Self::ResourceProfiles,
        Self::Resources,
        Self::ActionTriggers,
        Self::StatQueues,
        Self::StatQueueProfiles,
        Self::Thresholds,
        Self::ThresholdProfiles,
        Self::Filters,
        Self::SupplierProfiles,
        Self::AttributeProfiles,
        Self::ChargerProfiles,
        Self::Users,
    ];

    /// Key-space prefix in the data store.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Destinations => "dst_",
            Self::ReverseDestinations => "rds_",
            Self::RatingPlans => "rpl_",
            Self::RatingProfiles => "rpf_",
            Self::Actions => "act_",
            Self::ActionPlans => "apl_",
            Self::AccountActionPlans => "aap_",
            Self::SharedGroups => "shg_",
            Self::Aliases => "als_",
            Self::ReverseAliases => "rls_",
            Self::DerivedChargers => "dcs_",
            Self::ResourceProfiles => "rsp_",
            Self::Resources => "res_",
            Self::ActionTriggers => "atr_",
            Self::StatQueues => "stq_",
            Self::StatQueueProfiles => "sqp_",
            Self::Thresholds => "thd_",
            Self::ThresholdProfiles => "thp_",
            Self::Filters => "ftr_",
            Self::SupplierProfiles => "spp_",
            Self::AttributeProfiles => "alp_",
            Self::ChargerProfiles => "cpp_",
            Self::Users => "usr_",
        }
    }

    /// Snake-case name, also used as the source file stem.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Destinations => "destinations",
            Self::ReverseDestinations => "reverse_destinations",
            Self::RatingPlans => "rating_plans",
            Self::RatingProfiles => "rating_profiles",
            Self::Actions => "actions",
            Self::ActionPlans => "action_plans",
            Self::AccountActionPlans => "account_action_plans",
            Self::SharedGroups => "shared_groups",
            Self::Aliases => "aliases",
            Self::ReverseAliases => "reverse_aliases",
            Self::DerivedChargers => "derived_chargers",
            Self::ResourceProfiles => "resource_profiles",
            Self::Resources => "resources",
            Self::ActionTriggers => "action_triggers",
            Self::StatQueues => "stat_queues",
            Self::StatQueueProfiles => "stat_queue_profiles",
            Self::Thresholds => "thresholds",
            Self::ThresholdProfiles => "threshold_profiles",
            Self::Filters => "filters",
            Self::SupplierProfiles => "supplier_profiles",
            Self::AttributeProfiles => "attribute_profiles",
            Self::ChargerProfiles => "charger_profiles",
            Self::Users => "users",
        }
    }

    /// Field name carrying this category's IDs in a cache reload request.
    ///
    /// `None` for users: the users service reloads them on its own.
    pub fn reload_field(&self) -> Option<&'static str> {
        match self {
            Self::Destinations => Some("DestinationIDs"),
            Self::ReverseDestinations => Some("ReverseDestinationIDs"),
            Self::RatingPlans => Some("RatingPlanIDs"),
            Self::RatingProfiles => Some("RatingProfileIDs"),
            Self::Actions => Some("ActionIDs"),
            Self::ActionPlans => Some("ActionPlanIDs"),
            Self::AccountActionPlans => Some("AccountActionPlanIDs"),
            Self::SharedGroups => Some("SharedGroupIDs"),
            Self::Aliases => Some("AliasIDs"),
            Self::ReverseAliases => Some("ReverseAliasIDs"),
            Self::DerivedChargers => Some("DerivedChargerIDs"),
            Self::ResourceProfiles => Some("ResourceProfileIDs"),
            Self::Resources => Some("ResourceIDs"),
            Self::ActionTriggers => Some("ActionTriggerIDs"),
            Self::StatQueues => Some("StatsQueueIDs"),
            Self::StatQueueProfiles => Some("StatsQueueProfileIDs"),
            Self::Thresholds => Some("ThresholdIDs"),
            Self::ThresholdProfiles => Some("ThresholdProfileIDs"),
            Self::Filters => Some("FilterIDs"),
            Self::SupplierProfiles => Some("SupplierProfileIDs"),
            Self::AttributeProfiles => Some("AttributeProfileIDs"),
            Self::ChargerProfiles => Some("ChargerProfileIDs"),
            Self::Users => None,
        }
    }

    /// Reverse mappings are maintained by the writer, never read from a source.
    pub fn is_derived(&self) -> bool {
        matches!(self, Self::ReverseDestinations | Self::ReverseAliases)
    }

    /// The filter index backed by this category, if any.
    pub fn filter_index(&self) -> Option<FilterIndex> {
        match self {
            Self::AttributeProfiles => Some(FilterIndex::Attribute),
            Self::SupplierProfiles => Some(FilterIndex::Supplier),
            Self::ThresholdProfiles => Some(FilterIndex::Threshold),
            Self::StatQueueProfiles => Some(FilterIndex::Stat),
            Self::ResourceProfiles => Some(FilterIndex::Resource),
            Self::ChargerProfiles => Some(FilterIndex::Charger),
            _ => None,
        }
    }

    /// Full store key for an identifier in this category.
    pub fn key(&self, id: &str) -> String {
        format!("{}{}", self.prefix(), id)
    }

    /// Find the category owning a prefixed store key.
    pub fn from_key(key: &str) -> Option<(EntityCategory, &str)> {
        Self::ALL
            .iter()
            .find_map(|c| key.strip_prefix(c.prefix()).map(|id| (*c, id)))
    }

    /// Categories that can be read from a source (everything not derived).
    pub fn sourced() -> impl Iterator<Item = EntityCategory> {
        Self::ALL.into_iter().filter(|c| !c.is_derived())
    }
}

impl fmt::Display for EntityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityCategory {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| TypeError::UnknownCategory(s.to_string()))
    }
}

/// Secondary filter-index caches computed from profile records.
///
/// These are cleared, never reloaded: the cache service rebuilds them
/// lazily on the next lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FilterIndex {
    Attribute,
    Supplier,
    Threshold,
    Stat,
    Resource,
    Charger,
}

impl FilterIndex {
    /// Indexes in the order their clear keys are emitted.
    pub const ALL: [FilterIndex; 6] = [
        Self::Attribute,
        Self::Supplier,
        Self::Threshold,
        Self::Stat,
        Self::Resource,
        Self::Charger,
    ];

    /// Cache partition name understood by the cache service.
    pub fn cache_key(&self) -> &'static str {
        match self {
            Self::Attribute => "attribute_filter_indexes",
            Self::Supplier => "supplier_filter_indexes",
            Self::Threshold => "threshold_filter_indexes",
            Self::Stat => "stat_filter_indexes",
            Self::Resource => "resource_filter_indexes",
            Self::Charger => "charger_filter_indexes",
        }
    }

    /// The profile category whose records feed this index.
    pub fn backing_category(&self) -> EntityCategory {
        match self {
            Self::Attribute => EntityCategory::AttributeProfiles,
            Self::Supplier => EntityCategory::SupplierProfiles,
            Self::Threshold => EntityCategory::ThresholdProfiles,
            Self::Stat => EntityCategory::StatQueueProfiles,
            Self::Resource => EntityCategory::ResourceProfiles,
            Self::Charger => EntityCategory::ChargerProfiles,
        }
    }
}

impl fmt::Display for FilterIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cache_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn prefixes_are_unique() {
        let prefixes: HashSet<&str> = EntityCategory::ALL.iter().map(|c| c.prefix()).collect();
        assert_eq!(prefixes.len(), EntityCategory::ALL.len());
    }

    #[test]
    fn names_round_trip_through_from_str() {
        for category in EntityCategory::ALL {
            assert_eq!(category.as_str().parse::<EntityCategory>().unwrap(), category);
        }
    }

    #[test]
    fn unknown_name_is_rejected() {
        let err = "timings".parse::<EntityCategory>().unwrap_err();
        assert_eq!(err, TypeError::UnknownCategory("timings".into()));
    }

    #[test]
    fn key_and_from_key() {
        let key = EntityCategory::RatingPlans.key("RP_RETAIL");
        assert_eq!(key, "rpl_RP_RETAIL");
        assert_eq!(
            EntityCategory::from_key(&key),
            Some((EntityCategory::RatingPlans, "RP_RETAIL"))
        );
        assert_eq!(EntityCategory::from_key("zzz_nothing"), None);
    }

    #[test]
    fn users_are_not_reloaded_through_the_cache() {
        assert_eq!(EntityCategory::Users.reload_field(), None);
        assert_eq!(EntityCategory::StatQueues.reload_field(), Some("StatsQueueIDs"));
        let with_field = EntityCategory::ALL.iter().filter(|c| c.reload_field().is_some());
        assert_eq!(with_field.count(), EntityCategory::ALL.len() - 1);
    }

    #[test]
    fn only_reverse_mappings_are_derived() {
        let derived: Vec<_> = EntityCategory::ALL.iter().filter(|c| c.is_derived()).collect();
        assert_eq!(
            derived,
            vec![&EntityCategory::ReverseDestinations, &EntityCategory::ReverseAliases]
        );
        assert_eq!(EntityCategory::sourced().count(), 21);
    }

    #[test]
    fn filter_indexes_map_back_to_their_category() {
        for index in FilterIndex::ALL {
            assert_eq!(index.backing_category().filter_index(), Some(index));
        }
        let backed = EntityCategory::ALL
            .iter()
            .filter(|c| c.filter_index().is_some())
            .count();
        assert_eq!(backed, FilterIndex::ALL.len());
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&EntityCategory::StatQueueProfiles).unwrap();
        assert_eq!(json, "\"stat_queue_profiles\"");
    }
}
