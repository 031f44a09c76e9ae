use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tpl_types::EntityCategory;

/// Schema revision per subsystem, as recorded in the store.
pub type Versions = BTreeMap<String, i64>;

/// The revisions this build reads and writes.
pub fn current_versions() -> Versions {
    [
        ("Destinations", 1),
        ("RatingPlans", 1),
        ("RatingProfiles", 1),
        ("Actions", 2),
        ("ActionPlans", 2),
        ("ActionTriggers", 2),
        ("SharedGroups", 2),
        ("Accounts", 3),
        ("Alias", 1),
        ("User", 1),
        ("DerivedChargers", 1),
        ("Resource", 1),
        ("Stats", 2),
        ("Thresholds", 2),
        ("Filters", 1),
        ("Suppliers", 1),
        ("Attributes", 2),
        ("Chargers", 1),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

/// A subsystem whose stored revision differs from the current build.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionDrift {
    pub subsystem: String,
    pub current: i64,
    pub stored: Option<i64>,
}

/// Compare a stored version record against [`current_versions`].
pub fn version_drift(stored: &Versions) -> Vec<VersionDrift> {
    current_versions()
        .into_iter()
        .filter_map(|(subsystem, current)| {
            let found = stored.get(&subsystem).copied();
            (found != Some(current)).then_some(VersionDrift {
                subsystem,
                current,
                stored: found,
            })
        })
        .collect()
}

/// One entry of the load history kept in the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadInstance {
    pub load_id: String,
    pub run_id: Option<String>,
    pub tariff_plan_id: String,
    pub load_time: DateTime<Utc>,
    pub timezone: String,
    pub counts: BTreeMap<EntityCategory, usize>,
}

/// Minimal account record, enough to bind a subject for rating.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub tenant: String,
    pub account: String,
    #[serde(default)]
    pub allow_negative: bool,
    #[serde(default)]
    pub disabled: bool,
}

impl Account {
    pub fn new(tenant: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            account: account.into(),
            ..Default::default()
        }
    }

    /// `<tenant>:<account>`
    pub fn full_id(&self) -> String {
        account_id(&self.tenant, &self.account)
    }
}

pub fn account_id(tenant: &str, account: &str) -> String {
    format!("{tenant}:{account}")
}
