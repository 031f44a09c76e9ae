use std::collections::BTreeSet;
use std::fmt;

use serde_json::Value;
use tpl_store::DataStore;
use tpl_types::{Alias, Destination, EntityCategory, TpDataset, TpRecord};
use tracing::{debug, warn};

use crate::error::LoaderResult;

/// Destination id matching every number; never stored as a record.
pub const ANY_DESTINATION: &str = "*any";

/// A cross-record reference: `from` records list items under `field`,
/// each naming a `to` record through `key`.
struct Reference {
    from: EntityCategory,
    field: &'static str,
    key: &'static str,
    to: EntityCategory,
}

const REFERENCES: &[Reference] = &[
    Reference {
        from: EntityCategory::RatingProfiles,
        field: "activations",
        key: "rating_plan_id",
        to: EntityCategory::RatingPlans,
    },
    Reference {
        from: EntityCategory::RatingPlans,
        field: "rates",
        key: "destination_id",
        to: EntityCategory::Destinations,
    },
    Reference {
        from: EntityCategory::ActionPlans,
        field: "action_timings",
        key: "actions_id",
        to: EntityCategory::Actions,
    },
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Problem {
    /// The record body does not have the shape its category requires.
    Malformed(String),
    /// The record names a record that is neither loaded nor stored.
    DanglingReference { category: EntityCategory, id: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationIssue {
    pub category: EntityCategory,
    pub id: String,
    pub problem: Problem,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.problem {
            Problem::Malformed(reason) => write!(f, "{} {}: {reason}", self.category, self.id),
            Problem::DanglingReference { category, id } => {
                write!(f, "{} {}: unknown {category} {id}", self.category, self.id)
            }
        }
    }
}

/// Outcome of [`validate_dataset`]. Issues are in category order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Structural check of a dataset before it is written.
///
/// Destinations and aliases must parse into their typed views, and every
/// reference in [`REFERENCES`] must resolve, first against the dataset and
/// then against `store` when one is given. Store failures are errors; data
/// problems are collected into the report.
pub fn validate_dataset(
    dataset: &TpDataset,
    store: Option<&dyn DataStore>,
) -> LoaderResult<ValidationReport> {
    let mut issues = Vec::new();

    for record in dataset.records(EntityCategory::Destinations) {
        if let Err(e) = Destination::from_record(record) {
            issues.push(malformed(EntityCategory::Destinations, record, e.to_string()));
        }
    }
    for record in dataset.records(EntityCategory::Aliases) {
        if let Err(e) = Alias::from_record(record) {
            issues.push(malformed(EntityCategory::Aliases, record, e.to_string()));
        }
    }

    for reference in REFERENCES {
        let loaded: BTreeSet<&str> = dataset
            .records(reference.to)
            .iter()
            .map(|r| r.id.as_str())
            .collect();
        for record in dataset.records(reference.from) {
            let targets = match referenced_ids(record, reference) {
                Ok(targets) => targets,
                Err(reason) => {
                    issues.push(malformed(reference.from, record, reason));
                    continue;
                }
            };
            for target in targets {
                if loaded.contains(target.as_str()) || is_exempt(reference.to, &target) {
                    continue;
                }
                if let Some(store) = store {
                    if store.get(reference.to, &target)?.is_some() {
                        debug!(
                            category = %reference.to,
                            id = %target,
                            "reference resolved from store"
                        );
                        continue;
                    }
                }
                issues.push(ValidationIssue {
                    category: reference.from,
                    id: record.id.clone(),
                    problem: Problem::DanglingReference {
                        category: reference.to,
                        id: target,
                    },
                });
            }
        }
    }

    for issue in &issues {
        warn!(%issue, "tariff plan validation");
    }
    Ok(ValidationReport { issues })
}

fn malformed(category: EntityCategory, record: &TpRecord, reason: String) -> ValidationIssue {
    ValidationIssue {
        category,
        id: record.id.clone(),
        problem: Problem::Malformed(reason),
    }
}

fn is_exempt(category: EntityCategory, id: &str) -> bool {
    category == EntityCategory::Destinations && id == ANY_DESTINATION
}

/// Ids named by `record` under the reference's field. A missing field names
/// nothing; a field of the wrong shape is malformed.
fn referenced_ids(record: &TpRecord, reference: &Reference) -> Result<Vec<String>, String> {
    let items = match record.body.get(reference.field) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(format!("{} must be a list", reference.field)),
    };
    items
        .iter()
        .map(|item| match item.get(reference.key) {
            Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
            _ => Err(format!("{} entry without {}", reference.field, reference.key)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tpl_store::InMemoryDataStore;

    fn rating_plan(id: &str, destination: &str) -> TpRecord {
        TpRecord::new(id, json!({ "rates": [{ "destination_id": destination, "rate": 0.1 }] }))
    }

    fn profile(id: &str, plan: &str) -> TpRecord {
        TpRecord::new(id, json!({ "activations": [{ "rating_plan_id": plan }] }))
    }

    fn consistent() -> TpDataset {
        TpDataset::new()
            .with(
                EntityCategory::Destinations,
                vec![TpRecord::new("DST_DE", json!({ "prefixes": ["49"] }))],
            )
            .unwrap()
            .with(
                EntityCategory::RatingPlans,
                vec![rating_plan("RP_DE", "DST_DE"), rating_plan("RP_ANY", ANY_DESTINATION)],
            )
            .unwrap()
            .with(
                EntityCategory::RatingProfiles,
                vec![profile("*out:cgrates.org:call:*any", "RP_DE")],
            )
            .unwrap()
            .with(EntityCategory::Actions, vec![TpRecord::bare("ACT_TOPUP")])
            .unwrap()
            .with(
                EntityCategory::ActionPlans,
                vec![TpRecord::new(
                    "AP_MONTHLY",
                    json!({ "action_timings": [{ "actions_id": "ACT_TOPUP" }] }),
                )],
            )
            .unwrap()
    }

    #[test]
    fn consistent_plan_is_valid() {
        let report = validate_dataset(&consistent(), None).unwrap();
        assert!(report.is_valid(), "{:?}", report.issues);
    }

    #[test]
    fn dangling_references_are_reported() {
        let ds = consistent()
            .with(
                EntityCategory::RatingProfiles,
                vec![profile("*out:cgrates.org:call:1001", "RP_GONE")],
            )
            .unwrap()
            .with(EntityCategory::RatingPlans, vec![rating_plan("RP_FR", "DST_FR")])
            .unwrap();

        let report = validate_dataset(&ds, None).unwrap();
        let found: Vec<_> = report
            .issues
            .iter()
            .map(|i| (i.category, i.id.as_str(), i.problem.clone()))
            .collect();
        assert_eq!(
            found,
            vec![
                (
                    EntityCategory::RatingProfiles,
                    "*out:cgrates.org:call:1001",
                    Problem::DanglingReference {
                        category: EntityCategory::RatingPlans,
                        id: "RP_GONE".into()
                    }
                ),
                (
                    EntityCategory::RatingPlans,
                    "RP_FR",
                    Problem::DanglingReference {
                        category: EntityCategory::Destinations,
                        id: "DST_FR".into()
                    }
                ),
            ]
        );
        assert_eq!(
            report.issues[0].to_string(),
            "rating_profiles *out:cgrates.org:call:1001: unknown rating_plans RP_GONE"
        );
    }

    #[test]
    fn stored_records_satisfy_references() {
        let store = InMemoryDataStore::new();
        store
            .set(EntityCategory::Destinations, "DST_FR", &json!({ "prefixes": ["33"] }))
            .unwrap();
        let ds = TpDataset::new()
            .with(EntityCategory::RatingPlans, vec![rating_plan("RP_FR", "DST_FR")])
            .unwrap();

        assert!(!validate_dataset(&ds, None).unwrap().is_valid());
        assert!(validate_dataset(&ds, Some(&store as &dyn DataStore)).unwrap().is_valid());
    }

    #[test]
    fn malformed_records_are_reported() {
        let ds = TpDataset::new()
            .with(
                EntityCategory::Destinations,
                vec![TpRecord::new("DST_BAD", json!({ "prefixes": 49 }))],
            )
            .unwrap()
            .with(
                EntityCategory::ActionPlans,
                vec![TpRecord::new("AP_BAD", json!({ "action_timings": "ACT" }))],
            )
            .unwrap()
            .with(
                EntityCategory::RatingProfiles,
                vec![TpRecord::new("RPF", json!({ "activations": [{}] }))],
            )
            .unwrap();

        let report = validate_dataset(&ds, None).unwrap();
        let ids: Vec<_> = report.issues.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["DST_BAD", "RPF", "AP_BAD"]);
        assert!(report
            .issues
            .iter()
            .all(|i| matches!(i.problem, Problem::Malformed(_))));
    }
}
