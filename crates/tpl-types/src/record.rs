use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::category::EntityCategory;
use crate::error::TypeError;

/// One tariff plan entity as read from a source.
///
/// The loader does not interpret most bodies; it only needs the identifier
/// to key the store. Destinations and aliases have typed views because the
/// writer derives reverse mappings from them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TpRecord {
    pub id: String,
    #[serde(default)]
    pub body: Value,
}

impl TpRecord {
    pub fn new(id: impl Into<String>, body: Value) -> Self {
        Self {
            id: id.into(),
            body,
        }
    }

    /// A record with an empty (`null`) body.
    pub fn bare(id: impl Into<String>) -> Self {
        Self::new(id, Value::Null)
    }

    fn typed<T: for<'de> Deserialize<'de>>(
        &self,
        category: EntityCategory,
    ) -> Result<T, TypeError> {
        serde_json::from_value(self.body.clone()).map_err(|e| TypeError::MalformedRecord {
            category: category.to_string(),
            id: self.id.clone(),
            reason: e.to_string(),
        })
    }
}

/// Typed view of a destination body.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    #[serde(default)]
    pub prefixes: Vec<String>,
}

impl Destination {
    pub fn from_record(record: &TpRecord) -> Result<Self, TypeError> {
        record.typed(EntityCategory::Destinations)
    }
}

/// Typed view of an alias body.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alias {
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub values: Vec<AliasValue>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasValue {
    #[serde(default)]
    pub destination_id: String,
    #[serde(default)]
    pub field: String,
    #[serde(default)]
    pub initial: String,
    pub alias: String,
}

impl Alias {
    pub fn from_record(record: &TpRecord) -> Result<Self, TypeError> {
        record.typed(EntityCategory::Aliases)
    }

    /// Reverse-alias keys (`<alias>:<context>`) this alias contributes to.
    pub fn reverse_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .values
            .iter()
            .map(|v| format!("{}:{}", v.alias, self.context))
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }
}

/// An in-memory tariff plan: records grouped per category.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TpDataset {
    records: BTreeMap<EntityCategory, Vec<TpRecord>>,
}

impl TpDataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append records for a category. Derived categories are rejected.
    pub fn insert(
        &mut self,
        category: EntityCategory,
        records: impl IntoIterator<Item = TpRecord>,
    ) -> Result<(), TypeError> {
        if category.is_derived() {
            return Err(TypeError::UnknownCategory(format!(
                "{category} is derived and cannot be loaded"
            )));
        }
        let bucket = self.records.entry(category).or_default();
        for record in records {
            if record.id.is_empty() {
                return Err(TypeError::EmptyId(category.to_string()));
            }
            bucket.push(record);
        }
        Ok(())
    }

    /// Builder-style insert for tests and fixtures.
    pub fn with(
        mut self,
        category: EntityCategory,
        records: Vec<TpRecord>,
    ) -> Result<Self, TypeError> {
        self.insert(category, records)?;
        Ok(self)
    }

    pub fn records(&self, category: EntityCategory) -> &[TpRecord] {
        self.records.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Non-empty categories in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityCategory, &[TpRecord])> {
        self.records
            .iter()
            .filter(|(_, r)| !r.is_empty())
            .map(|(c, r)| (*c, r.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.records.values().all(Vec::is_empty)
    }

    /// Total records across all categories.
    pub fn len(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }

    /// Record counts per non-empty category.
    pub fn stats(&self) -> BTreeMap<EntityCategory, usize> {
        self.iter().map(|(c, r)| (c, r.len())).collect()
    }
}
