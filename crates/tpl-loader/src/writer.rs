use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use serde_json::Value;
use tpl_config::LoaderConfig;
use tpl_store::{current_versions, DataStore, LoadInstance};
use tpl_types::{Alias, Destination, EntityCategory, LoadId, TpDataset, TpRecord};
use tracing::{debug, info};

use crate::error::{LoaderError, LoaderResult};
use crate::tracker::LoadedIdTracker;

/// The part of the run configuration the writer cares about.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteOptions {
    pub flush: bool,
    pub verbose: bool,
    pub disable_reverse: bool,
    pub load_history_size: usize,
    pub tpid: String,
    pub run_id: Option<String>,
    pub timezone: String,
}

impl WriteOptions {
    pub fn from_config(config: &LoaderConfig) -> Self {
        Self {
            flush: config.flush,
            verbose: config.verbose,
            disable_reverse: config.disable_reverse,
            load_history_size: config.load_history_size,
            tpid: config.tpid.clone(),
            run_id: config.run_id.clone(),
            timezone: config.timezone.as_str().to_string(),
        }
    }
}

/// What a write or removal pass did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteSummary {
    pub load_id: LoadId,
    /// Records written (or removed) per category, reverse mappings included.
    pub counts: BTreeMap<EntityCategory, usize>,
}

impl WriteSummary {
    fn new() -> Self {
        Self {
            load_id: LoadId::new(),
            counts: BTreeMap::new(),
        }
    }

    fn bump(&mut self, category: EntityCategory) {
        *self.counts.entry(category).or_default() += 1;
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }
}

/// Commits a dataset into the primary store, or removes it.
///
/// Every touched identifier is reported to the [`LoadedIdTracker`], including
/// reverse-mapping keys, so the orchestrator can later tell the cache service
/// exactly what changed.
pub struct TpWriter<'a, S: DataStore + ?Sized> {
    store: &'a S,
    options: WriteOptions,
}

impl<'a, S: DataStore + ?Sized> TpWriter<'a, S> {
    pub fn new(store: &'a S, options: WriteOptions) -> Self {
        Self { store, options }
    }

    pub fn options(&self) -> &WriteOptions {
        &self.options
    }

    /// Persist every record of `dataset`.
    ///
    /// With `flush`, all tariff data is wiped first and the schema versions
    /// are re-stamped. Any store failure aborts the pass.
    pub fn write_to_store(
        &self,
        dataset: &TpDataset,
        tracker: &mut LoadedIdTracker,
    ) -> LoaderResult<WriteSummary> {
        let mut summary = WriteSummary::new();
        info!(
            load_id = %summary.load_id.short_id(),
            records = dataset.len(),
            flush = self.options.flush,
            "writing tariff plan"
        );
        if !self.options.disable_reverse {
            check_reverse_views(dataset)?;
        }

        if self.options.flush {
            info!("flushing tariff data");
            self.store.flush_tariff_data()?;
            self.store.set_versions(&current_versions())?;
        } else if self.store.versions()?.is_none() {
            self.store.set_versions(&current_versions())?;
        }

        for (category, records) in dataset.iter() {
            for record in records {
                self.write_record(category, record, tracker, &mut summary)?;
            }
            if self.options.verbose {
                info!(%category, count = records.len(), "written");
            }
        }

        let instance = LoadInstance {
            load_id: summary.load_id.to_string(),
            run_id: self.options.run_id.clone(),
            tariff_plan_id: self.options.tpid.clone(),
            load_time: Utc::now(),
            timezone: self.options.timezone.clone(),
            counts: summary.counts.clone(),
        };
        self.store
            .add_load_history(&instance, self.options.load_history_size)?;
        self.store.commit()?;

        info!(
            load_id = %summary.load_id.short_id(),
            total = summary.total(),
            "tariff plan written"
        );
        Ok(summary)
    }

    /// Remove every record of `dataset` that exists in the store.
    ///
    /// Only identifiers actually removed are tracked. No load history entry
    /// is recorded.
    pub fn remove_from_store(
        &self,
        dataset: &TpDataset,
        tracker: &mut LoadedIdTracker,
    ) -> LoaderResult<WriteSummary> {
        let mut summary = WriteSummary::new();
        info!(
            load_id = %summary.load_id.short_id(),
            records = dataset.len(),
            "removing tariff plan"
        );

        for (category, records) in dataset.iter() {
            let mut removed = 0usize;
            for record in records {
                if self.remove_record(category, record, tracker, &mut summary)? {
                    removed += 1;
                }
            }
            if self.options.verbose {
                info!(%category, removed, requested = records.len(), "removed");
            }
        }
        self.store.commit()?;

        info!(
            load_id = %summary.load_id.short_id(),
            total = summary.total(),
            "tariff plan removed"
        );
        Ok(summary)
    }

    fn write_record(
        &self,
        category: EntityCategory,
        record: &TpRecord,
        tracker: &mut LoadedIdTracker,
        summary: &mut WriteSummary,
    ) -> LoaderResult<()> {
        // Reverse keys are resolved before the record lands in the store.
        let reverse = match (category, self.options.disable_reverse) {
            (EntityCategory::Destinations | EntityCategory::Aliases, false) => {
                let before = self
                    .store
                    .get(category, &record.id)?
                    .map(|body| TpRecord::new(record.id.clone(), body));
                Some(reverse_keys(category, before.as_ref(), record)?)
            }
            _ => None,
        };

        self.store.set(category, &record.id, &record.body)?;
        tracker.record_write(category, &record.id);
        summary.bump(category);

        match reverse {
            Some((reverse, old, new)) => {
                self.sync_reverse(reverse, &record.id, &old, &new, tracker, summary)
            }
            None => Ok(()),
        }
    }

    fn remove_record(
        &self,
        category: EntityCategory,
        record: &TpRecord,
        tracker: &mut LoadedIdTracker,
        summary: &mut WriteSummary,
    ) -> LoaderResult<bool> {
        let stored = self.store.get(category, &record.id)?;
        if !self.store.remove(category, &record.id)? {
            debug!(%category, id = %record.id, "nothing to remove");
            return Ok(false);
        }
        tracker.record_write(category, &record.id);
        summary.bump(category);

        if self.options.disable_reverse {
            return Ok(true);
        }
        // Reverse entries point at what was stored, which may differ from the dataset.
        let stored = stored.map(|body| TpRecord::new(record.id.clone(), body));
        let empty = BTreeSet::new();
        let (reverse, old) = match category {
            EntityCategory::Destinations => (
                EntityCategory::ReverseDestinations,
                reverse_destination_keys(stored.as_ref())?,
            ),
            EntityCategory::Aliases => {
                (EntityCategory::ReverseAliases, reverse_alias_keys(stored.as_ref())?)
            }
            _ => return Ok(true),
        };
        self.sync_reverse(reverse, &record.id, &old, &empty, tracker, summary)?;
        Ok(true)
    }

    /// Move `owner` out of reverse entries in `old - new` and into `new`.
    fn sync_reverse(
        &self,
        reverse: EntityCategory,
        owner: &str,
        old: &BTreeSet<String>,
        new: &BTreeSet<String>,
        tracker: &mut LoadedIdTracker,
        summary: &mut WriteSummary,
    ) -> LoaderResult<()> {
        for key in old.difference(new) {
            let mut owners = self.reverse_owners(reverse, key)?;
            let before = owners.len();
            owners.retain(|o| o != owner);
            if owners.len() == before {
                continue;
            }
            if owners.is_empty() {
                self.store.remove(reverse, key)?;
            } else {
                self.store.set(reverse, key, &Value::from(owners))?;
            }
            tracker.record_write(reverse, key);
            summary.bump(reverse);
        }
        for key in new {
            // Tracked even when unchanged: the cache may hold a stale copy.
            tracker.record_write(reverse, key);
            let mut owners = self.reverse_owners(reverse, key)?;
            if owners.iter().any(|o| o == owner) {
                continue;
            }
            owners.push(owner.to_string());
            owners.sort();
            self.store.set(reverse, key, &Value::from(owners))?;
            summary.bump(reverse);
        }
        Ok(())
    }

    fn reverse_owners(&self, reverse: EntityCategory, key: &str) -> LoaderResult<Vec<String>> {
        match self.store.get(reverse, key)? {
            None => Ok(Vec::new()),
            Some(value) => serde_json::from_value(value).map_err(|e| {
                LoaderError::Store(tpl_store::StoreError::Corrupt {
                    key: reverse.key(key),
                    reason: e.to_string(),
                })
            }),
        }
    }
}

type ReverseKeys = (EntityCategory, BTreeSet<String>, BTreeSet<String>);

/// The reverse category plus the keys `before` and `after` map to.
fn reverse_keys(
    category: EntityCategory,
    before: Option<&TpRecord>,
    after: &TpRecord,
) -> LoaderResult<ReverseKeys> {
    if category == EntityCategory::Aliases {
        return Ok((
            EntityCategory::ReverseAliases,
            reverse_alias_keys(before)?,
            reverse_alias_keys(Some(after))?,
        ));
    }
    Ok((
        EntityCategory::ReverseDestinations,
        reverse_destination_keys(before)?,
        reverse_destination_keys(Some(after))?,
    ))
}

/// Parse every destination and alias up front so a malformed body fails
/// the pass before anything is written.
fn check_reverse_views(dataset: &TpDataset) -> LoaderResult<()> {
    for record in dataset.records(EntityCategory::Destinations) {
        Destination::from_record(record)?;
    }
    for record in dataset.records(EntityCategory::Aliases) {
        Alias::from_record(record)?;
    }
    Ok(())
}

fn reverse_destination_keys(record: Option<&TpRecord>) -> LoaderResult<BTreeSet<String>> {
    match record {
        None => Ok(BTreeSet::new()),
        Some(r) => Ok(Destination::from_record(r)?.prefixes.into_iter().collect()),
    }
}

fn reverse_alias_keys(record: Option<&TpRecord>) -> LoaderResult<BTreeSet<String>> {
    match record {
        None => Ok(BTreeSet::new()),
        Some(r) => Ok(Alias::from_record(r)?.reverse_keys().into_iter().collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tpl_store::{InMemoryDataStore, StoreError};

    fn options() -> WriteOptions {
        WriteOptions {
            load_history_size: 5,
            tpid: "TP1".into(),
            timezone: "UTC".into(),
            ..Default::default()
        }
    }

    fn dst(id: &str, prefixes: &[&str]) -> TpRecord {
        TpRecord::new(id, json!({ "prefixes": prefixes }))
    }

    fn dataset() -> TpDataset {
        TpDataset::new()
            .with(
                EntityCategory::Destinations,
                vec![dst("DST_DE", &["49"]), dst("DST_DE_MOB", &["4915", "4916"])],
            )
            .unwrap()
            .with(
                EntityCategory::RatingPlans,
                vec![TpRecord::new("RP_RETAIL", json!({ "rates": [] }))],
            )
            .unwrap()
            .with(
                EntityCategory::Aliases,
                vec![TpRecord::new(
                    "ALS_1001",
                    json!({ "context": "*rating", "values": [{ "alias": "1002" }] }),
                )],
            )
            .unwrap()
    }

    #[test]
    fn write_persists_and_tracks() {
        let store = InMemoryDataStore::new();
        let writer = TpWriter::new(&store, options());
        let mut tracker = LoadedIdTracker::enabled();

        let summary = writer.write_to_store(&dataset(), &mut tracker).unwrap();

        assert_eq!(
            store.get(EntityCategory::RatingPlans, "RP_RETAIL").unwrap(),
            Some(json!({ "rates": [] }))
        );
        assert_eq!(
            tracker.query(EntityCategory::Destinations).unwrap(),
            &["DST_DE", "DST_DE_MOB"]
        );
        assert_eq!(
            tracker.query(EntityCategory::ReverseDestinations).unwrap(),
            &["49", "4915", "4916"]
        );
        assert_eq!(tracker.query(EntityCategory::ReverseAliases).unwrap(), &["1002:*rating"]);
        assert_eq!(summary.counts[&EntityCategory::RatingPlans], 1);
        assert_eq!(summary.counts[&EntityCategory::ReverseDestinations], 3);
        assert_eq!(
            store.get(EntityCategory::ReverseDestinations, "4915").unwrap(),
            Some(json!(["DST_DE_MOB"]))
        );
    }

    #[test]
    fn write_stamps_versions_and_history() {
        let store = InMemoryDataStore::new();
        let writer = TpWriter::new(&store, options());
        let summary = writer
            .write_to_store(&dataset(), &mut LoadedIdTracker::disabled())
            .unwrap();

        assert_eq!(store.versions().unwrap(), Some(current_versions()));
        let history = store.load_history().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].load_id, summary.load_id.to_string());
        assert_eq!(history[0].tariff_plan_id, "TP1");
        assert_eq!(history[0].counts, summary.counts);
    }

    #[test]
    fn disabled_reverse_skips_mappings() {
        let store = InMemoryDataStore::new();
        let writer = TpWriter::new(
            &store,
            WriteOptions {
                disable_reverse: true,
                ..options()
            },
        );
        let mut tracker = LoadedIdTracker::enabled();
        writer.write_to_store(&dataset(), &mut tracker).unwrap();

        assert!(store.ids(EntityCategory::ReverseDestinations).unwrap().is_empty());
        assert!(tracker.query(EntityCategory::ReverseDestinations).unwrap().is_empty());
    }

    #[test]
    fn rewriting_destination_moves_reverse_entries() {
        let store = InMemoryDataStore::new();
        let writer = TpWriter::new(&store, options());
        writer
            .write_to_store(&dataset(), &mut LoadedIdTracker::enabled())
            .unwrap();

        let update = TpDataset::new()
            .with(EntityCategory::Destinations, vec![dst("DST_DE_MOB", &["4915", "4917"])])
            .unwrap();
        let mut tracker = LoadedIdTracker::enabled();
        writer.write_to_store(&update, &mut tracker).unwrap();

        assert_eq!(store.get(EntityCategory::ReverseDestinations, "4916").unwrap(), None);
        assert_eq!(
            store.get(EntityCategory::ReverseDestinations, "4917").unwrap(),
            Some(json!(["DST_DE_MOB"]))
        );
        assert_eq!(
            tracker.query(EntityCategory::ReverseDestinations).unwrap(),
            &["4916", "4915", "4917"]
        );
    }

    #[test]
    fn shared_prefix_keeps_other_owner() {
        let store = InMemoryDataStore::new();
        let writer = TpWriter::new(&store, options());
        let ds = TpDataset::new()
            .with(EntityCategory::Destinations, vec![dst("A", &["33"]), dst("B", &["33"])])
            .unwrap();
        writer.write_to_store(&ds, &mut LoadedIdTracker::disabled()).unwrap();
        assert_eq!(
            store.get(EntityCategory::ReverseDestinations, "33").unwrap(),
            Some(json!(["A", "B"]))
        );

        let gone = TpDataset::new()
            .with(EntityCategory::Destinations, vec![dst("A", &["33"])])
            .unwrap();
        writer.remove_from_store(&gone, &mut LoadedIdTracker::disabled()).unwrap();
        assert_eq!(
            store.get(EntityCategory::ReverseDestinations, "33").unwrap(),
            Some(json!(["B"]))
        );
    }

    #[test]
    fn flush_wipes_previous_data() {
        let store = InMemoryDataStore::new();
        store.set(EntityCategory::Filters, "OLD", &json!({})).unwrap();
        let writer = TpWriter::new(
            &store,
            WriteOptions {
                flush: true,
                ..options()
            },
        );
        writer
            .write_to_store(&dataset(), &mut LoadedIdTracker::enabled())
            .unwrap();
        assert!(store.ids(EntityCategory::Filters).unwrap().is_empty());
        assert_eq!(store.ids(EntityCategory::RatingPlans).unwrap(), vec!["RP_RETAIL"]);
    }

    #[test]
    fn identical_reload_is_idempotent() {
        let store = InMemoryDataStore::new();
        let writer = TpWriter::new(
            &store,
            WriteOptions {
                load_history_size: 0,
                ..options()
            },
        );

        let mut first = LoadedIdTracker::enabled();
        writer.write_to_store(&dataset(), &mut first).unwrap();
        let after_first = store.snapshot().unwrap();

        let mut second = LoadedIdTracker::enabled();
        writer.write_to_store(&dataset(), &mut second).unwrap();

        assert_eq!(store.snapshot().unwrap(), after_first);
        assert_eq!(first.into_loaded(), second.into_loaded());
    }

    #[test]
    fn removal_is_symmetric() {
        let store = InMemoryDataStore::new();
        let writer = TpWriter::new(&store, options());
        writer
            .write_to_store(&dataset(), &mut LoadedIdTracker::enabled())
            .unwrap();

        let extra = dataset()
            .with(EntityCategory::Actions, vec![TpRecord::bare("NEVER_LOADED")])
            .unwrap();
        let mut tracker = LoadedIdTracker::enabled();
        let summary = writer.remove_from_store(&extra, &mut tracker).unwrap();

        for category in [
            EntityCategory::Destinations,
            EntityCategory::RatingPlans,
            EntityCategory::Aliases,
        ] {
            assert!(store.ids(category).unwrap().is_empty());
        }
        assert!(store.ids(EntityCategory::ReverseDestinations).unwrap().is_empty());
        assert!(store.ids(EntityCategory::ReverseAliases).unwrap().is_empty());
        assert!(tracker.query(EntityCategory::Actions).unwrap().is_empty());
        assert_eq!(tracker.query(EntityCategory::RatingPlans).unwrap(), &["RP_RETAIL"]);
        assert!(!summary.counts.contains_key(&EntityCategory::Actions));
        assert_eq!(store.load_history().unwrap().len(), 1);
    }

    #[test]
    fn removal_with_reverse_disabled_leaves_mappings() {
        let store = InMemoryDataStore::new();
        TpWriter::new(&store, options())
            .write_to_store(&dataset(), &mut LoadedIdTracker::disabled())
            .unwrap();

        let writer = TpWriter::new(
            &store,
            WriteOptions {
                disable_reverse: true,
                ..options()
            },
        );
        writer
            .remove_from_store(&dataset(), &mut LoadedIdTracker::disabled())
            .unwrap();
        assert!(store.ids(EntityCategory::Destinations).unwrap().is_empty());
        assert_eq!(store.ids(EntityCategory::ReverseDestinations).unwrap().len(), 3);
    }

    #[test]
    fn malformed_destination_aborts_before_writing() {
        let store = InMemoryDataStore::new();
        let writer = TpWriter::new(&store, options());
        writer
            .write_to_store(&dataset(), &mut LoadedIdTracker::enabled())
            .unwrap();
        let before = store.snapshot().unwrap();

        let ds = TpDataset::new()
            .with(
                EntityCategory::Destinations,
                vec![dst("DST_FR", &["33"]), TpRecord::new("BAD", json!({ "prefixes": "49" }))],
            )
            .unwrap()
            .with(EntityCategory::RatingPlans, vec![TpRecord::new("RP_NEW", json!({}))])
            .unwrap();
        let mut tracker = LoadedIdTracker::enabled();
        let err = writer.write_to_store(&ds, &mut tracker).unwrap_err();

        assert!(matches!(err, LoaderError::Record(_)));
        assert_eq!(store.snapshot().unwrap(), before);
        assert!(tracker.into_loaded().unwrap().is_empty());
    }

    #[test]
    fn unreadable_stored_destination_is_not_overwritten() {
        let store = InMemoryDataStore::new();
        let stale = json!({ "prefixes": "49" });
        store.set(EntityCategory::Destinations, "DST_DE", &stale).unwrap();
        let writer = TpWriter::new(&store, options());
        let ds = TpDataset::new()
            .with(EntityCategory::Destinations, vec![dst("DST_DE", &["49"])])
            .unwrap();

        let mut tracker = LoadedIdTracker::enabled();
        assert!(writer.write_to_store(&ds, &mut tracker).is_err());
        assert_eq!(store.get(EntityCategory::Destinations, "DST_DE").unwrap(), Some(stale));
        assert!(tracker.query(EntityCategory::Destinations).unwrap().is_empty());
    }

    #[test]
    fn corrupt_reverse_entry_is_reported() {
        let store = InMemoryDataStore::new();
        store.set(EntityCategory::ReverseDestinations, "49", &json!("not a list")).unwrap();
        let writer = TpWriter::new(&store, options());
        let ds = TpDataset::new()
            .with(EntityCategory::Destinations, vec![dst("DST_DE", &["49"])])
            .unwrap();
        let err = writer
            .write_to_store(&ds, &mut LoadedIdTracker::enabled())
            .unwrap_err();
        assert!(matches!(err, LoaderError::Store(StoreError::Corrupt { .. })));
    }
}
