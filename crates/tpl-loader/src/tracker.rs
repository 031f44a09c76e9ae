use thiserror::Error;
use tpl_config::LoaderConfig;
use tpl_types::{EntityCategory, LoadedIdSet};

/// Returned by [`LoadedIdTracker::query`] when tracking was switched off.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("loaded ids are not tracked: cache integration is disabled")]
pub struct NotTracked;

/// Accumulates, per category, the identifiers the writer touched.
///
/// Tracking is decided up front: a disabled tracker allocates nothing and
/// ignores every write, which keeps large loads cheap when no cache service
/// needs to hear about them.
#[derive(Clone, Debug)]
pub struct LoadedIdTracker {
    ids: Option<LoadedIdSet>,
}

impl LoadedIdTracker {
    pub fn enabled() -> Self {
        Self {
            ids: Some(LoadedIdSet::new()),
        }
    }

    pub fn disabled() -> Self {
        Self { ids: None }
    }

    /// Enabled iff a cache service is configured.
    pub fn for_config(config: &LoaderConfig) -> Self {
        if config.cache_enabled() {
            Self::enabled()
        } else {
            Self::disabled()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.ids.is_some()
    }

    pub fn record_write(&mut self, category: EntityCategory, id: &str) {
        if let Some(ids) = self.ids.as_mut() {
            ids.insert(category, id);
        }
    }

    /// IDs recorded so far for `category` (possibly empty).
    pub fn query(&self, category: EntityCategory) -> Result<&[String], NotTracked> {
        self.ids.as_ref().map(|ids| ids.get(category)).ok_or(NotTracked)
    }

    /// Hand over the accumulated set. `None` when tracking was disabled.
    pub fn into_loaded(self) -> Option<LoadedIdSet> {
        self.ids
    }
}
