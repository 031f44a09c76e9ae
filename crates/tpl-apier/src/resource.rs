use std::fmt;

use tracing::{error, info};

use crate::error::ApierResult;

type Release<'a> = Box<dyn FnOnce() -> ApierResult<()> + 'a>;

/// A provisioned throwaway resource, released when the guard drops.
///
/// Release runs on every exit path, early returns and panics included.
/// Guards bound to locals drop in reverse declaration order, so the last
/// resource acquired is the first one released. A failed release is logged
/// and otherwise ignored.
pub struct TempResource<'a> {
    label: String,
    release: Option<Release<'a>>,
}

impl<'a> TempResource<'a> {
    pub fn new(label: impl Into<String>, release: impl FnOnce() -> ApierResult<()> + 'a) -> Self {
        Self {
            label: label.into(),
            release: Some(Box::new(release)),
        }
    }

    /// Run `acquire`; on success return a guard that will run `release`.
    ///
    /// Nothing is released when acquisition fails.
    pub fn acquire<A>(
        label: impl Into<String>,
        acquire: A,
        release: impl FnOnce() -> ApierResult<()> + 'a,
    ) -> ApierResult<Self>
    where
        A: FnOnce() -> ApierResult<()>,
    {
        let label = label.into();
        if let Err(e) = acquire() {
            error!(resource = %label, error = %e, "cannot create temporary resource");
            return Err(e);
        }
        Ok(Self::new(label, release))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Release now and report the result instead of logging it.
    pub fn release(mut self) -> ApierResult<()> {
        match self.release.take() {
            Some(release) => release(),
            None => Ok(()),
        }
    }
}

impl Drop for TempResource<'_> {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            info!(resource = %self.label, "deleting temporary resource");
            if let Err(e) = release() {
                error!(resource = %self.label, error = %e, "cannot delete temporary resource");
            }
        }
    }
}

impl fmt::Debug for TempResource<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TempResource")
            .field("label", &self.label)
            .field("armed", &self.release.is_some())
            .finish()
    }
}
