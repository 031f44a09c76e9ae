use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading or persisting a tariff plan. All are fatal.
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid tariff plan file {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("a tariff plan id is required")]
    MissingTpid,

    #[error("tariff plan source not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("record error: {0}")]
    Record(#[from] tpl_types::TypeError),

    #[error("store error: {0}")]
    Store(#[from] tpl_store::StoreError),
}

pub type LoaderResult<T> = Result<T, LoaderError>;
