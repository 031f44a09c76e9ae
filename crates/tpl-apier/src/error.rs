use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApierError {
    #[error("mandatory field missing: {0}")]
    MandatoryMissing(&'static str),

    #[error("invalid usage {input:?}: {reason}")]
    InvalidUsage { input: String, reason: String },

    #[error("invalid activation time {0:?}")]
    InvalidActivationTime(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("server error: {0}")]
    Server(String),

    #[error("store error: {0}")]
    Store(#[from] tpl_store::StoreError),
}

pub type ApierResult<T> = Result<T, ApierError>;
