use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("unknown entity category: {0}")]
    UnknownCategory(String),

    #[error("malformed {category} record {id}: {reason}")]
    MalformedRecord {
        category: String,
        id: String,
        reason: String,
    },

    #[error("empty record identifier in {0}")]
    EmptyId(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}
