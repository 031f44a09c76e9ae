use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("cannot connect to {address} after {attempts} attempt(s): {reason}")]
    Connect {
        address: String,
        attempts: u32,
        reason: String,
    },

    #[error("{method} timed out after {after:?}")]
    Timeout { method: String, after: Duration },

    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("framing error: {0}")]
    FramingError(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("{method} failed remotely: {message}")]
    Remote { method: String, message: String },

    #[error("reply id mismatch: sent {sent}, received {received}")]
    IdMismatch { sent: u64, received: u64 },

    #[error("connection closed by peer")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type RpcResult<T> = Result<T, RpcError>;
