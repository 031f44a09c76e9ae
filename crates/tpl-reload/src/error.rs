use thiserror::Error;
use tpl_rpc::RpcError;

/// Failure of one remote invalidation call. Never fatal to the pass.
#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("rpc error: {0}")]
    Rpc(#[from] RpcError),

    #[error("{method} replied {reply:?}")]
    UnexpectedReply { method: &'static str, reply: String },
}

pub type ReloadResult<T> = Result<T, ReloadError>;
