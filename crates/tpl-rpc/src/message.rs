use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RpcError, RpcResult};

/// Upper bound for one encoded frame, newline excluded.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// The reply every invalidation method returns on success.
pub const REPLY_OK: &str = "OK";

/// Remote method names.
pub mod methods {
    pub const RELOAD_CACHE: &str = "ApierV1.ReloadCache";
    pub const CLEAR_CACHE: &str = "CacheSv1.Clear";
    pub const RELOAD_SCHEDULER: &str = "ApierV1.ReloadScheduler";
    pub const RELOAD_USERS: &str = "UsersV1.ReloadUsers";
}

/// One call: `{"method": "...", "params": [arg], "id": n}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    pub params: Vec<Value>,
    pub id: u64,
}

impl RpcRequest {
    pub fn new<P: Serialize + ?Sized>(id: u64, method: &str, param: &P) -> RpcResult<Self> {
        let param =
            serde_json::to_value(param).map_err(|e| RpcError::Serialization(e.to_string()))?;
        Ok(Self {
            method: method.to_string(),
            params: vec![param],
            id,
        })
    }
}

/// One reply: `{"id": n, "result": ..., "error": null|"..."}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: u64,
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub error: Option<String>,
}

impl RpcResponse {
    pub fn ok(id: u64, result: impl Into<Value>) -> Self {
        Self {
            id,
            result: result.into(),
            error: None,
        }
    }

    pub fn err(id: u64, message: impl Into<String>) -> Self {
        Self {
            id,
            result: Value::Null,
            error: Some(message.into()),
        }
    }

    /// Turn the reply into the typed result of `method`.
    pub fn into_result<R: serde::de::DeserializeOwned>(self, method: &str) -> RpcResult<R> {
        if let Some(message) = self.error.filter(|m| !m.is_empty()) {
            return Err(RpcError::Remote {
                method: method.to_string(),
                message,
            });
        }
        serde_json::from_value(self.result).map_err(|e| RpcError::Deserialization(e.to_string()))
    }
}

/// Argument of `ApierV1.ReloadCache`.
///
/// Each entry is keyed by the category's reload field (`DestinationIDs`,
/// `RatingPlanIDs`, ...). The service reads a `null` or missing field as
/// every id of the category, so a category with nothing to reload is sent
/// as `[]`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttrReloadCache {
    #[serde(rename = "FlushAll", default)]
    pub flush_all: bool,
    #[serde(flatten)]
    pub ids: BTreeMap<String, Option<Vec<String>>>,
}
