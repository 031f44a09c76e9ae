//! RPC plumbing between the loader and the services it notifies.
//!
//! Frames are newline-delimited JSON: a request
//! `{"method": "...", "params": [arg], "id": n}` answered by
//! `{"id": n, "result": ..., "error": null}`. The [`RpcClient`] speaks this
//! over TCP with connect and reply timeouts.

pub mod client;
pub mod codec;
pub mod error;
pub mod message;

pub use client::RpcClient;
pub use codec::RpcCodec;
pub use error::{RpcError, RpcResult};
pub use message::{
    methods, AttrReloadCache, RpcRequest, RpcResponse, MAX_MESSAGE_SIZE, REPLY_OK,
};
