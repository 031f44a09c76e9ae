use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::error::{RpcError, RpcResult};
use crate::message::MAX_MESSAGE_SIZE;

/// Newline-delimited JSON framing: one message per line.
pub struct RpcCodec;

impl RpcCodec {
    /// Encode `msg` as a single line, trailing newline included.
    pub fn encode<T: Serialize>(msg: &T) -> RpcResult<Vec<u8>> {
        let mut buf =
            serde_json::to_vec(msg).map_err(|e| RpcError::Serialization(e.to_string()))?;
        if buf.len() > MAX_MESSAGE_SIZE {
            return Err(RpcError::MessageTooLarge {
                size: buf.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        buf.push(b'\n');
        Ok(buf)
    }

    /// Decode one line. A trailing `\n` or `\r\n` is ignored.
    pub fn decode<T: DeserializeOwned>(line: &[u8]) -> RpcResult<T> {
        let line = line.strip_suffix(b"\n").unwrap_or(line);
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.len() > MAX_MESSAGE_SIZE {
            return Err(RpcError::MessageTooLarge {
                size: line.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        if line.is_empty() {
            return Err(RpcError::FramingError("empty frame".into()));
        }
        serde_json::from_slice(line).map_err(|e| RpcError::Deserialization(e.to_string()))
    }

    /// Read the next frame from `reader` without buffering past the size limit.
    pub async fn read_frame<R>(reader: &mut R) -> RpcResult<Vec<u8>>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut buf = Vec::new();
        // Room for the payload, an optional `\r` and the newline.
        let limit = (MAX_MESSAGE_SIZE + 2) as u64;
        let n = reader.take(limit).read_until(b'\n', &mut buf).await?;
        if n == 0 {
            return Err(RpcError::Closed);
        }
        if buf.last() != Some(&b'\n') {
            if n as u64 == limit {
                return Err(RpcError::MessageTooLarge {
                    size: n,
                    max: MAX_MESSAGE_SIZE,
                });
            }
            return Err(RpcError::FramingError("connection closed mid-frame".into()));
        }
        Ok(buf)
    }
}
