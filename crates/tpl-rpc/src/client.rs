use std::sync::atomic::{AtomicU64, Ordering};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tpl_config::RpcConfig;
use tracing::{debug, warn};

use crate::codec::RpcCodec;
use crate::error::{RpcError, RpcResult};
use crate::message::{RpcRequest, RpcResponse};

struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Connection {
    async fn round_trip(&mut self, frame: &[u8]) -> RpcResult<RpcResponse> {
        self.writer.write_all(frame).await?;
        self.writer.flush().await?;
        let line = RpcCodec::read_frame(&mut self.reader).await?;
        RpcCodec::decode(&line)
    }
}

/// A client for one remote service address.
///
/// The TCP connection is opened lazily on the first call and kept for the
/// following ones. Calls are serialized: one request is in flight at a time.
/// A failed call drops the connection; the next call dials again.
pub struct RpcClient {
    address: String,
    limits: RpcConfig,
    conn: Mutex<Option<Connection>>,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(address: impl Into<String>, limits: RpcConfig) -> Self {
        Self {
            address: address.into(),
            limits,
            conn: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Build a client and dial it right away.
    pub async fn connect(address: impl Into<String>, limits: RpcConfig) -> RpcResult<Self> {
        let client = Self::new(address, limits);
        let conn = client.dial().await?;
        *client.conn.lock().await = Some(conn);
        Ok(client)
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub async fn is_connected(&self) -> bool {
        self.conn.lock().await.is_some()
    }

    async fn dial(&self) -> RpcResult<Connection> {
        let attempts = self.limits.connect_attempts.max(1);
        let mut reason = String::new();
        for attempt in 1..=attempts {
            match timeout(self.limits.connect_timeout, TcpStream::connect(&self.address)).await {
                Ok(Ok(stream)) => {
                    debug!(address = %self.address, attempt, "connected");
                    stream.set_nodelay(true)?;
                    let (read, write) = stream.into_split();
                    return Ok(Connection {
                        reader: BufReader::new(read),
                        writer: write,
                    });
                }
                Ok(Err(e)) => reason = e.to_string(),
                Err(_) => reason = format!("timed out after {:?}", self.limits.connect_timeout),
            }
            debug!(address = %self.address, attempt, %reason, "connect attempt failed");
        }
        Err(RpcError::Connect {
            address: self.address.clone(),
            attempts,
            reason,
        })
    }

    /// Send `method(param)` and wait for its typed reply.
    pub async fn call<P, R>(&self, method: &str, param: &P) -> RpcResult<R>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = RpcCodec::encode(&RpcRequest::new(id, method, param)?)?;

        let mut guard = self.conn.lock().await;
        if guard.is_none() {
            *guard = Some(self.dial().await?);
        }
        let Some(conn) = guard.as_mut() else {
            return Err(RpcError::Closed);
        };

        debug!(address = %self.address, method, id, "calling");
        let reply = match timeout(self.limits.reply_timeout, conn.round_trip(&frame)).await {
            Ok(reply) => reply,
            Err(_) => Err(RpcError::Timeout {
                method: method.to_string(),
                after: self.limits.reply_timeout,
            }),
        };
        let response = match reply {
            Ok(response) => response,
            Err(e) => {
                warn!(address = %self.address, method, error = %e, "dropping connection");
                *guard = None;
                return Err(e);
            }
        };
        if response.id != id {
            warn!(
                address = %self.address,
                method,
                sent = id,
                received = response.id,
                "dropping connection"
            );
            *guard = None;
            return Err(RpcError::IdMismatch {
                sent: id,
                received: response.id,
            });
        }
        drop(guard);
        response.into_result(method)
    }
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("address", &self.address)
            .field("limits", &self.limits)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{methods, REPLY_OK};
    use std::time::Duration;
    use tokio::io::AsyncBufReadExt;
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    fn limits() -> RpcConfig {
        RpcConfig {
            connect_timeout: Duration::from_millis(500),
            reply_timeout: Duration::from_secs(5),
            connect_attempts: 2,
        }
    }

    /// Accepts one connection and answers each request with `reply(request)`.
    /// Resolves to the requests it saw.
    async fn serve<F>(reply: F) -> (String, JoinHandle<Vec<RpcRequest>>)
    where
        F: Fn(&RpcRequest) -> Option<RpcResponse> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read, mut write) = stream.into_split();
            let mut lines = BufReader::new(read).lines();
            let mut seen = Vec::new();
            while let Ok(Some(line)) = lines.next_line().await {
                let req: RpcRequest = serde_json::from_str(&line).unwrap();
                match reply(&req) {
                    Some(resp) => {
                        let bytes = RpcCodec::encode(&resp).unwrap();
                        write.write_all(&bytes).await.unwrap();
                    }
                    None => tokio::time::sleep(Duration::from_secs(60)).await,
                }
                seen.push(req);
            }
            seen
        });
        (addr, handle)
    }

    #[tokio::test]
    async fn call_round_trip_reuses_connection() {
        let (addr, server) = serve(|req| Some(RpcResponse::ok(req.id, REPLY_OK))).await;
        let client = RpcClient::new(addr, limits());
        assert!(!client.is_connected().await);

        let first: String = client.call(methods::RELOAD_SCHEDULER, "").await.unwrap();
        let second: String = client
            .call(methods::CLEAR_CACHE, &Vec::<String>::new())
            .await
            .unwrap();
        assert_eq!((first.as_str(), second.as_str()), (REPLY_OK, REPLY_OK));
        assert!(client.is_connected().await);

        drop(client);
        let seen = server.await.unwrap();
        let names: Vec<&str> = seen.iter().map(|r| r.method.as_str()).collect();
        assert_eq!(names, vec![methods::RELOAD_SCHEDULER, methods::CLEAR_CACHE]);
        assert_eq!(seen[1].params, vec![serde_json::json!([])]);
    }

    #[tokio::test]
    async fn remote_error_is_reported() {
        let (addr, _server) = serve(|req| Some(RpcResponse::err(req.id, "NOT_FOUND"))).await;
        let client = RpcClient::connect(addr, limits()).await.unwrap();
        let err = client.call::<_, String>(methods::RELOAD_USERS, "").await.unwrap_err();
        assert!(matches!(
            err,
            RpcError::Remote { ref method, .. } if method == methods::RELOAD_USERS
        ));
        // The connection survives an application-level error.
        assert!(client.is_connected().await);
    }

    #[tokio::test]
    async fn reply_timeout_drops_connection() {
        let (addr, _server) = serve(|_| None).await;
        let client = RpcClient::new(
            addr,
            RpcConfig {
                reply_timeout: Duration::from_millis(50),
                ..limits()
            },
        );
        let err = client.call::<_, String>(methods::RELOAD_CACHE, "").await.unwrap_err();
        assert!(matches!(err, RpcError::Timeout { .. }));
        assert!(!client.is_connected().await);
    }

    #[tokio::test]
    async fn mismatched_reply_id() {
        let (addr, _server) = serve(|req| Some(RpcResponse::ok(req.id + 100, REPLY_OK))).await;
        let client = RpcClient::new(addr, limits());
        let err = client.call::<_, String>(methods::RELOAD_CACHE, "").await.unwrap_err();
        assert!(matches!(err, RpcError::IdMismatch { .. }));
        // The stale frame must not be read by the next call.
        assert!(!client.is_connected().await);
    }

    #[tokio::test]
    async fn unreachable_address_exhausts_attempts() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = RpcClient::connect(addr.clone(), limits()).await.unwrap_err();
        match err {
            RpcError::Connect { address, attempts, .. } => {
                assert_eq!(address, addr);
                assert_eq!(attempts, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
