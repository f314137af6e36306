use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::{debug, instrument};

use crate::codec::{framed, next_frame, send_frame, FramedStream};
use crate::error::RpcError;
use crate::message::{Request, Response};
use crate::proto::{AddManualTaskArgs, Method, QueryCurrentReply};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Control-plane client over a single connection. Calls are sequential.
pub struct ControlClient {
    frames: FramedStream<TcpStream>,
    next_seq: u64,
    timeout: Duration,
}

impl ControlClient {
    #[instrument(skip_all)]
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, RpcError> {
        let stream = TcpStream::connect(addr).await?;
        debug!(peer = %stream.peer_addr()?, "connected to control plane");
        Ok(Self { frames: framed(stream), next_seq: 0, timeout: DEFAULT_TIMEOUT })
    }

    /// Per-call timeout. Defaults to ten seconds.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn start(&mut self) -> Result<(), RpcError> {
        let seq = self.bump_seq();
        self.call(Request::empty(Method::Start.as_str(), seq)).await.map(drop)
    }

    pub async fn stop(&mut self) -> Result<(), RpcError> {
        let seq = self.bump_seq();
        self.call(Request::empty(Method::Stop.as_str(), seq)).await.map(drop)
    }

    pub async fn add_manual_task(&mut self, link: &str) -> Result<(), RpcError> {
        let args = AddManualTaskArgs { git_link: link.to_string() };
        let seq = self.bump_seq();
        let request = Request::new(Method::AddManualTask.as_str(), seq, &args)?;
        self.call(request).await.map(drop)
    }

    pub async fn query_current(&mut self) -> Result<QueryCurrentReply, RpcError> {
        let seq = self.bump_seq();
        let request = Request::empty(Method::QueryCurrent.as_str(), seq);
        self.call_decode(request).await
    }

    /// Invoke an arbitrary method with raw payload bytes.
    pub async fn call_raw(&mut self, method: &str, payload: Vec<u8>) -> Result<Response, RpcError> {
        let seq = self.bump_seq();
        let request = Request { method: method.to_string(), seq, payload };
        self.call(request).await
    }

    async fn call_decode<T: DeserializeOwned>(&mut self, request: Request) -> Result<T, RpcError> {
        Ok(self.call(request).await?.decode()?)
    }

    /// Send `request` and wait for its response. A response carrying an
    /// error becomes [`RpcError::Remote`].
    async fn call(&mut self, request: Request) -> Result<Response, RpcError> {
        let timeout = self.timeout;
        match tokio::time::timeout(timeout, self.round_trip(&request)).await {
            Ok(result) => {
                let response = result?;
                match response.error {
                    Some(message) => Err(RpcError::Remote(message)),
                    None => Ok(response),
                }
            }
            Err(_) => Err(RpcError::Timeout(timeout)),
        }
    }

    async fn round_trip(&mut self, request: &Request) -> Result<Response, RpcError> {
        send_frame(&mut self.frames, request.to_bytes()?).await?;
        let frame = next_frame(&mut self.frames)
            .await?
            .ok_or(RpcError::ConnectionClosed)?;
        let response = Response::from_bytes(&frame)?;
        if response.seq != request.seq {
            return Err(RpcError::SeqMismatch { expected: request.seq, got: response.seq });
        }
        debug!(method = %request.method, seq = request.seq, "call completed");
        Ok(response)
    }

    fn bump_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}
