//! TCP server for the control plane.
//!
//! One task per connection. Requests on a connection are handled in order;
//! a frame that cannot be decoded closes that connection only.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::codec::{framed, next_frame, send_frame};
use crate::error::RpcError;
use crate::message::{Request, Response};
use crate::proto::{AddManualTaskArgs, Method};
use crate::service::ControlService;

pub struct ControlServer {
    listener: TcpListener,
    service: Arc<dyn ControlService>,
}

impl ControlServer {
    /// Bind the listener; call [`serve`](Self::serve) to start accepting.
    #[instrument(skip_all)]
    pub async fn bind(
        addr: impl ToSocketAddrs,
        service: Arc<dyn ControlService>,
    ) -> Result<Self, RpcError> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "control plane listening");
        Ok(Self { listener, service })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, RpcError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` is cancelled. Open connections are
    /// closed at their next frame boundary.
    pub async fn serve(self, shutdown: CancellationToken) -> Result<(), RpcError> {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("control plane shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    debug!(peer = %peer, "control connection opened");
                    let service = Arc::clone(&self.service);
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        tokio::select! {
                            _ = shutdown.cancelled() => {}
                            result = handle_connection(stream, service) => {
                                if let Err(e) = result {
                                    warn!(
                                        peer = %peer,
                                        error = %e,
                                        "control connection closed with error"
                                    );
                                }
                            }
                        }
                        debug!(peer = %peer, "control connection closed");
                    });
                }
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    service: Arc<dyn ControlService>,
) -> Result<(), RpcError> {
    let mut frames = framed(stream);
    while let Some(frame) = next_frame(&mut frames).await? {
        let request = Request::from_bytes(&frame)?;
        debug!(method = %request.method, seq = request.seq, "received request");
        let response = dispatch(service.as_ref(), request).await;
        send_frame(&mut frames, response.to_bytes()?).await?;
    }
    Ok(())
}

/// Route one request to the service. Every outcome, including unknown
/// methods, becomes a response with the request's `seq`.
pub async fn dispatch(service: &dyn ControlService, request: Request) -> Response {
    let seq = request.seq;
    let Some(method) = Method::parse(&request.method) else {
        warn!(method = %request.method, "unknown method");
        return Response::error(seq, format!("unknown method: {}", request.method));
    };

    let result = match method {
        Method::Start => service.start().await.map(|()| Response::empty(seq)),
        Method::Stop => service.stop().await.map(|()| Response::empty(seq)),
        Method::AddManualTask => match request.decode::<AddManualTaskArgs>() {
            Ok(args) => service
                .add_manual_task(&args.git_link)
                .await
                .map(|()| Response::empty(seq)),
            Err(e) => Err(RpcError::Deserialization(e)),
        },
        Method::QueryCurrent => match service.query_current().await {
            Ok(reply) => Response::ok(seq, &reply).map_err(RpcError::from),
            Err(e) => Err(e),
        },
    };

    result.unwrap_or_else(|e| Response::error(seq, e.to_string()))
}
