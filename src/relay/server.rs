use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::{self, Bytes, Message};
use tracing::{debug, error, info, warn};

use super::actor::RegistryHandle;
use super::types::{ConnectionId, OutboundMessage, RelayError};
use crate::config::RelayConfig;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

pub struct RelayServer {
    listener: TcpListener,
    handle: RegistryHandle,
    config: Arc<RelayConfig>,
}

impl RelayServer {
    /// Bind the listener and start the connection registry
    pub async fn bind(config: RelayConfig) -> io::Result<Self> {
        config
            .validate()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let listener = TcpListener::bind(&config.bind_addr).await?;
        let handle = RegistryHandle::spawn(config.command_buffer);

        info!(
            "Signaling relay listening on ws://{}{}",
            listener.local_addr()?,
            config.path
        );

        Ok(Self {
            listener,
            handle,
            config: Arc::new(config),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle to the registry shared by every connection of this server
    pub fn registry(&self) -> RegistryHandle {
        self.handle.clone()
    }

    pub async fn run(self) -> io::Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Accept connections until `shutdown` resolves.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> io::Result<()> {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, no longer accepting connections");
                    return Ok(());
                }

                accepted = self.listener.accept() => {
                    let (stream, addr) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!("Accept failed: {}", e);
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                            continue;
                        }
                    };
                    let handle = self.handle.clone();
                    let config = self.config.clone();

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, addr, handle, config).await {
                            error!("Connection error from {}: {}", addr, e);
                        }
                    });
                }
            }
        }
    }
}

/// Reject upgrade requests that do not target the relay endpoint.
fn check_path(
    request: &Request,
    response: Response,
    path: &str,
) -> Result<Response, ErrorResponse> {
    if request.uri().path() == path {
        return Ok(response);
    }

    let mut rejection = ErrorResponse::new(Some(format!(
        "no signaling endpoint at {}",
        request.uri().path()
    )));
    *rejection.status_mut() = StatusCode::NOT_FOUND;
    Err(rejection)
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    handle: RegistryHandle,
    config: Arc<RelayConfig>,
) -> Result<(), RelayError> {
    let accepted = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, resp: Response| {
        check_path(req, resp, &config.path)
    })
    .await;

    let ws_stream = match accepted {
        Ok(ws) => ws,
        Err(tungstenite::Error::Http(resp)) => {
            warn!("Rejected upgrade from {}: HTTP {}", addr, resp.status());
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let id = ConnectionId::next();
    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(config.outbound_buffer);
    let (ctrl_tx, mut ctrl_rx) = mpsc::unbounded_channel::<Message>();

    handle.open(id, tx).await?;
    info!("WebSocket connection {} from {}", id, addr);

    let mut ping_interval = tokio::time::interval(config.ping_interval());
    let pong_timeout = config.pong_timeout();
    let mut waiting_for_pong = false;
    let mut pong_deadline: Option<tokio::time::Instant> = None;

    // Dropping `rx` when the socket write fails lets the registry evict us.
    // Closing the sink flushes tungstenite's pending close reply.
    let send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(msg) = rx.recv() => {
                    if ws_tx.send(msg.into_message()).await.is_err() {
                        break;
                    }
                }
                Some(ctrl_msg) = ctrl_rx.recv() => {
                    if ws_tx.send(ctrl_msg).await.is_err() {
                        break;
                    }
                }
                else => break,
            }
        }
        let _ = ws_tx.close().await;
    });

    loop {
        let pong_expired = async {
            match pong_deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = ping_interval.tick() => {
                if waiting_for_pong {
                    warn!("No Pong received, disconnecting {}", id);
                    break;
                }
                if ctrl_tx.send(Message::Ping(Bytes::new())).is_err() {
                    break;
                }
                waiting_for_pong = true;
                pong_deadline = Some(tokio::time::Instant::now() + pong_timeout);
                debug!("Ping sent to {}", id);
            }

            _ = pong_expired => {
                warn!("Pong timeout, disconnecting {}", id);
                break;
            }

            msg = ws_rx.next() => {
                let msg = match msg {
                    Some(Ok(m)) => m,
                    Some(Err(e)) => {
                        warn!("WebSocket error on {}: {}", id, e);
                        break;
                    }
                    None => break,
                };

                let payload = match msg {
                    Message::Text(text) => OutboundMessage::Text(text),
                    Message::Binary(bytes) => OutboundMessage::Binary(bytes),
                    Message::Pong(_) => {
                        waiting_for_pong = false;
                        pong_deadline = None;
                        debug!("Pong received from {}", id);
                        continue;
                    }
                    Message::Close(_) => {
                        info!("Close received from {}", id);
                        break;
                    }
                    _ => continue,
                };

                if let Err(e) = handle.broadcast(id, payload).await {
                    warn!("Dropping {}: {}", id, e);
                    break;
                }
            }
        }
    }

    // Unregistering drops the registry's sender; with `ctrl_tx` gone too the
    // writer drains what is queued, answers the close handshake and exits.
    if let Err(e) = handle.close(id).await {
        debug!("Could not unregister {}: {}", id, e);
    }
    drop(ctrl_tx);

    let writer = send_task.abort_handle();
    if tokio::time::timeout(CLOSE_TIMEOUT, send_task).await.is_err() {
        debug!("Writer for {} did not finish in time", id);
        writer.abort();
    }
    info!("WebSocket disconnected: {} ({})", id, addr);

    Ok(())
}
