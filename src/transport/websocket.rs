//! WebSocket transport
//!
//! Accepts TCP connections, upgrades the ones aimed at the configured path and
//! wires each upgraded connection into the hub. Plain HTTP requests get a
//! liveness answer from `transport::http`. For an upgraded connection:
//! - a `Connection` with a bounded outbound queue is added to the registry
//! - a writer task drains that queue into the socket
//! - a `ConnectionReader` handles inbound frames until the connection ends
//!
//! The writer never touches the registry. A broken socket is noticed and
//! deregistered by the reader on its next read.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio_tungstenite::{WebSocketStream, accept_hdr_async};
use tracing::{debug, info, warn};
use tungstenite::Error as WsError;
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::http::StatusCode;
use tungstenite::protocol::Message as WsMessage;

use crate::client::{Connection, ConnectionId};
use crate::config::{Settings, clamp_capacity};
use crate::hub::Hub;
use crate::relay::Relay;
use crate::transport::http::{self, RequestHead};
use crate::transport::reader::ConnectionReader;
use crate::utils::error::HubError;

/// How long a finished connection waits for its writer to flush the close frame.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);
/// Upper bound on the upgrade handshake, so a stalled client cannot pin a task.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
/// Pause after a failed accept so a persistent error (e.g. fd exhaustion) does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub struct WebSocketServer {
    listener: TcpListener,
    hub: Hub,
    relay: Relay,
    ws_path: Arc<str>,
    outbound_capacity: usize,
}

impl WebSocketServer {
    pub async fn bind(settings: &Settings, hub: Hub, relay: Relay) -> Result<Self, HubError> {
        let addr = format!("{}:{}", settings.server.host, settings.server.port);
        let listener = TcpListener::bind(&addr).await?;

        Ok(Self {
            listener,
            hub,
            relay,
            ws_path: Arc::from(settings.server.ws_path.as_str()),
            outbound_capacity: clamp_capacity(settings.hub.outbound_capacity),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, HubError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections until `shutdown` flips to true, then waits for
    /// every open connection to wind down.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let Self {
            listener,
            hub,
            relay,
            ws_path,
            outbound_capacity,
        } = self;

        match listener.local_addr() {
            Ok(addr) => info!("WebSocket server listening on ws://{addr}{ws_path}"),
            Err(e) => warn!("WebSocket server listening on unknown address: {e}"),
        }

        let mut connections = JoinSet::new();

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        connections.spawn(handle_connection(
                            stream,
                            peer,
                            hub.clone(),
                            relay.clone(),
                            ws_path.clone(),
                            outbound_capacity,
                            shutdown.clone(),
                        ));
                    }
                    Err(e) => {
                        warn!("failed to accept connection: {e}");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!(open = connections.len(), "shutting down, closing connections");
        drop(listener);
        drop(hub);
        while connections.join_next().await.is_some() {}
        info!("WebSocket server stopped");
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    hub: Hub,
    relay: Relay,
    ws_path: Arc<str>,
    outbound_capacity: usize,
    shutdown: watch::Receiver<bool>,
) {
    let ws_stream = match tokio::time::timeout(HANDSHAKE_TIMEOUT, upgrade(stream, peer, ws_path)).await {
        Ok(Some(ws)) => ws,
        Ok(None) => return,
        Err(_) => {
            warn!(%peer, "websocket handshake timed out");
            return;
        }
    };

    let (ws_sender, ws_receiver) = ws_stream.split();
    let (tx, rx) = mpsc::channel::<WsMessage>(outbound_capacity);
    let conn = Connection::new(tx);
    let id = conn.id().clone();

    hub.registry().add(conn);
    info!(conn = %id, %peer, members = hub.registry().len(), "connected");

    let writer = tokio::spawn(write_loop(id.clone(), ws_sender, rx));

    ConnectionReader::new(id.clone(), ws_receiver, hub, relay, shutdown)
        .run()
        .await;

    if !finish_writer(writer, WRITER_DRAIN_TIMEOUT).await {
        warn!(conn = %id, "writer did not drain in time, dropping the socket");
    }
}

/// Answers plain HTTP requests and upgrades the rest. Returns `None` when the
/// connection does not end up as a WebSocket on `ws_path`.
async fn upgrade(
    mut stream: TcpStream,
    peer: SocketAddr,
    ws_path: Arc<str>,
) -> Option<WebSocketStream<TcpStream>> {
    match http::peek_head(&stream).await {
        Ok(Some(RequestHead::Upgrade)) => {}
        Ok(Some(RequestHead::Plain { method, path, len })) => {
            match http::respond(&mut stream, &method, &path, len).await {
                Ok(status) => debug!(%peer, %method, %path, status, "answered plain http request"),
                Err(e) => debug!(%peer, "failed to answer http request: {e}"),
            }
            return None;
        }
        Ok(None) => return None,
        Err(e) => {
            warn!(%peer, "failed to read request head: {e}");
            return None;
        }
    }

    let path_guard = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        if req.uri().path() == &*ws_path {
            Ok(resp)
        } else {
            Err(not_found(req.uri().path()))
        }
    };

    match accept_hdr_async(stream, path_guard).await {
        Ok(ws) => Some(ws),
        Err(e) => {
            warn!(%peer, "{}", HubError::Upgrade(e));
            None
        }
    }
}

/// Waits up to `limit` for the writer to finish, aborting it otherwise so the
/// socket half it owns is released. Returns false if it had to abort.
pub(crate) async fn finish_writer(mut writer: JoinHandle<()>, limit: Duration) -> bool {
    match tokio::time::timeout(limit, &mut writer).await {
        Ok(_) => true,
        Err(_) => {
            writer.abort();
            false
        }
    }
}

/// Forwards queued frames to the socket until every sender is gone, then
/// closes the socket.
pub(crate) async fn write_loop<S>(id: ConnectionId, mut sink: S, mut outbound: mpsc::Receiver<WsMessage>)
where
    S: Sink<WsMessage, Error = WsError> + Unpin,
{
    while let Some(frame) = outbound.recv().await {
        if let Err(e) = sink.send(frame).await {
            let err = HubError::BroadcastWrite {
                conn: id.clone(),
                reason: e.to_string(),
            };
            warn!("{err}");
            return;
        }
    }

    let _ = sink.close().await;
    debug!(conn = %id, "send loop closed");
}

fn not_found(path: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(format!("no websocket endpoint at {path}")));
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}
