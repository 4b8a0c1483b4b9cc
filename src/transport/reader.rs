use chrono::Utc;
use futures_util::{Stream, StreamExt};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use tungstenite::Error as WsError;
use tungstenite::protocol::Message as WsMessage;

use crate::client::ConnectionId;
use crate::hub::{Envelope, Hub};
use crate::relay::Relay;
use crate::transport::message::InboundFrame;
use crate::utils::error::HubError;

/// Lifecycle of a reader: `Open` until the first terminal event, then
/// `Closing` while it deregisters, then `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    Open,
    Closing,
    Closed,
}

/// Why a reader stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderExit {
    /// The client sent a close frame or the stream ended.
    Closed,
    ReadFailed,
    Shutdown,
    /// The dispatcher went away.
    HubClosed,
}

/// Drives the inbound side of one connection.
///
/// Each text frame is stamped, relayed to persistence and queued for
/// broadcast. Frames from one connection are queued in the order they were
/// read. On any terminal event the reader removes its connection from the
/// registry; there is no retry.
pub struct ConnectionReader<S> {
    id: ConnectionId,
    stream: S,
    hub: Hub,
    relay: Relay,
    shutdown: watch::Receiver<bool>,
    state: ReaderState,
}

impl<S> ConnectionReader<S>
where
    S: Stream<Item = Result<WsMessage, WsError>> + Unpin,
{
    pub fn new(
        id: ConnectionId,
        stream: S,
        hub: Hub,
        relay: Relay,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            id,
            stream,
            hub,
            relay,
            shutdown,
            state: ReaderState::Open,
        }
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    /// Reads until the connection ends, then deregisters it.
    pub async fn run(mut self) -> ReaderExit {
        let exit = self.read_loop().await;
        self.close(exit);
        exit
    }

    async fn read_loop(&mut self) -> ReaderExit {
        loop {
            if *self.shutdown.borrow() {
                return ReaderExit::Shutdown;
            }

            let next = tokio::select! {
                frame = self.stream.next() => frame,
                changed = self.shutdown.changed() => match changed {
                    Ok(()) => continue,
                    // The shutdown sender is gone along with the server.
                    Err(_) => return ReaderExit::Shutdown,
                },
            };

            match next {
                None => return ReaderExit::Closed,
                Some(Err(source)) => {
                    let err = HubError::Read {
                        conn: self.id.clone(),
                        source,
                    };
                    warn!("{err}");
                    return ReaderExit::ReadFailed;
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    debug!(conn = %self.id, ?frame, "close frame received");
                    return ReaderExit::Closed;
                }
                Some(Ok(WsMessage::Text(text))) => {
                    if let Err(exit) = self.accept(text.as_str()).await {
                        return exit;
                    }
                }
                Some(Ok(WsMessage::Binary(data))) => match std::str::from_utf8(&data) {
                    Ok(text) => {
                        if let Err(exit) = self.accept(text).await {
                            return exit;
                        }
                    }
                    Err(_) => warn!(conn = %self.id, len = data.len(), "ignoring non UTF-8 binary frame"),
                },
                // ping/pong are answered by tungstenite
                Some(Ok(_)) => {}
            }
        }
    }

    async fn accept(&self, text: &str) -> Result<(), ReaderExit> {
        let frame = match InboundFrame::parse(text) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(
                    conn = %self.id,
                    "invalid client message: {err} | {}",
                    text.chars().take(100).collect::<String>()
                );
                return Ok(());
            }
        };

        let message = frame.into_message(Utc::now());
        self.relay.submit(&self.id, &message).await;

        match self.hub.submit(Envelope::new(self.id.clone(), message)).await {
            Ok(_) => Ok(()),
            Err(err) => {
                warn!(conn = %self.id, "{err}");
                Err(ReaderExit::HubClosed)
            }
        }
    }

    fn close(&mut self, exit: ReaderExit) {
        self.state = ReaderState::Closing;
        let removed = self.hub.registry().remove(&self.id);
        self.state = ReaderState::Closed;
        info!(
            conn = %self.id,
            ?exit,
            removed,
            members = self.hub.registry().len(),
            "disconnected"
        );
    }
}
