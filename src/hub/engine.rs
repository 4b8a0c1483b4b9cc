use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, warn};
use tungstenite::protocol::Message as WsMessage;

use crate::config::{HubSettings, OverflowPolicy, clamp_capacity};
use crate::hub::message::Envelope;
use crate::hub::registry::Registry;
use crate::utils::error::HubError;

/// Producer side of the hub.
///
/// Cheap to clone: every connection reader holds one. It shares the registry
/// with the `Dispatcher` and feeds the bounded inbound queue the dispatcher
/// drains. The dispatcher stops once every `Hub` clone has been dropped.
#[derive(Debug, Clone)]
pub struct Hub {
    registry: Arc<Registry>,
    inbound: mpsc::Sender<Envelope>,
    overflow: OverflowPolicy,
}

/// Outcome of handing a message to the inbound queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Queued,
    /// The queue was full under `OverflowPolicy::Drop`.
    Dropped,
}

impl Hub {
    /// Creates the hub and its single dispatcher.
    ///
    /// The caller is expected to spawn `Dispatcher::run`.
    pub fn new(settings: &HubSettings) -> (Self, Dispatcher) {
        let registry = Arc::new(Registry::new());
        let (tx, rx) = mpsc::channel(clamp_capacity(settings.queue_capacity));

        let hub = Self {
            registry: registry.clone(),
            inbound: tx,
            overflow: settings.overflow,
        };
        let dispatcher = Dispatcher {
            registry,
            inbound: rx,
            echo_to_sender: settings.echo_to_sender,
        };
        (hub, dispatcher)
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Pushes a message onto the inbound queue, applying the overflow policy.
    pub async fn submit(&self, envelope: Envelope) -> Result<Submission, HubError> {
        match self.overflow {
            OverflowPolicy::Block => self
                .inbound
                .send(envelope)
                .await
                .map(|_| Submission::Queued)
                .map_err(|_| HubError::QueueClosed),
            OverflowPolicy::Drop => match self.inbound.try_send(envelope) {
                Ok(()) => Ok(Submission::Queued),
                Err(TrySendError::Full(envelope)) => {
                    warn!(
                        conn = %envelope.origin,
                        channel = %envelope.message.channel_id,
                        "inbound queue full, dropping message"
                    );
                    Ok(Submission::Dropped)
                }
                Err(TrySendError::Closed(_)) => Err(HubError::QueueClosed),
            },
        }
    }
}

/// Counts for one broadcast pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// The single consumer of the inbound queue.
///
/// For each message it snapshots the registry and writes the message to every
/// member. It never mutates the registry: a recipient whose write fails is
/// left for its own reader to deregister.
#[derive(Debug)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    inbound: mpsc::Receiver<Envelope>,
    echo_to_sender: bool,
}

impl Dispatcher {
    /// Drains the inbound queue in FIFO order until all producers are gone.
    pub async fn run(mut self) {
        info!("dispatcher started");
        while let Some(envelope) = self.inbound.recv().await {
            let report = self.broadcast(&envelope);
            debug!(
                conn = %envelope.origin,
                attempted = report.attempted,
                delivered = report.delivered,
                failed = report.failed,
                "broadcast pass complete"
            );
        }
        info!("dispatcher stopped");
    }

    /// Fans one message out to the current registry snapshot.
    ///
    /// Every member of the snapshot gets exactly one write attempt, whatever
    /// happens to the others.
    pub fn broadcast(&self, envelope: &Envelope) -> BroadcastReport {
        let text = match serde_json::to_string(&envelope.message) {
            Ok(json) => json,
            Err(e) => {
                error!(conn = %envelope.origin, "failed to serialize message: {e}");
                return BroadcastReport::default();
            }
        };
        let frame = WsMessage::text(text);

        let mut report = BroadcastReport::default();
        for conn in self.registry.snapshot() {
            if !self.echo_to_sender && conn.id() == &envelope.origin {
                continue;
            }
            report.attempted += 1;
            match conn.deliver(frame.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!("{e}");
                }
            }
        }
        report
    }
}
