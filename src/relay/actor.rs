use std::collections::HashMap;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::types::{BroadcastReport, ConnectionId, OutboundMessage, RelayError};

/// Commands sent to the registry actor
pub(crate) enum RegistryCommand {
    Open {
        id: ConnectionId,
        tx: mpsc::Sender<OutboundMessage>,
        reply: oneshot::Sender<()>,
    },
    Broadcast {
        from: ConnectionId,
        payload: OutboundMessage,
        reply: oneshot::Sender<BroadcastReport>,
    },
    Close {
        id: ConnectionId,
        reply: oneshot::Sender<bool>,
    },
    Count {
        reply: oneshot::Sender<usize>,
    },
}

pub(crate) async fn registry_actor(mut rx: mpsc::Receiver<RegistryCommand>) {
    let mut connections: HashMap<ConnectionId, mpsc::Sender<OutboundMessage>> = HashMap::new();

    while let Some(cmd) = rx.recv().await {
        match cmd {
            RegistryCommand::Open { id, tx, reply } => {
                if connections.insert(id, tx).is_some() {
                    debug!("Connection {} re-opened, sender replaced", id);
                } else {
                    info!("Connection {} opened ({} live)", id, connections.len());
                }
                let _ = reply.send(());
            }

            RegistryCommand::Broadcast {
                from,
                payload,
                reply,
            } => {
                let report = fan_out(&mut connections, from, payload);
                let _ = reply.send(report);
            }

            RegistryCommand::Close { id, reply } => {
                let removed = connections.remove(&id).is_some();
                if removed {
                    info!("Connection {} closed ({} live)", id, connections.len());
                }
                let _ = reply.send(removed);
            }

            RegistryCommand::Count { reply } => {
                let _ = reply.send(connections.len());
            }
        }
    }

    debug!("Registry actor stopped with {} connections", connections.len());
}

/// Enqueue `payload` for every connection except `from`.
///
/// Never waits on a recipient: a full queue drops the message for that
/// recipient only, a closed queue evicts it.
fn fan_out(
    connections: &mut HashMap<ConnectionId, mpsc::Sender<OutboundMessage>>,
    from: ConnectionId,
    payload: OutboundMessage,
) -> BroadcastReport {
    let mut report = BroadcastReport::default();
    let mut dead = Vec::new();

    for (id, tx) in connections.iter().filter(|(id, _)| **id != from) {
        match tx.try_send(payload.clone()) {
            Ok(()) => report.delivered += 1,
            Err(TrySendError::Full(_)) => {
                warn!("Outbound queue full for {}, dropping message from {}", id, from);
                report.dropped += 1;
            }
            Err(TrySendError::Closed(_)) => dead.push(*id),
        }
    }

    for id in dead {
        connections.remove(&id);
        report.evicted += 1;
        info!("Connection {} evicted (channel closed)", id);
    }

    debug!(
        from = %from,
        bytes = payload.len(),
        delivered = report.delivered,
        dropped = report.dropped,
        evicted = report.evicted,
        "Relayed message"
    );
    report
}

/// Handle to communicate with the registry actor
#[derive(Clone)]
pub struct RegistryHandle {
    pub(crate) tx: mpsc::Sender<RegistryCommand>,
}

impl RegistryHandle {
    /// Spawn the registry actor on the current runtime.
    pub fn spawn(command_buffer: usize) -> Self {
        let (tx, rx) = mpsc::channel::<RegistryCommand>(command_buffer);
        tokio::spawn(registry_actor(rx));
        Self { tx }
    }

    /// Register a connection. Once this returns, the connection receives
    /// every broadcast that starts afterwards.
    pub async fn open(
        &self,
        id: ConnectionId,
        tx: mpsc::Sender<OutboundMessage>,
    ) -> Result<(), RelayError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(RegistryCommand::Open {
            id,
            tx,
            reply: reply_tx,
        })
        .await?;
        reply_rx.await.map_err(|_| RelayError::RegistryClosed)
    }

    /// Forward `payload` to every registered connection other than `from`
    pub async fn broadcast(
        &self,
        from: ConnectionId,
        payload: OutboundMessage,
    ) -> Result<BroadcastReport, RelayError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(RegistryCommand::Broadcast {
            from,
            payload,
            reply: reply_tx,
        })
        .await?;
        reply_rx.await.map_err(|_| RelayError::RegistryClosed)
    }

    /// Unregister a connection. Returns false if it was not registered.
    pub async fn close(&self, id: ConnectionId) -> Result<bool, RelayError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(RegistryCommand::Close { id, reply: reply_tx }).await?;
        reply_rx.await.map_err(|_| RelayError::RegistryClosed)
    }

    /// Number of live connections
    pub async fn connection_count(&self) -> Result<usize, RelayError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(RegistryCommand::Count { reply: reply_tx }).await?;
        reply_rx.await.map_err(|_| RelayError::RegistryClosed)
    }

    async fn send(&self, cmd: RegistryCommand) -> Result<(), RelayError> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| RelayError::RegistryClosed)
    }
}
