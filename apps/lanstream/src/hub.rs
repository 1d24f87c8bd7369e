//! Connection hub: a single task that owns every live connection.
//!
//! Register, unregister and broadcast requests are queued on one unbounded
//! channel and applied strictly in arrival order by the hub loop, so the
//! connection map needs no lock. Writes never block the loop: each connection
//! has its own bounded outbound queue drained by a writer task, and a queue
//! that is closed or full counts as a failed write. Failed connections are
//! dropped inline once the fan-out pass is done, never by re-submitting to
//! the queue the loop is draining.

use std::borrow::Cow;
use std::collections::HashMap;

use axum::extract::ws::{close_code, CloseFrame, Message};
use metrics::{counter, gauge};
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const DEFAULT_CONNECTION_BUFFER: usize = 64;

pub type ConnectionId = Uuid;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("connection hub has stopped")]
    Stopped,
}

enum Command {
    Register {
        id: ConnectionId,
        outbound: mpsc::Sender<Message>,
    },
    Unregister {
        id: ConnectionId,
    },
    Broadcast {
        payload: String,
    },
    Count {
        reply: oneshot::Sender<usize>,
    },
    CloseAll,
}

/// Cheap, cloneable front door to the hub loop. Every submission returns
/// immediately.
#[derive(Clone, Debug)]
pub struct HubHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl HubHandle {
    pub fn register(
        &self,
        id: ConnectionId,
        outbound: mpsc::Sender<Message>,
    ) -> Result<(), HubError> {
        self.submit(Command::Register { id, outbound })
    }

    /// Idempotent; unknown ids are ignored by the loop.
    pub fn unregister(&self, id: ConnectionId) -> Result<(), HubError> {
        self.submit(Command::Unregister { id })
    }

    pub fn broadcast(&self, payload: impl Into<String>) -> Result<(), HubError> {
        self.submit(Command::Broadcast {
            payload: payload.into(),
        })
    }

    /// Number of registered connections once every earlier request has been
    /// applied.
    pub async fn connection_count(&self) -> Result<usize, HubError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Command::Count { reply })?;
        rx.await.map_err(|_| HubError::Stopped)
    }

    /// Sends every connection a going-away close frame and forgets it.
    /// Connections registered afterwards are unaffected.
    pub fn close_all(&self) -> Result<(), HubError> {
        self.submit(Command::CloseAll)
    }

    fn submit(&self, command: Command) -> Result<(), HubError> {
        self.commands.send(command).map_err(|_| HubError::Stopped)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct BroadcastOutcome {
    delivered: usize,
    evicted: usize,
}

pub struct ConnectionHub {
    connections: HashMap<ConnectionId, mpsc::Sender<Message>>,
    commands: mpsc::UnboundedReceiver<Command>,
}

impl ConnectionHub {
    /// Starts the hub loop. It runs until every handle has been dropped.
    pub fn spawn() -> (HubHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let hub = ConnectionHub {
            connections: HashMap::new(),
            commands: rx,
        };
        let task = tokio::spawn(hub.run());
        (HubHandle { commands: tx }, task)
    }

    async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            match command {
                Command::Register { id, outbound } => self.register(id, outbound),
                Command::Unregister { id } => self.unregister(id),
                Command::Broadcast { payload } => {
                    self.broadcast(payload);
                }
                Command::Count { reply } => {
                    let _ = reply.send(self.connections.len());
                }
                Command::CloseAll => self.close_all(),
            }
        }
        debug!(
            connections = self.connections.len(),
            "hub loop finished; dropping remaining connections"
        );
    }

    fn register(&mut self, id: ConnectionId, outbound: mpsc::Sender<Message>) {
        if self.connections.insert(id, outbound).is_some() {
            warn!(connection_id = %id, "connection registered twice; replacing");
        }
        counter!("lanstream_connections_total", 1);
        self.report_active();
        info!(
            connection_id = %id,
            active = self.connections.len(),
            "connection registered"
        );
    }

    fn unregister(&mut self, id: ConnectionId) {
        let Some(outbound) = self.connections.remove(&id) else {
            return;
        };
        send_close(&outbound, close_code::NORMAL, "unregistered");
        self.report_active();
        info!(
            connection_id = %id,
            active = self.connections.len(),
            "connection unregistered"
        );
    }

    fn close_all(&mut self) {
        let closed = self.connections.len();
        for (_, outbound) in self.connections.drain() {
            send_close(&outbound, close_code::AWAY, "server shutting down");
        }
        self.report_active();
        info!(closed, "closed all connections");
    }

    fn broadcast(&mut self, payload: String) -> BroadcastOutcome {
        let mut outcome = BroadcastOutcome::default();
        let mut failed = Vec::new();

        for (id, outbound) in &self.connections {
            match outbound.try_send(Message::Text(payload.clone())) {
                Ok(()) => outcome.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(connection_id = %id, "outbound queue full; evicting");
                    failed.push((*id, "queue_full"));
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(connection_id = %id, "outbound queue closed; evicting");
                    failed.push((*id, "closed"));
                }
            }
        }

        for (id, reason) in failed {
            self.connections.remove(&id);
            outcome.evicted += 1;
            counter!("lanstream_connections_evicted_total", 1, "reason" => reason);
        }
        if outcome.evicted > 0 {
            self.report_active();
        }

        counter!("lanstream_broadcasts_total", 1);
        counter!(
            "lanstream_broadcast_deliveries_total",
            outcome.delivered as u64
        );
        debug!(
            delivered = outcome.delivered,
            evicted = outcome.evicted,
            bytes = payload.len(),
            "broadcast fanned out"
        );
        outcome
    }

    fn report_active(&self) {
        gauge!("lanstream_connections_active", self.connections.len() as f64);
    }
}

// Dropping the sender afterwards ends the writer task once the frame is out.
fn send_close(outbound: &mpsc::Sender<Message>, code: u16, reason: &'static str) {
    let _ = outbound.try_send(Message::Close(Some(CloseFrame {
        code,
        reason: Cow::Borrowed(reason),
    })));
}
