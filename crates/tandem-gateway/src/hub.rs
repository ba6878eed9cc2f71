// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat hub actor.
//!
//! One task owns the room registry (`SessionId -> clients`) and applies
//! register, unregister, and broadcast commands strictly one at a time, in
//! arrival order. Client queues are fed with `try_send`: a full or closed
//! queue gets its client evicted instead of stalling the room.
//!
//! Local broadcasts are delivered first, then tagged with this instance's id
//! and handed to a publisher task for the bus. Bus envelopes carrying this
//! instance's id are dropped on intake, since they were already delivered.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tandem_core::{Envelope, MessageBus, SessionId, TandemError, UserId};

use crate::frame::ends_session;

/// Capacity of the hub's command queue.
pub const COMMAND_CAPACITY: usize = 1024;

/// Capacity of the queue between the hub and its bus publisher.
pub const PUBLISH_CAPACITY: usize = 1024;

/// Identifies one connection within this instance.
pub type ClientId = u64;

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a process-unique client id.
pub fn next_client_id() -> ClientId {
    NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed)
}

/// A connection's membership in a room.
#[derive(Debug)]
pub struct Client {
    pub id: ClientId,
    pub user_id: UserId,
    pub session_id: SessionId,
    /// Outbound queue. Dropping the hub's copy closes the connection.
    pub sender: mpsc::Sender<String>,
}

enum HubCommand {
    Register(Client),
    Unregister {
        session_id: SessionId,
        client_id: ClientId,
    },
    Broadcast(Envelope),
    RoomSize {
        session_id: SessionId,
        reply: oneshot::Sender<usize>,
    },
    RoomCount(oneshot::Sender<usize>),
}

/// Cloneable handle to a running hub.
#[derive(Clone)]
pub struct HubHandle {
    commands: mpsc::Sender<HubCommand>,
    instance_id: Arc<str>,
}

impl std::fmt::Debug for HubHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubHandle")
            .field("instance_id", &self.instance_id)
            .finish()
    }
}

fn hub_stopped() -> TandemError {
    TandemError::Channel {
        message: "chat hub is not running".into(),
        source: None,
    }
}

impl HubHandle {
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    async fn send(&self, cmd: HubCommand) -> Result<(), TandemError> {
        self.commands.send(cmd).await.map_err(|_| hub_stopped())
    }

    pub async fn register(&self, client: Client) -> Result<(), TandemError> {
        self.send(HubCommand::Register(client)).await
    }

    pub async fn unregister(
        &self,
        session_id: SessionId,
        client_id: ClientId,
    ) -> Result<(), TandemError> {
        self.send(HubCommand::Unregister {
            session_id,
            client_id,
        })
        .await
    }

    /// Deliver `data` to the session's room here and on every other instance.
    pub async fn broadcast(
        &self,
        session_id: SessionId,
        sender_id: UserId,
        data: String,
    ) -> Result<(), TandemError> {
        self.send(HubCommand::Broadcast(Envelope {
            session_id,
            data,
            sender_id,
            origin_instance_id: None,
        }))
        .await
    }

    /// Number of local clients in a session's room.
    pub async fn room_size(&self, session_id: SessionId) -> Result<usize, TandemError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::RoomSize { session_id, reply }).await?;
        rx.await.map_err(|_| hub_stopped())
    }

    /// Number of rooms with at least one local client.
    pub async fn room_count(&self) -> Result<usize, TandemError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::RoomCount(reply)).await?;
        rx.await.map_err(|_| hub_stopped())
    }
}

/// The room registry and its actor loop.
pub struct Hub {
    instance_id: Arc<str>,
    rooms: HashMap<SessionId, HashMap<ClientId, mpsc::Sender<String>>>,
    publish_tx: mpsc::Sender<Envelope>,
}

impl Hub {
    /// Subscribe to `bus` and start the hub and its publisher. Both tasks run
    /// until `cancel` fires or every handle is dropped.
    pub async fn spawn(
        instance_id: impl Into<String>,
        bus: Arc<dyn MessageBus>,
        cancel: CancellationToken,
    ) -> Result<(HubHandle, JoinHandle<()>), TandemError> {
        let instance_id: Arc<str> = Arc::from(instance_id.into());
        let intake = bus.subscribe().await?;

        let (publish_tx, publish_rx) = mpsc::channel(PUBLISH_CAPACITY);
        tokio::spawn(run_publisher(bus, publish_rx));

        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CAPACITY);
        let hub = Hub {
            instance_id: instance_id.clone(),
            rooms: HashMap::new(),
            publish_tx,
        };
        let task = tokio::spawn(hub.run(commands_rx, intake, cancel));

        info!(instance_id = %instance_id, "chat hub started");
        Ok((
            HubHandle {
                commands: commands_tx,
                instance_id,
            },
            task,
        ))
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<HubCommand>,
        intake: mpsc::Receiver<Envelope>,
        cancel: CancellationToken,
    ) {
        let mut intake = Some(intake);
        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.handle(cmd),
                    None => break,
                },
                envelope = next_envelope(&mut intake) => match envelope {
                    Some(envelope) => self.relay(envelope),
                    None => {
                        warn!("bus subscription closed, continuing with local delivery only");
                        intake = None;
                    }
                },
                _ = cancel.cancelled() => break,
            }
        }
        info!(rooms = self.rooms.len(), "chat hub stopped");
    }

    fn handle(&mut self, cmd: HubCommand) {
        match cmd {
            HubCommand::Register(client) => {
                debug!(
                    user_id = %client.user_id,
                    session_id = %client.session_id,
                    client_id = client.id,
                    "client joined"
                );
                self.rooms
                    .entry(client.session_id)
                    .or_default()
                    .insert(client.id, client.sender);
            }
            HubCommand::Unregister {
                session_id,
                client_id,
            } => {
                if let Some(room) = self.rooms.get_mut(&session_id) {
                    if room.remove(&client_id).is_some() {
                        debug!(session_id = %session_id, client_id, "client left");
                    }
                    if room.is_empty() {
                        self.rooms.remove(&session_id);
                    }
                }
            }
            HubCommand::Broadcast(mut envelope) => {
                self.deliver(&envelope.session_id, &envelope.data);
                envelope.origin_instance_id = Some(self.instance_id.to_string());
                if let Err(e) = self.publish_tx.try_send(envelope) {
                    warn!(error = %e, "bus publish queue unavailable, envelope not relayed");
                }
            }
            HubCommand::RoomSize { session_id, reply } => {
                let _ = reply.send(self.rooms.get(&session_id).map_or(0, HashMap::len));
            }
            HubCommand::RoomCount(reply) => {
                let _ = reply.send(self.rooms.len());
            }
        }
    }

    fn relay(&mut self, envelope: Envelope) {
        if envelope.origin_instance_id.as_deref() == Some(&*self.instance_id) {
            return;
        }
        self.deliver(&envelope.session_id, &envelope.data);
    }

    fn deliver(&mut self, session_id: &SessionId, data: &str) {
        let Some(room) = self.rooms.get_mut(session_id) else {
            return;
        };
        room.retain(|client_id, sender| match sender.try_send(data.to_string()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(session_id = %session_id, client_id, "slow consumer evicted");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });

        // Dropping the senders lets each connection drain and close.
        if room.is_empty() || ends_session(data) {
            self.rooms.remove(session_id);
        }
    }
}

async fn next_envelope(intake: &mut Option<mpsc::Receiver<Envelope>>) -> Option<Envelope> {
    match intake {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn run_publisher(bus: Arc<dyn MessageBus>, mut rx: mpsc::Receiver<Envelope>) {
    while let Some(envelope) = rx.recv().await {
        if let Err(e) = bus.publish(&envelope).await {
            warn!(session_id = %envelope.session_id, error = %e, "bus publish failed");
        }
    }
}
