//! Serialized room and client registry
//!
//! All structural changes flow through one dispatch task draining a FIFO
//! command queue, so a register enqueued before a broadcast is always
//! applied before it. The registry itself sits behind a single mutex that
//! the manager also takes for read-only lookups; fan-out enqueues frames
//! while holding it, which is safe because [`Client::send_message`] never
//! blocks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::client::Client;

pub(crate) enum HubCommand {
    Register(Arc<Client>),
    Unregister(Arc<Client>),
    Broadcast { room_id: String, data: Vec<u8> },
    Direct { client_id: String, data: Vec<u8> },
}

#[derive(Default)]
struct Room {
    members: HashMap<Uuid, Arc<Client>>,
}

#[derive(Default)]
pub(crate) struct HubState {
    rooms: HashMap<String, Room>,
    by_id: HashMap<String, Arc<Client>>,
}

impl HubState {
    /// Insert a client into its room, creating the room on first member.
    /// The direct-message index maps each client id to its most recent
    /// registration.
    fn register(&mut self, client: Arc<Client>) {
        self.rooms
            .entry(client.room_id().to_string())
            .or_default()
            .members
            .insert(client.conn_id(), Arc::clone(&client));
        self.by_id.insert(client.id().to_string(), client);
    }

    /// Remove a client from its room and close its outbound queue.
    ///
    /// Idempotent per client: the queue is only closed when the client was
    /// still a room member. An id reclaimed by a newer registration is
    /// left pointing at the newer client.
    fn unregister(&mut self, client: &Arc<Client>) {
        if let Some(room) = self.rooms.get_mut(client.room_id()) {
            if room.members.remove(&client.conn_id()).is_some() {
                client.close_queue();
                if room.members.is_empty() {
                    self.rooms.remove(client.room_id());
                }
            }
        }
        if let Some(current) = self.by_id.get(client.id()) {
            if current.conn_id() == client.conn_id() {
                self.by_id.remove(client.id());
            }
        }
    }

    /// Fan a frame out to every member of a room. A missing room is a
    /// no-op and does not create the room.
    fn broadcast(&self, room_id: &str, data: &[u8]) {
        if let Some(room) = self.rooms.get(room_id) {
            for member in room.members.values() {
                member.send_message(data.to_vec());
            }
        }
    }

    /// Deliver a frame to the client currently registered under an id.
    fn direct(&self, client_id: &str, data: Vec<u8>) {
        if let Some(client) = self.by_id.get(client_id) {
            client.send_message(data);
        }
    }

    fn apply(&mut self, command: HubCommand) {
        match command {
            HubCommand::Register(client) => self.register(client),
            HubCommand::Unregister(client) => self.unregister(&client),
            HubCommand::Broadcast { room_id, data } => self.broadcast(&room_id, &data),
            HubCommand::Direct { client_id, data } => self.direct(&client_id, data),
        }
    }
}

/// Handle to the dispatch task and the shared registry.
pub(crate) struct Hub {
    commands: mpsc::UnboundedSender<HubCommand>,
    state: Arc<Mutex<HubState>>,
}

impl Hub {
    /// Spawn the dispatch task. It runs until the token is cancelled or
    /// every command sender is gone.
    pub(crate) fn spawn(shutdown: CancellationToken) -> Arc<Self> {
        let (commands, mut rx) = mpsc::unbounded_channel::<HubCommand>();
        let state = Arc::new(Mutex::new(HubState::default()));

        let dispatch_state = Arc::clone(&state);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    command = rx.recv() => match command {
                        Some(command) => {
                            dispatch_state
                                .lock()
                                .unwrap_or_else(|e| e.into_inner())
                                .apply(command);
                        }
                        None => break,
                    },
                }
            }
            tracing::debug!("hub dispatch stopped");
        });

        Arc::new(Self { commands, state })
    }

    pub(crate) fn register(&self, client: Arc<Client>) {
        let _ = self.commands.send(HubCommand::Register(client));
    }

    pub(crate) fn unregister(&self, client: Arc<Client>) {
        let _ = self.commands.send(HubCommand::Unregister(client));
    }

    pub(crate) fn broadcast(&self, room_id: String, data: Vec<u8>) {
        let _ = self.commands.send(HubCommand::Broadcast { room_id, data });
    }

    pub(crate) fn direct(&self, client_id: String, data: Vec<u8>) {
        let _ = self.commands.send(HubCommand::Direct { client_id, data });
    }

    /// Whether a client id is registered on this node right now.
    pub(crate) fn contains_client(&self, client_id: &str) -> bool {
        self.lock().by_id.contains_key(client_id)
    }

    pub(crate) fn room_count(&self) -> usize {
        self.lock().rooms.len()
    }

    pub(crate) fn client_count(&self) -> usize {
        self.lock().by_id.len()
    }

    /// Number of members in a room; 0 when the room does not exist.
    pub(crate) fn room_size(&self, room_id: &str) -> usize {
        self.lock()
            .rooms
            .get(room_id)
            .map(|room| room.members.len())
            .unwrap_or(0)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
