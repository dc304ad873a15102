//! Chat relay built on the engine's event hooks
//!
//! Every inbound frame is rebroadcast to the sender's room, and join or
//! leave events announce the updated live-user count to the room. The
//! hooks are synchronous, so broadcast work hops onto its own task.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use roomcast_engine::{ConnectionManager, MessageKind};

/// Shared chat state: a live-user gauge across all rooms.
#[derive(Default)]
pub struct ChatState {
    online: AtomicUsize,
}

impl ChatState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn online(&self) -> usize {
        self.online.load(Ordering::Relaxed)
    }
}

fn presence_payload(active_users: usize) -> Vec<u8> {
    serde_json::json!({
        "type": "presence",
        "activeUsers": active_users,
    })
    .to_string()
    .into_bytes()
}

/// Install the chat callbacks on a running engine.
pub fn install_hooks(manager: &ConnectionManager, state: Arc<ChatState>) {
    let broadcaster = manager.clone();
    let joined = Arc::clone(&state);
    manager.on_connect(move |client| {
        let count = joined.online.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(
            client_id = %client.id(),
            room_id = %client.room_id(),
            online = count,
            "client joined"
        );
        let manager = broadcaster.clone();
        let room = client.room_id().to_string();
        tokio::spawn(async move {
            manager.broadcast_to_room(&room, presence_payload(count)).await;
        });
    });

    let broadcaster = manager.clone();
    manager.on_message(move |client, kind, data| {
        if kind != MessageKind::Text {
            tracing::debug!(client_id = %client.id(), "ignoring non-text chat frame");
            return;
        }
        let manager = broadcaster.clone();
        let room = client.room_id().to_string();
        let data = data.to_vec();
        tokio::spawn(async move {
            manager.broadcast_to_room(&room, data).await;
        });
    });

    let broadcaster = manager.clone();
    let left = state;
    manager.on_close(move |client| {
        let count = left.online.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
        tracing::info!(
            client_id = %client.id(),
            room_id = %client.room_id(),
            online = count,
            "client left"
        );
        let manager = broadcaster.clone();
        let room = client.room_id().to_string();
        tokio::spawn(async move {
            manager.broadcast_to_room(&room, presence_payload(count)).await;
        });
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presence_payload_is_json() {
        let payload = presence_payload(3);
        let value: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(value["type"], "presence");
        assert_eq!(value["activeUsers"], 3);
    }
}
