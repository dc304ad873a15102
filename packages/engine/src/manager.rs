//! Engine façade
//!
//! The [`ConnectionManager`] composes the hub, the broker, and the
//! configuration into the engine's outward API. With auto-sync off it is a
//! single-process fan-out; with auto-sync on, every broadcast and direct
//! message travels through the broker and fans out on whichever nodes
//! receive the envelope, including this one. The originating node never
//! short-circuits locally, so delivery stays at-most-once per member no
//! matter how many nodes share the topic.

use std::sync::{Arc, RwLock};

use tokio_util::sync::CancellationToken;

use crate::client::Client;
use crate::config::EngineConfig;
use crate::envelope::{SyncEnvelope, SyncTarget};
use crate::error::{EngineError, EngineResult};
use crate::events::{CloseHook, ConnectHook, EventHooks, MessageHook};
use crate::hub::Hub;

/// Handle to a running engine. Cheap to clone; all clones share one hub,
/// broker subscription, and callback set.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    config: Arc<EngineConfig>,
    hub: Arc<Hub>,
    hooks: Arc<RwLock<EventHooks>>,
    shutdown: CancellationToken,
}

impl ConnectionManager {
    /// Start the engine: spawn the hub dispatch task and, when auto-sync
    /// is enabled against a real broker, subscribe to the sync topic.
    ///
    /// A failed subscription is logged and the engine keeps running
    /// without cross-node sync, as does an engine whose auto-sync was
    /// requested with no broker configured.
    pub async fn start(config: EngineConfig) -> Self {
        let config = Arc::new(config);
        let shutdown = CancellationToken::new();
        let hub = Hub::spawn(shutdown.child_token());

        let manager = Self {
            inner: Arc::new(ManagerInner {
                config: Arc::clone(&config),
                hub,
                hooks: Arc::new(RwLock::new(EventHooks::default())),
                shutdown,
            }),
        };

        if config.auto_sync {
            if config.broker.broker_type() == "noop" {
                tracing::warn!(
                    "auto-sync is enabled but no message broker is configured; cross-node sync will not work"
                );
            } else {
                let hub = Arc::clone(&manager.inner.hub);
                let handler: crate::broker::MessageHandler =
                    Arc::new(move |payload| dispatch_sync_payload(&hub, &payload));
                if let Err(e) = config.broker.subscribe(&config.sync_channel, handler).await {
                    tracing::error!(
                        error = %e,
                        channel = %config.sync_channel,
                        "failed to subscribe to sync channel, continuing without cross-node sync"
                    );
                }
            }
        }

        manager
    }

    /// Deliver a payload to every member of a room.
    ///
    /// With auto-sync on, the payload is published on the sync topic and
    /// fans out when the envelope comes back through the subscription;
    /// publish failures are logged, never retried locally.
    pub async fn broadcast_to_room(&self, room_id: &str, data: Vec<u8>) {
        if self.inner.config.auto_sync {
            let envelope = SyncEnvelope::room(room_id, data);
            self.publish_envelope(&envelope, "room broadcast").await;
        } else {
            self.inner.hub.broadcast(room_id.to_string(), data);
        }
    }

    /// Deliver a payload to one client by id.
    ///
    /// With auto-sync off the client must be registered on this node;
    /// otherwise [`EngineError::ClientNotFound`] is returned. With
    /// auto-sync on the envelope is published for whichever node hosts
    /// the client, and locality is not checked.
    pub async fn send_message(&self, client_id: &str, data: Vec<u8>) -> EngineResult<()> {
        if self.inner.config.auto_sync {
            let envelope = SyncEnvelope::direct(client_id, data);
            self.publish_envelope(&envelope, "direct message").await;
            return Ok(());
        }

        if !self.inner.hub.contains_client(client_id) {
            return Err(EngineError::ClientNotFound(client_id.to_string()));
        }
        self.inner.hub.direct(client_id.to_string(), data);
        Ok(())
    }

    /// Install the connect callback.
    pub fn on_connect(&self, hook: impl Fn(&Arc<Client>) + Send + Sync + 'static) {
        self.hooks_mut().on_connect = Some(Arc::new(hook) as ConnectHook);
    }

    /// Install the message callback, invoked on each connection's read
    /// pump for every inbound data frame.
    pub fn on_message(
        &self,
        hook: impl Fn(&Arc<Client>, crate::client::MessageKind, &[u8]) + Send + Sync + 'static,
    ) {
        self.hooks_mut().on_message = Some(Arc::new(hook) as MessageHook);
    }

    /// Install the close callback, invoked exactly once per connection
    /// before the hub unregisters it.
    pub fn on_close(&self, hook: impl Fn(&Arc<Client>) + Send + Sync + 'static) {
        self.hooks_mut().on_close = Some(Arc::new(hook) as CloseHook);
    }

    /// Shut down the sync subscription and release broker resources.
    /// Connection pumps exit as their sockets close.
    pub async fn close(&self) {
        self.inner.shutdown.cancel();
        if let Err(e) = self.inner.config.broker.close().await {
            tracing::warn!(error = %e, "broker close failed");
        }
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Number of rooms with at least one member on this node.
    pub fn room_count(&self) -> usize {
        self.inner.hub.room_count()
    }

    /// Number of clients registered on this node.
    pub fn client_count(&self) -> usize {
        self.inner.hub.client_count()
    }

    /// Number of members in a room on this node; 0 for an absent room.
    pub fn room_size(&self, room_id: &str) -> usize {
        self.inner.hub.room_size(room_id)
    }

    pub(crate) fn config_handle(&self) -> Arc<EngineConfig> {
        Arc::clone(&self.inner.config)
    }

    pub(crate) fn hooks_handle(&self) -> Arc<RwLock<EventHooks>> {
        Arc::clone(&self.inner.hooks)
    }

    pub(crate) fn register(&self, client: Arc<Client>) {
        self.inner.hub.register(client);
    }

    pub(crate) fn unregister(&self, client: Arc<Client>) {
        self.inner.hub.unregister(client);
    }

    async fn publish_envelope(&self, envelope: &SyncEnvelope, what: &'static str) {
        let payload = match envelope.encode() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode sync envelope for {what}");
                return;
            }
        };
        if let Err(e) = self
            .inner
            .config
            .broker
            .publish(&self.inner.config.sync_channel, &payload)
            .await
        {
            tracing::error!(error = %e, "failed to publish {what}");
        }
    }

    fn hooks_mut(&self) -> std::sync::RwLockWriteGuard<'_, EventHooks> {
        self.inner.hooks.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// Route an envelope received on the sync topic into the hub. Malformed
/// envelopes are logged and dropped.
fn dispatch_sync_payload(hub: &Hub, payload: &[u8]) {
    let envelope = match SyncEnvelope::decode(payload) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!(error = %e, "dropping malformed sync envelope");
            return;
        }
    };
    match envelope.target() {
        Some(SyncTarget::Client(client_id)) => {
            hub.direct(client_id.to_string(), envelope.data);
        }
        Some(SyncTarget::Room(room_id)) => {
            hub.broadcast(room_id.to_string(), envelope.data);
        }
        None => {
            tracing::warn!("dropping sync envelope with no target");
        }
    }
}
