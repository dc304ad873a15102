//! Engine configuration
//!
//! All options are fixed at [`ConnectionManager::start`] time; the manager
//! and every connection it accepts share one immutable [`EngineConfig`].
//!
//! [`ConnectionManager::start`]: crate::manager::ConnectionManager::start

use std::sync::Arc;
use std::time::Duration;

use crate::broker::{MessageBroker, NoopBroker};

/// Default period between server-to-client pings.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);

/// Default read deadline; refreshed each time a pong arrives.
pub const DEFAULT_PONG_WAIT: Duration = Duration::from_secs(60);

/// Default per-frame write deadline.
pub const DEFAULT_WRITE_WAIT: Duration = Duration::from_secs(10);

/// Default cap on inbound frame size in bytes.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 512;

/// Default capacity of a client's outbound frame queue.
pub const DEFAULT_BUFFER_SIZE: usize = 256;

/// Default broker topic for cross-node sync envelopes.
pub const DEFAULT_SYNC_CHANNEL: &str = "websocket_sync";

/// Immutable engine configuration.
///
/// Build one with [`EngineConfig::builder`], or use [`EngineConfig::default`]
/// for a single-process engine with no broker.
#[derive(Clone)]
pub struct EngineConfig {
    /// Period between server-to-client pings.
    pub ping_interval: Duration,
    /// Read deadline, refreshed on each pong.
    pub pong_wait: Duration,
    /// Per-frame write deadline.
    pub write_wait: Duration,
    /// Inbound frames larger than this close the connection.
    pub max_message_size: usize,
    /// Capacity of each client's outbound frame queue.
    pub buffer_size: usize,
    /// Route broadcasts and direct messages through the broker.
    pub auto_sync: bool,
    /// Broker topic carrying sync envelopes.
    pub sync_channel: String,
    pub(crate) broker: Arc<dyn MessageBroker>,
}

impl EngineConfig {
    /// Start building a configuration from the defaults.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder {
            config: EngineConfig::default(),
        }
    }

    /// The broker this engine publishes and subscribes through.
    pub fn broker(&self) -> &Arc<dyn MessageBroker> {
        &self.broker
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ping_interval: DEFAULT_PING_INTERVAL,
            pong_wait: DEFAULT_PONG_WAIT,
            write_wait: DEFAULT_WRITE_WAIT,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            buffer_size: DEFAULT_BUFFER_SIZE,
            auto_sync: false,
            sync_channel: DEFAULT_SYNC_CHANNEL.to_string(),
            broker: Arc::new(NoopBroker),
        }
    }
}

/// Builder for [`EngineConfig`].
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Period between server-to-client pings.
    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.config.ping_interval = interval;
        self
    }

    /// How long to wait for a pong before the read deadline expires.
    pub fn pong_wait(mut self, wait: Duration) -> Self {
        self.config.pong_wait = wait;
        self
    }

    /// Per-frame write deadline.
    pub fn write_wait(mut self, wait: Duration) -> Self {
        self.config.write_wait = wait;
        self
    }

    /// Cap on inbound frame size in bytes.
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.config.max_message_size = size;
        self
    }

    /// Capacity of each client's outbound frame queue.
    ///
    /// The value is stored as given; a value of 0 still permits
    /// construction because each connection clamps its queue to a single
    /// slot when it is created, so sends drop whenever the write pump
    /// has not freed it.
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.config.buffer_size = size;
        self
    }

    /// Route broadcasts and direct messages through the broker.
    pub fn auto_sync(mut self, enabled: bool) -> Self {
        self.config.auto_sync = enabled;
        self
    }

    /// Broker topic carrying sync envelopes.
    pub fn sync_channel(mut self, channel: impl Into<String>) -> Self {
        self.config.sync_channel = channel.into();
        self
    }

    /// Broker adapter used when auto-sync is enabled.
    pub fn broker(mut self, broker: Arc<dyn MessageBroker>) -> Self {
        self.config.broker = broker;
        self
    }

    /// Finish building.
    pub fn build(self) -> EngineConfig {
        self.config
    }
}
