//! Pluggable pub/sub bridge
//!
//! A [`MessageBroker`] carries encoded sync envelopes between engine
//! nodes. Three adapters ship with the engine:
//!
//! - [`NoopBroker`]: the default; accepts everything and delivers nothing.
//! - [`InProcessBroker`]: bridges managers inside one process, for
//!   single-host deployments and hermetic tests.
//! - [`RedisBroker`]: Redis pub/sub for multi-instance deployments.
//!
//! Publishing is fire-and-forget with no delivery guarantee; the engine
//! layers no ordering or durability on top of what the broker provides.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::EngineResult;

mod memory;
mod noop;
mod redis;

pub use self::redis::RedisBroker;
pub use memory::InProcessBroker;
pub use noop::NoopBroker;

/// Callback invoked with each payload received on a subscribed topic.
pub type MessageHandler = Arc<dyn Fn(Vec<u8>) + Send + Sync>;

/// A pub/sub adapter bridging engine nodes.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Publish a payload on a topic. Fire-and-forget; blocks at most for
    /// the adapter's internal timeout. Fails with
    /// [`EngineError::BrokerClosed`] after [`close`].
    ///
    /// [`EngineError::BrokerClosed`]: crate::error::EngineError::BrokerClosed
    /// [`close`]: MessageBroker::close
    async fn publish(&self, topic: &str, payload: &[u8]) -> EngineResult<()>;

    /// Deliver every payload published on `topic` to `handler` until the
    /// broker is closed.
    async fn subscribe(&self, topic: &str, handler: MessageHandler) -> EngineResult<()>;

    /// Cancel all subscriptions made through this adapter. Safe to call
    /// concurrently with in-flight publishes.
    async fn close(&self) -> EngineResult<()>;

    /// Adapter identifier, e.g. `"redis"` or `"noop"`.
    fn broker_type(&self) -> &'static str;
}
