//! In-process pub/sub for single-host deployments
//!
//! Bridges several managers running in one process without an external
//! broker: clones of one [`InProcessBroker`] share the same topic bus.
//! Also the broker of choice for exercising cross-node sync in tests.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::{MessageBroker, MessageHandler};
use crate::error::{EngineError, EngineResult};

/// Capacity of each topic's broadcast channel.
const TOPIC_CAPACITY: usize = 256;

/// Broker backed by per-topic `tokio::sync::broadcast` channels.
///
/// Cheap to clone; every clone publishes into and subscribes from the
/// same channels. Subscribers that fall behind skip messages, matching
/// the no-delivery-guarantee broker contract.
#[derive(Clone)]
pub struct InProcessBroker {
    inner: Arc<Inner>,
}

struct Inner {
    topics: DashMap<String, broadcast::Sender<Vec<u8>>>,
    shutdown: CancellationToken,
}

impl InProcessBroker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                topics: DashMap::new(),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    fn topic_sender(&self, topic: &str) -> broadcast::Sender<Vec<u8>> {
        self.inner
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .clone()
    }
}

impl Default for InProcessBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBroker for InProcessBroker {
    async fn publish(&self, topic: &str, payload: &[u8]) -> EngineResult<()> {
        if self.inner.shutdown.is_cancelled() {
            return Err(EngineError::BrokerClosed);
        }
        // No receivers is fine; the payload is simply lost.
        let _ = self.topic_sender(topic).send(payload.to_vec());
        Ok(())
    }

    async fn subscribe(&self, topic: &str, handler: MessageHandler) -> EngineResult<()> {
        if self.inner.shutdown.is_cancelled() {
            return Err(EngineError::BrokerClosed);
        }
        let mut rx = self.topic_sender(topic).subscribe();
        let shutdown = self.inner.shutdown.clone();
        let topic = topic.to_string();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    received = rx.recv() => match received {
                        Ok(payload) => handler(payload),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(topic = %topic, skipped, "in-process subscriber lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });
        Ok(())
    }

    async fn close(&self) -> EngineResult<()> {
        self.inner.shutdown.cancel();
        Ok(())
    }

    fn broker_type(&self) -> &'static str {
        "memory"
    }
}
