//! Redis pub/sub adapter for multi-instance deployments

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use super::{MessageBroker, MessageHandler};
use crate::error::{EngineError, EngineResult};

const MAX_RECONNECT_DELAY_SECS: u64 = 60;
const MAX_RECONNECT_ATTEMPTS: u32 = 100;

/// Broker bridging engine nodes over Redis pub/sub.
///
/// Wraps an externally owned [`redis::Client`]; closing the broker cancels
/// its subscription tasks but leaves the client untouched. The subscriber
/// reconnects with exponential backoff when the connection drops.
pub struct RedisBroker {
    inner: Arc<RedisInner>,
}

struct RedisInner {
    client: redis::Client,
    handlers: DashMap<String, MessageHandler>,
    listeners: DashMap<String, ()>,
    shutdown: CancellationToken,
}

impl RedisBroker {
    /// Wrap a Redis client, verifying the server is reachable first.
    pub async fn connect(client: redis::Client) -> EngineResult<Self> {
        let mut conn = client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        tracing::info!("redis broker connected");

        Ok(Self {
            inner: Arc::new(RedisInner {
                client,
                handlers: DashMap::new(),
                listeners: DashMap::new(),
                shutdown: CancellationToken::new(),
            }),
        })
    }

    async fn run_listener(inner: Arc<RedisInner>, topic: String) {
        let mut attempts = 0u32;
        let mut delay_secs = 1u64;

        loop {
            match Self::listen_once(&inner, &topic).await {
                Ok(()) => {
                    if inner.shutdown.is_cancelled() {
                        break;
                    }
                    tracing::warn!(topic = %topic, "redis subscription disconnected, reconnecting");
                    attempts = 0;
                    delay_secs = 1;
                }
                Err(e) => {
                    if inner.shutdown.is_cancelled() {
                        break;
                    }
                    attempts += 1;
                    if attempts >= MAX_RECONNECT_ATTEMPTS {
                        tracing::error!(
                            topic = %topic,
                            attempts,
                            "redis subscription reconnect limit exceeded, giving up"
                        );
                        break;
                    }
                    tracing::error!(
                        topic = %topic,
                        error = %e,
                        attempt = attempts,
                        delay_secs,
                        "redis subscription error, reconnecting"
                    );
                }
            }

            tokio::select! {
                _ = inner.shutdown.cancelled() => break,
                _ = tokio::time::sleep(std::time::Duration::from_secs(delay_secs)) => {}
            }
            delay_secs = (delay_secs * 2).min(MAX_RECONNECT_DELAY_SECS);
        }
        tracing::debug!(topic = %topic, "redis subscription task stopped");
    }

    async fn listen_once(inner: &Arc<RedisInner>, topic: &str) -> Result<(), redis::RedisError> {
        #[allow(deprecated)]
        let conn = inner.client.get_async_connection().await?;
        let mut pubsub = conn.into_pubsub();
        pubsub.subscribe(topic).await?;

        let mut stream = pubsub.on_message();
        loop {
            tokio::select! {
                _ = inner.shutdown.cancelled() => return Ok(()),
                msg = stream.next() => match msg {
                    Some(msg) => {
                        let payload = msg.get_payload_bytes().to_vec();
                        if let Some(handler) = inner.handlers.get(topic) {
                            handler(payload);
                        }
                    }
                    None => return Ok(()),
                },
            }
        }
    }
}

#[async_trait]
impl MessageBroker for RedisBroker {
    async fn publish(&self, topic: &str, payload: &[u8]) -> EngineResult<()> {
        if self.inner.shutdown.is_cancelled() {
            return Err(EngineError::BrokerClosed);
        }
        let mut conn = self.inner.client.get_multiplexed_async_connection().await?;
        let _: () = redis::cmd("PUBLISH")
            .arg(topic)
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn subscribe(&self, topic: &str, handler: MessageHandler) -> EngineResult<()> {
        if self.inner.shutdown.is_cancelled() {
            return Err(EngineError::BrokerClosed);
        }
        self.inner.handlers.insert(topic.to_string(), handler);

        // One listener task per topic; re-subscribing only swaps the handler.
        if self.inner.listeners.insert(topic.to_string(), ()).is_some() {
            return Ok(());
        }
        tokio::spawn(Self::run_listener(
            Arc::clone(&self.inner),
            topic.to_string(),
        ));
        Ok(())
    }

    async fn close(&self) -> EngineResult<()> {
        self.inner.shutdown.cancel();
        Ok(())
    }

    fn broker_type(&self) -> &'static str {
        "redis"
    }
}
