//! Default broker that delivers nothing

use async_trait::async_trait;

use super::{MessageBroker, MessageHandler};
use crate::error::EngineResult;

/// Broker that accepts every operation and never delivers a payload.
///
/// The default for single-process engines and tests. Publishing through
/// it succeeds and goes nowhere.
pub struct NoopBroker;

#[async_trait]
impl MessageBroker for NoopBroker {
    async fn publish(&self, _topic: &str, _payload: &[u8]) -> EngineResult<()> {
        Ok(())
    }

    async fn subscribe(&self, _topic: &str, _handler: MessageHandler) -> EngineResult<()> {
        Ok(())
    }

    async fn close(&self) -> EngineResult<()> {
        Ok(())
    }

    fn broker_type(&self) -> &'static str {
        "noop"
    }
}
