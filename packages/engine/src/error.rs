//! Engine error types

use thiserror::Error;

/// Errors surfaced by the engine.
///
/// Only [`EngineError::ClientNotFound`] reaches the embedding application
/// through the broadcaster API; the remaining variants travel between the
/// engine's own layers (broker adapters, envelope codec) and end up as
/// structured log events.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Direct message addressed to a client this node does not host.
    #[error("client not found: {0}")]
    ClientNotFound(String),

    /// Operation attempted on a broker after `close`.
    #[error("message broker is closed")]
    BrokerClosed,

    /// Sync envelope could not be encoded or decoded.
    #[error("sync envelope codec error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Underlying Redis operation failed.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
