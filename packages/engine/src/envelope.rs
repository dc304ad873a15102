//! Cross-node sync wire format
//!
//! Every node participating in auto-sync publishes and consumes
//! [`SyncEnvelope`] values on one shared broker topic. An envelope either
//! carries a direct message (client id set) or a room broadcast (room id
//! set); an envelope with neither is malformed and dropped by the
//! subscriber.

use serde::{Deserialize, Serialize};

use crate::error::EngineResult;

/// The message exchanged between engine nodes through the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncEnvelope {
    /// Target client for a direct message. Empty or absent for broadcasts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Target room for a broadcast. Ignored when `client_id` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,

    /// Opaque payload bytes, delivered to each recipient unchanged.
    pub data: Vec<u8>,
}

/// Where a decoded envelope should be delivered.
#[derive(Debug, PartialEq, Eq)]
pub enum SyncTarget<'a> {
    /// Direct message to one client.
    Client(&'a str),
    /// Broadcast to every member of a room.
    Room(&'a str),
}

impl SyncEnvelope {
    /// Envelope carrying a room broadcast.
    pub fn room(room_id: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            client_id: None,
            room_id: Some(room_id.into()),
            data,
        }
    }

    /// Envelope carrying a direct message.
    pub fn direct(client_id: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            client_id: Some(client_id.into()),
            room_id: None,
            data,
        }
    }

    /// Encode for publishing on the sync topic.
    pub fn encode(&self) -> EngineResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode an envelope received from the sync topic.
    pub fn decode(payload: &[u8]) -> EngineResult<Self> {
        Ok(serde_json::from_slice(payload)?)
    }

    /// Resolve the delivery target.
    ///
    /// A non-empty client id wins over the room id; an empty client id is
    /// treated as absent. Returns `None` for a malformed envelope that
    /// names no target at all.
    pub fn target(&self) -> Option<SyncTarget<'_>> {
        match self.client_id.as_deref() {
            Some(client_id) if !client_id.is_empty() => Some(SyncTarget::Client(client_id)),
            _ => self.room_id.as_deref().map(SyncTarget::Room),
        }
    }
}
