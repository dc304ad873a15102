//! Roomcast engine: multi-tenant WebSocket fan-out
//!
//! This crate provides:
//! - Named rooms of long-lived WebSocket connections with at-most-once
//!   per-connection delivery
//! - Direct messaging to a single client by identifier
//! - An optional pub/sub bridge so broadcasts span multiple processes
//!
//! # Architecture
//!
//! ```text
//! socket ──► read pump ──► on_message ──► ConnectionManager
//!                                              │
//!                             auto-sync off    │    auto-sync on
//!                          ┌───────────────────┴─────────────────┐
//!                          ▼                                     ▼
//!                     Hub dispatch                        broker publish
//!                          │                                     │
//!                          │                  subscriber on every node
//!                          │                                     │
//!                          └──────────────► Hub ◄────────────────┘
//!                                            │
//!                              per-client send queues
//!                                            │
//!                          write pump ──► socket (text frame)
//! ```
//!
//! The hub is a single dispatch task draining one FIFO command queue, so
//! registry mutation needs no fine-grained locking on the fan-out path.
//! Each connection runs two cooperating tasks: a read pump (frame size cap,
//! pong-refreshed read deadline) and a write pump (bounded queue, ping
//! ticker, per-frame write deadline). A stalled peer drops frames instead
//! of blocking the hub or other clients.
//!
//! # Quick start
//!
//! ```no_run
//! use roomcast_engine::{ConnectionManager, EngineConfig};
//!
//! # async fn run() {
//! let manager = ConnectionManager::start(EngineConfig::default()).await;
//! manager.on_message(|client, _kind, data| {
//!     tracing::info!(client_id = %client.id(), len = data.len(), "frame received");
//! });
//! manager.broadcast_to_room("lobby", b"hello".to_vec()).await;
//! # }
//! ```

pub mod broker;
pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod events;
pub mod manager;
pub mod socket;

mod hub;

pub use broker::{InProcessBroker, MessageBroker, MessageHandler, NoopBroker, RedisBroker};
pub use client::{Client, MessageKind};
pub use config::EngineConfig;
pub use envelope::{SyncEnvelope, SyncTarget};
pub use error::{EngineError, EngineResult};
pub use manager::ConnectionManager;
pub use socket::{drive_connection, serve_connection, ws_route};
