//! Embedding callbacks
//!
//! The engine surfaces three optional hooks to the embedding application.
//! `on_connect` runs on the accepting task before the read pump starts;
//! `on_message` runs on the connection's read pump; `on_close` runs exactly
//! once on teardown, before the hub unregisters the client. Hooks are
//! synchronous; implementations spawn their own tasks for slow work.

use std::sync::Arc;

use crate::client::{Client, MessageKind};

/// Called when a connection has registered, before its read pump starts.
pub type ConnectHook = Arc<dyn Fn(&Arc<Client>) + Send + Sync>;

/// Called for every inbound data frame.
pub type MessageHook = Arc<dyn Fn(&Arc<Client>, MessageKind, &[u8]) + Send + Sync>;

/// Called once when a connection tears down, before unregistration.
pub type CloseHook = Arc<dyn Fn(&Arc<Client>) + Send + Sync>;

/// The optional callbacks installed on a manager.
#[derive(Clone, Default)]
pub struct EventHooks {
    pub on_connect: Option<ConnectHook>,
    pub on_message: Option<MessageHook>,
    pub on_close: Option<CloseHook>,
}
