//! Shared helpers for engine integration tests
//!
//! Connections are driven through channel-backed socket fakes: the sink
//! half collects every frame the engine writes, and the stream half lets
//! a test act as the peer (send frames, or hang up by dropping it).

#![allow(dead_code)]

use std::time::Duration;

use axum::extract::ws::Message;
use futures::channel::mpsc as socket_channel;
use futures::StreamExt;
use tokio::task::JoinHandle;

use roomcast_engine::{drive_connection, ConnectionManager};

/// Frame result type carried by the fake socket stream.
pub type FakeFrame = Result<Message, socket_channel::SendError>;

/// Client side of a fake connection.
pub struct FakePeer {
    /// Frames the engine wrote to the socket.
    pub outbound: socket_channel::UnboundedReceiver<Message>,
    /// Feeds frames the engine reads from the socket; dropping it hangs up.
    pub inbound: socket_channel::UnboundedSender<FakeFrame>,
    /// The connection driver task.
    pub task: JoinHandle<()>,
}

impl FakePeer {
    /// Next frame written by the engine, within a bounded wait.
    pub async fn next_frame(&mut self) -> Message {
        tokio::time::timeout(Duration::from_secs(1), self.outbound.next())
            .await
            .expect("engine should write a frame within the timeout")
            .expect("socket should still be open")
    }

    /// Assert no frame arrives for a short grace period.
    pub async fn expect_silence(&mut self) {
        tokio::time::sleep(Duration::from_millis(50)).await;
        match self.outbound.try_next() {
            Ok(Some(frame)) => panic!("unexpected frame: {frame:?}"),
            Ok(None) | Err(_) => {}
        }
    }
}

/// Attach a fake connection to the manager and wait until the hub has
/// registered it.
pub async fn connect(manager: &ConnectionManager, client_id: &str, room_id: &str) -> FakePeer {
    let (sink_tx, sink_rx) = socket_channel::unbounded::<Message>();
    let (stream_tx, stream_rx) = socket_channel::unbounded::<FakeFrame>();

    let before = manager.client_count();
    let task = tokio::spawn(drive_connection(
        manager.clone(),
        sink_tx,
        stream_rx,
        client_id.to_string(),
        room_id.to_string(),
    ));
    wait_until(|| manager.client_count() > before).await;

    FakePeer {
        outbound: sink_rx,
        inbound: stream_tx,
        task,
    }
}

/// Poll a condition until it holds or the deadline passes.
pub async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within the timeout");
}
