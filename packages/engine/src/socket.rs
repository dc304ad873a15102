//! Transport seam: WebSocket upgrade and per-connection driver
//!
//! The engine consumes an already-upgraded WebSocket. [`ws_route`] is an
//! axum handler that pulls the client and room identifiers out of the
//! query string and hands the socket to [`serve_connection`], which runs
//! the two pumps until the connection tears down. Embedders with their own
//! transport can call [`drive_connection`] with any frame stream and sink.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Extension, Query};
use axum::response::Response;
use futures_util::{Sink, Stream, StreamExt};
use serde::Deserialize;
use std::sync::Arc;

use crate::client::{read_pump, write_pump, Client};
use crate::manager::ConnectionManager;

/// Identifiers supplied on the WebSocket handshake.
///
/// Both are opaque strings and both may be absent: a client with no
/// `userId` cannot be direct-addressed, and a client with no `roomId`
/// lands in the empty-string room. Neither is an error.
#[derive(Debug, Deserialize)]
pub struct WsQueryParams {
    #[serde(rename = "userId", default)]
    pub user_id: String,
    #[serde(rename = "roomId", default)]
    pub room_id: String,
}

/// Axum handler upgrading the connection and attaching it to the engine.
///
/// Expects the [`ConnectionManager`] as a request extension.
pub async fn ws_route(
    ws: WebSocketUpgrade,
    Query(params): Query<WsQueryParams>,
    Extension(manager): Extension<ConnectionManager>,
) -> Response {
    ws.on_upgrade(move |socket| serve_connection(manager, socket, params.user_id, params.room_id))
}

/// Run an upgraded WebSocket as an engine client until it disconnects.
pub async fn serve_connection(
    manager: ConnectionManager,
    socket: WebSocket,
    client_id: String,
    room_id: String,
) {
    let (sink, stream) = socket.split();
    drive_connection(manager, sink, stream, client_id, room_id).await;
}

/// Transport-generic connection driver.
///
/// Registers a client with the hub, runs the connect hook on this task
/// before the read pump starts, then pumps frames in both directions.
/// When either pump stops, the close hook fires exactly once, the client
/// unregisters, and the write pump is given one write deadline to flush
/// its close frame before being aborted.
pub async fn drive_connection<Si, St, E>(
    manager: ConnectionManager,
    sink: Si,
    stream: St,
    client_id: String,
    room_id: String,
) where
    Si: Sink<Message, Error = E> + Unpin + Send + 'static,
    St: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let hooks = manager.hooks_handle();
    let (client, frames) = Client::new(client_id, room_id, manager.config_handle());
    manager.register(Arc::clone(&client));
    tracing::info!(
        client_id = %client.id(),
        room_id = %client.room_id(),
        "connection registered"
    );

    let connect_hook = hooks
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .on_connect
        .clone();
    if let Some(hook) = connect_hook {
        hook(&client);
    }

    let write_client = Arc::clone(&client);
    let mut send_task = tokio::spawn(async move {
        let mut sink = sink;
        let mut frames = frames;
        write_pump(&mut sink, &mut frames, &write_client).await;
    });

    let read_client = Arc::clone(&client);
    let read_hooks = Arc::clone(&hooks);
    let mut recv_task = tokio::spawn(async move {
        let mut stream = stream;
        read_pump(&mut stream, &read_client, &read_hooks).await;
    });

    let writer_done = tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
            true
        }
        _ = &mut recv_task => false,
    };

    let close_hook = hooks
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .on_close
        .clone();
    if let Some(hook) = close_hook {
        hook(&client);
    }
    manager.unregister(Arc::clone(&client));

    if !writer_done {
        // Unregistration closes the queue; the writer gets one write
        // deadline to flush its close frame.
        let grace = client.config().write_wait;
        if tokio::time::timeout(grace, &mut send_task).await.is_err() {
            send_task.abort();
        }
    }

    let uptime = chrono::Utc::now() - client.connected_at();
    tracing::info!(
        client_id = %client.id(),
        room_id = %client.room_id(),
        dropped = client.dropped_frames(),
        uptime_ms = uptime.num_milliseconds(),
        "connection closed"
    );
}
