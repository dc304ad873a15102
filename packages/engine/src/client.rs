//! Per-connection client endpoint
//!
//! A [`Client`] is one WebSocket endpoint: its identity, its bounded
//! outbound frame queue, and the shutdown token the hub cancels when the
//! client unregisters. The two pump functions in this module move frames
//! between the socket and the rest of the engine; exactly one write pump
//! owns the socket's send half, so nothing else ever writes frames
//! directly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use axum::extract::ws::Message;
use chrono::{DateTime, Utc};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, timeout_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::events::EventHooks;

/// Payload attached to server pings.
const PING_PAYLOAD: &[u8] = b"ping";

/// Kind of inbound data frame handed to the message hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Binary,
}

/// One WebSocket endpoint and its per-connection state.
///
/// Clients are created by the engine when a connection is accepted and
/// handed to the embedding application through the event hooks. The
/// handle is cheap to share; [`Client::send_message`] may be called from
/// any task and never blocks.
pub struct Client {
    id: String,
    room_id: String,
    conn_id: Uuid,
    frames: mpsc::Sender<Vec<u8>>,
    shutdown: CancellationToken,
    dropped_frames: AtomicU64,
    connected_at: DateTime<Utc>,
    config: Arc<EngineConfig>,
}

impl Client {
    /// Create a client and the receiving end of its outbound queue.
    ///
    /// The queue capacity comes from the configuration; a configured
    /// capacity of 0 is clamped to a single slot.
    pub(crate) fn new(
        id: String,
        room_id: String,
        config: Arc<EngineConfig>,
    ) -> (Arc<Self>, mpsc::Receiver<Vec<u8>>) {
        let (frames, rx) = mpsc::channel(config.buffer_size.max(1));
        let client = Arc::new(Self {
            id,
            room_id,
            conn_id: Uuid::new_v4(),
            frames,
            shutdown: CancellationToken::new(),
            dropped_frames: AtomicU64::new(0),
            connected_at: Utc::now(),
            config,
        });
        (client, rx)
    }

    /// Client identifier supplied on handshake. Not guaranteed unique;
    /// a duplicate id routes direct messages to the newest registration.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Room this client belongs to for its whole lifetime.
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// When the connection was accepted.
    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Number of frames dropped because the outbound queue was full.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    /// Engine configuration shared by every connection of this manager.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Process-unique identity of this connection, distinct from the
    /// caller-supplied client id.
    pub(crate) fn conn_id(&self) -> Uuid {
        self.conn_id
    }

    /// Enqueue a frame for delivery, without blocking.
    ///
    /// When the queue is full the frame is dropped and counted; a peer
    /// that stalls must never hold up the hub or other clients. Frames
    /// enqueued after the hub has closed the queue are discarded.
    pub fn send_message(&self, frame: Vec<u8>) {
        if self.shutdown.is_cancelled() {
            tracing::debug!(client_id = %self.id, "queue closed, discarding frame");
            return;
        }
        match self.frames.try_send(frame) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                let dropped = self.dropped_frames.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(
                    client_id = %self.id,
                    room_id = %self.room_id,
                    dropped,
                    "send queue full, dropping frame"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(client_id = %self.id, "send queue receiver gone, discarding frame");
            }
        }
    }

    /// Close the outbound queue. Called by the hub, exactly once, while
    /// unregistering this client.
    pub(crate) fn close_queue(&self) {
        self.shutdown.cancel();
    }

    pub(crate) fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

/// Read half of a connection.
///
/// Enforces the inbound size cap and a read deadline that is refreshed on
/// each pong, and dispatches data frames to the message hook. Returns when
/// the peer closes, a frame breaks the rules, the deadline expires, or the
/// transport errors.
pub(crate) async fn read_pump<St, E>(
    stream: &mut St,
    client: &Arc<Client>,
    hooks: &Arc<RwLock<EventHooks>>,
) where
    St: Stream<Item = Result<Message, E>> + Unpin,
    E: std::fmt::Display,
{
    let pong_wait = client.config.pong_wait;
    let max_message_size = client.config.max_message_size;
    let mut deadline = Instant::now() + pong_wait;

    loop {
        let frame = match timeout_at(deadline, stream.next()).await {
            Err(_) => {
                tracing::debug!(client_id = %client.id, "read deadline expired");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                tracing::debug!(client_id = %client.id, error = %e, "read error");
                break;
            }
            Ok(Some(Ok(frame))) => frame,
        };

        let (kind, data) = match frame {
            Message::Text(text) => (MessageKind::Text, text.into_bytes()),
            Message::Binary(data) => (MessageKind::Binary, data),
            Message::Pong(_) => {
                deadline = Instant::now() + pong_wait;
                continue;
            }
            // The transport answers pings on its own.
            Message::Ping(_) => continue,
            Message::Close(_) => break,
        };

        if data.len() > max_message_size {
            tracing::warn!(
                client_id = %client.id,
                size = data.len(),
                max = max_message_size,
                "inbound frame exceeds size cap, closing"
            );
            break;
        }

        let hook = hooks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .on_message
            .clone();
        if let Some(hook) = hook {
            hook(client, kind, &data);
        }
    }
}

/// Write half of a connection.
///
/// Dequeues frames and writes them as text (binary when the payload is
/// not UTF-8) under the per-frame write deadline, and pings the peer every
/// ping interval. When the hub closes the queue, a close frame is written
/// and the pump exits without draining what was still queued.
pub(crate) async fn write_pump<Si, E>(
    sink: &mut Si,
    frames: &mut mpsc::Receiver<Vec<u8>>,
    client: &Arc<Client>,
) where
    Si: Sink<Message, Error = E> + Unpin,
    E: std::fmt::Display,
{
    let write_wait = client.config.write_wait;
    let shutdown = client.shutdown_token();
    let mut ticker = interval_at(
        Instant::now() + client.config.ping_interval,
        client.config.ping_interval,
    );
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                let _ = timeout(write_wait, sink.send(Message::Close(None))).await;
                break;
            }

            maybe_frame = frames.recv() => {
                let Some(frame) = maybe_frame else {
                    let _ = timeout(write_wait, sink.send(Message::Close(None))).await;
                    break;
                };
                let message = match String::from_utf8(frame) {
                    Ok(text) => Message::Text(text),
                    Err(e) => Message::Binary(e.into_bytes()),
                };
                match timeout(write_wait, sink.send(message)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::debug!(client_id = %client.id, error = %e, "write error");
                        break;
                    }
                    Err(_) => {
                        tracing::debug!(client_id = %client.id, "write deadline expired");
                        break;
                    }
                }
            }

            _ = ticker.tick() => {
                match timeout(write_wait, sink.send(Message::Ping(PING_PAYLOAD.to_vec()))).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::debug!(client_id = %client.id, error = %e, "ping write error");
                        break;
                    }
                    Err(_) => {
                        tracing::debug!(client_id = %client.id, "ping write deadline expired");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    fn test_client(buffer_size: usize) -> (Arc<Client>, mpsc::Receiver<Vec<u8>>) {
        let config = Arc::new(
            crate::config::EngineConfig::builder()
                .buffer_size(buffer_size)
                .build(),
        );
        Client::new("c-1".to_string(), "r-1".to_string(), config)
    }

    fn client_with(config: EngineConfig) -> (Arc<Client>, mpsc::Receiver<Vec<u8>>) {
        Client::new("c-1".to_string(), "r-1".to_string(), Arc::new(config))
    }

    /// Let spawned tasks observe timer and channel wakeups.
    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn full_queue_drops_and_records() {
        let (client, mut rx) = test_client(1);

        client.send_message(b"m1".to_vec());
        client.send_message(b"m2".to_vec());

        assert_eq!(client.dropped_frames(), 1);
        assert_eq!(rx.recv().await.unwrap(), b"m1".to_vec());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn zero_buffer_still_constructs_with_one_slot() {
        let (client, mut rx) = test_client(0);

        client.send_message(b"m1".to_vec());
        client.send_message(b"m2".to_vec());

        assert_eq!(client.dropped_frames(), 1);
        assert_eq!(rx.recv().await.unwrap(), b"m1".to_vec());
    }

    #[tokio::test]
    async fn send_after_queue_close_is_discarded() {
        let (client, mut rx) = test_client(8);

        client.close_queue();
        client.send_message(b"late".to_vec());

        assert!(rx.try_recv().is_err());
        assert_eq!(client.dropped_frames(), 0);
    }

    #[tokio::test]
    async fn write_pump_delivers_frames_as_text() {
        let (client, rx) = test_client(8);
        let (sink_tx, mut sink_rx) = futures::channel::mpsc::unbounded::<Message>();

        client.send_message(b"hello".to_vec());

        let pump_client = Arc::clone(&client);
        let pump = tokio::spawn(async move {
            let mut sink = sink_tx;
            let mut frames = rx;
            write_pump(&mut sink, &mut frames, &pump_client).await;
        });

        assert_eq!(
            sink_rx.next().await.unwrap(),
            Message::Text("hello".to_string())
        );

        // Hub-side close: the pump writes a close frame and exits.
        client.close_queue();
        assert!(matches!(sink_rx.next().await.unwrap(), Message::Close(_)));
        pump.await.unwrap();
    }

    #[tokio::test]
    async fn write_pump_sends_binary_for_non_utf8_payload() {
        let (client, rx) = test_client(8);
        let (sink_tx, mut sink_rx) = futures::channel::mpsc::unbounded::<Message>();

        client.send_message(vec![0xff, 0xfe]);

        let pump_client = Arc::clone(&client);
        tokio::spawn(async move {
            let mut sink = sink_tx;
            let mut frames = rx;
            write_pump(&mut sink, &mut frames, &pump_client).await;
        });

        assert_eq!(
            sink_rx.next().await.unwrap(),
            Message::Binary(vec![0xff, 0xfe])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn write_pump_pings_at_interval() {
        let config = crate::config::EngineConfig::builder()
            .ping_interval(Duration::from_secs(30))
            .build();
        let (client, rx) = client_with(config);
        let (sink_tx, mut sink_rx) = futures::channel::mpsc::unbounded::<Message>();

        let pump_client = Arc::clone(&client);
        tokio::spawn(async move {
            let mut sink = sink_tx;
            let mut frames = rx;
            write_pump(&mut sink, &mut frames, &pump_client).await;
        });

        for _ in 0..2 {
            let frame = sink_rx.next().await.unwrap();
            assert_eq!(frame, Message::Ping(PING_PAYLOAD.to_vec()));
        }
    }

    #[tokio::test]
    async fn read_pump_dispatches_data_frames() {
        let (client, _rx) = test_client(8);
        let (tx, mut stream) =
            futures::channel::mpsc::unbounded::<Result<Message, axum::Error>>();

        let seen: Arc<Mutex<Vec<(MessageKind, Vec<u8>)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let hooks = Arc::new(RwLock::new(EventHooks {
            on_message: Some(Arc::new(
                move |_client: &Arc<Client>, kind: MessageKind, data: &[u8]| {
                    sink.lock().unwrap().push((kind, data.to_vec()));
                },
            )),
            ..EventHooks::default()
        }));

        tx.unbounded_send(Ok(Message::Text("abc".to_string()))).unwrap();
        tx.unbounded_send(Ok(Message::Binary(vec![1, 2, 3]))).unwrap();
        drop(tx);

        read_pump(&mut stream, &client, &hooks).await;

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                (MessageKind::Text, b"abc".to_vec()),
                (MessageKind::Binary, vec![1, 2, 3]),
            ]
        );
    }

    #[tokio::test]
    async fn read_pump_closes_on_oversized_frame() {
        let config = crate::config::EngineConfig::builder().max_message_size(4).build();
        let (client, _rx) = client_with(config);
        let (tx, mut stream) =
            futures::channel::mpsc::unbounded::<Result<Message, axum::Error>>();

        let called = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&called);
        let hooks = Arc::new(RwLock::new(EventHooks {
            on_message: Some(Arc::new(
                move |_client: &Arc<Client>, _kind: MessageKind, _data: &[u8]| {
                    counter.fetch_add(1, Ordering::Relaxed);
                },
            )),
            ..EventHooks::default()
        }));

        tx.unbounded_send(Ok(Message::Text("way past the cap".to_string())))
            .unwrap();

        read_pump(&mut stream, &client, &hooks).await;
        assert_eq!(called.load(Ordering::Relaxed), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn read_pump_deadline_is_refreshed_by_pong() {
        let config = crate::config::EngineConfig::builder()
            .pong_wait(Duration::from_secs(60))
            .build();
        let (client, _rx) = client_with(config);
        let (tx, stream) = futures::channel::mpsc::unbounded::<Result<Message, axum::Error>>();
        let hooks = Arc::new(RwLock::new(EventHooks::default()));

        let pump_client = Arc::clone(&client);
        let pump = tokio::spawn(async move {
            let mut stream = stream;
            read_pump(&mut stream, &pump_client, &hooks).await;
        });
        settle().await;

        // A pong at t+50s pushes the deadline out to t+110s.
        tokio::time::advance(Duration::from_secs(50)).await;
        settle().await;
        tx.unbounded_send(Ok(Message::Pong(Vec::new()))).unwrap();
        settle().await;

        tokio::time::advance(Duration::from_secs(55)).await;
        settle().await;
        assert!(!pump.is_finished());

        // No further pong: the refreshed deadline expires.
        tokio::time::advance(Duration::from_secs(10)).await;
        pump.await.unwrap();
    }
}
