#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Reconnecting push-channel client.
//!
//! [`LiveUpdateChannel::spawn`] starts a background task that keeps a
//! WebSocket open to the backend, answers heartbeats, and forwards
//! application messages as [`LiveEvent`]s. When the connection drops it
//! reconnects after a fixed delay, up to a bounded number of consecutive
//! attempts; a successful connection resets the count. Once the attempts
//! are exhausted the task emits [`LiveEvent::GaveUp`] and stops.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use signal_map_live_models::{ClientMessage, ServerMessage, payload_len};
use signal_map_signal_models::{FilterSet, Point};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

/// Capacity of the event channel handed to the consumer.
const EVENT_BUFFER: usize = 256;

/// Errors raised inside a push-channel session.
#[derive(Debug, thiserror::Error)]
pub enum LiveError {
    /// WebSocket transport failure.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] Box<tokio_tungstenite::tungstenite::Error>),

    /// Outgoing message could not be encoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The server closed the connection.
    #[error("connection closed by server")]
    Closed,
}

impl From<tokio_tungstenite::tungstenite::Error> for LiveError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(e))
    }
}

/// Push-channel settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// WebSocket endpoint, e.g. `ws://localhost:8000/api/ws/signals`.
    pub url: String,
    /// Consecutive failed (re)connection attempts before giving up.
    pub max_reconnect_attempts: u32,
    /// Fixed delay between reconnection attempts.
    pub reconnect_delay_ms: u64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8000/api/ws/signals".to_owned(),
            max_reconnect_attempts: 5,
            reconnect_delay_ms: 3000,
        }
    }
}

impl LiveConfig {
    #[must_use]
    pub const fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

/// Out-of-band notifications for the load coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    /// The channel is open.
    Connected,
    /// The channel dropped; a reconnect may follow.
    Disconnected,
    /// New data is available upstream; reload in append mode.
    Update,
    /// A single new point to append directly.
    NewSignal(Point),
    /// Reconnect attempts are exhausted; the channel stays offline.
    GaveUp,
}

/// What to do in response to one incoming text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Reaction {
    /// Send this message back to the server.
    Reply(ClientMessage),
    /// Forward this event to the consumer.
    Emit(LiveEvent),
    /// Nothing to do.
    Ignore,
}

/// Maps one incoming text frame onto a [`Reaction`].
///
/// A `ping` yields exactly one `pong` reply and nothing else. Malformed
/// frames and `new_signal` payloads without a position are dropped with
/// a log.
#[must_use]
pub fn react(text: &str) -> Reaction {
    let message: ServerMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            log::warn!("Dropping malformed push message: {e}");
            return Reaction::Ignore;
        }
    };

    match message {
        ServerMessage::Ping { .. } => Reaction::Reply(ClientMessage::Pong),
        ServerMessage::Connected => Reaction::Emit(LiveEvent::Connected),
        ServerMessage::Disconnected => Reaction::Emit(LiveEvent::Disconnected),
        ServerMessage::Update { data, .. } => {
            log::debug!("Push update hint ({:?} items)", payload_len(&data));
            Reaction::Emit(LiveEvent::Update)
        }
        ServerMessage::NewSignal { data } => match data.into_point() {
            Some(point) => Reaction::Emit(LiveEvent::NewSignal(point)),
            None => {
                log::warn!("Dropping new_signal without a position");
                Reaction::Ignore
            }
        },
        ServerMessage::Initial { data } => {
            log::debug!("Ignoring initial snapshot ({:?} items)", payload_len(&data));
            Reaction::Ignore
        }
        ServerMessage::Error { message } => {
            log::warn!("Push channel error from server: {}", message.unwrap_or_default());
            Reaction::Ignore
        }
        ServerMessage::Unknown => {
            log::debug!("Ignoring push message of unknown type");
            Reaction::Ignore
        }
    }
}

/// Handle to a running push channel.
///
/// Dropping the handle (or calling [`LiveHandle::shutdown`]) stops the
/// background task.
#[derive(Debug)]
pub struct LiveHandle {
    outgoing: mpsc::UnboundedSender<ClientMessage>,
    connected: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl LiveHandle {
    /// Whether the WebSocket is currently open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Queues a message for the server. Returns `false` when the channel
    /// is not connected or the task has stopped; the message is dropped.
    pub fn send(&self, message: ClientMessage) -> bool {
        if !self.is_connected() {
            log::warn!("Push channel not connected, dropping {message:?}");
            return false;
        }
        self.outgoing.send(message).is_ok()
    }

    /// Asks the server to push a refresh for `filters`.
    pub fn request_refresh(&self, filters: &FilterSet) -> bool {
        self.send(ClientMessage::refresh(filters))
    }

    /// Stops the background task.
    pub fn shutdown(&self) {
        self.connected.store(false, Ordering::Release);
        self.task.abort();
    }
}

impl Drop for LiveHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Entry point for the push channel.
pub struct LiveUpdateChannel;

impl LiveUpdateChannel {
    /// Spawns the connection task on the current tokio runtime.
    ///
    /// Returns the control handle and the event stream.
    #[must_use]
    pub fn spawn(config: LiveConfig) -> (LiveHandle, mpsc::Receiver<LiveEvent>) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(false));

        let task = tokio::spawn(run(config, event_tx, outgoing_rx, connected.clone()));

        (
            LiveHandle {
                outgoing: outgoing_tx,
                connected,
                task,
            },
            event_rx,
        )
    }
}

/// How a connected session ended.
enum SessionEnd {
    /// The consumer went away; stop for good.
    Shutdown,
    /// The connection dropped; reconnect.
    Dropped(LiveError),
}

async fn run(
    config: LiveConfig,
    events: mpsc::Sender<LiveEvent>,
    mut outgoing: mpsc::UnboundedReceiver<ClientMessage>,
    connected: Arc<AtomicBool>,
) {
    let mut attempts = 0u32;

    loop {
        match tokio_tungstenite::connect_async(config.url.as_str()).await {
            Ok((stream, _response)) => {
                attempts = 0;
                connected.store(true, Ordering::Release);
                log::info!("Push channel connected to {}", config.url);

                if events.send(LiveEvent::Connected).await.is_err() {
                    return;
                }

                let end = session(stream, &events, &mut outgoing, &connected).await;
                connected.store(false, Ordering::Release);

                match end {
                    SessionEnd::Shutdown => return,
                    SessionEnd::Dropped(e) => {
                        log::warn!("Push channel disconnected: {e}");
                        if events.send(LiveEvent::Disconnected).await.is_err() {
                            return;
                        }
                    }
                }
            }
            Err(e) => {
                log::warn!("Push channel connect to {} failed: {e}", config.url);
            }
        }

        if attempts >= config.max_reconnect_attempts {
            log::error!(
                "Push channel: max reconnect attempts ({}) reached, staying offline",
                config.max_reconnect_attempts
            );
            events.send(LiveEvent::GaveUp).await.ok();
            return;
        }

        attempts += 1;
        log::info!(
            "Reconnecting push channel... attempt {attempts}/{} in {:?}",
            config.max_reconnect_attempts,
            config.reconnect_delay()
        );
        tokio::time::sleep(config.reconnect_delay()).await;

        // Drain anything queued while offline; it was addressed to a dead
        // session.
        while outgoing.try_recv().is_ok() {}
    }
}

async fn session<S>(
    stream: WebSocketStream<S>,
    events: &mpsc::Sender<LiveEvent>,
    outgoing: &mut mpsc::UnboundedReceiver<ClientMessage>,
    connected: &AtomicBool,
) -> SessionEnd
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut sink, mut source) = stream.split();

    loop {
        tokio::select! {
            incoming = source.next() => {
                let text = match incoming {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => {
                        return SessionEnd::Dropped(LiveError::Closed);
                    }
                    // Transport-level ping/pong frames are answered by
                    // tungstenite itself.
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return SessionEnd::Dropped(e.into()),
                };

                match react(&text) {
                    Reaction::Reply(reply) => {
                        if let Err(e) = send_message(&mut sink, &reply).await {
                            return SessionEnd::Dropped(e);
                        }
                    }
                    Reaction::Emit(event) => {
                        match event {
                            LiveEvent::Connected => connected.store(true, Ordering::Release),
                            LiveEvent::Disconnected => connected.store(false, Ordering::Release),
                            _ => {}
                        }
                        if events.send(event).await.is_err() {
                            return SessionEnd::Shutdown;
                        }
                    }
                    Reaction::Ignore => {}
                }
            }
            queued = outgoing.recv() => {
                let Some(message) = queued else {
                    sink.close().await.ok();
                    return SessionEnd::Shutdown;
                };
                if let Err(e) = send_message(&mut sink, &message).await {
                    return SessionEnd::Dropped(e);
                }
            }
        }
    }
}

async fn send_message<K>(sink: &mut K, message: &ClientMessage) -> Result<(), LiveError>
where
    K: futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let text = serde_json::to_string(message)?;
    sink.send(Message::Text(text)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;

    fn config(url: String) -> LiveConfig {
        LiveConfig {
            url,
            max_reconnect_attempts: 2,
            reconnect_delay_ms: 10,
        }
    }

    async fn next_text<S>(ws: &mut WebSocketStream<S>) -> String
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return text,
                Some(Ok(_)) => {}
                other => panic!("unexpected frame: {other:?}"),
            }
        }
    }

    #[test]
    fn ping_yields_exactly_one_pong() {
        assert_eq!(
            react(r#"{"type":"ping","timestamp":3.0}"#),
            Reaction::Reply(ClientMessage::Pong)
        );
    }

    #[test]
    fn update_and_new_signal_are_emitted() {
        assert_eq!(
            react(r#"{"type":"update","data":[]}"#),
            Reaction::Emit(LiveEvent::Update)
        );

        let Reaction::Emit(LiveEvent::NewSignal(point)) = react(
            r#"{"type":"new_signal","data":{"latitude":-17.8,"longitude":-63.1,"sim_operator":"VIVA"}}"#,
        ) else {
            panic!("expected new_signal event");
        };
        assert_eq!(point.operator, "VIVA");
    }

    #[test]
    fn malformed_and_unusable_messages_are_ignored() {
        assert_eq!(react("{not json"), Reaction::Ignore);
        assert_eq!(react(r#"{"no_type":true}"#), Reaction::Ignore);
        assert_eq!(
            react(r#"{"type":"new_signal","data":{"signal":-70}}"#),
            Reaction::Ignore
        );
        assert_eq!(react(r#"{"type":"initial","data":[1,2]}"#), Reaction::Ignore);
        assert_eq!(
            react(r#"{"type":"error","message":"Invalid JSON"}"#),
            Reaction::Ignore
        );
    }

    #[tokio::test]
    async fn answers_ping_over_the_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.send(Message::Text(r#"{"type":"ping"}"#.to_owned()))
                .await
                .unwrap();
            next_text(&mut ws).await
        });

        let (handle, mut events) = LiveUpdateChannel::spawn(config(format!("ws://{addr}")));
        assert_eq!(events.recv().await, Some(LiveEvent::Connected));

        let reply = server.await.unwrap();
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&reply).unwrap(),
            serde_json::json!({ "action": "pong" })
        );
        handle.shutdown();
    }

    #[tokio::test]
    async fn forwards_events_and_refresh_requests() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.send(Message::Text(
                r#"{"type":"new_signal","data":{"latitud":1.0,"longitud":2.0,"empresa":"TIGO"}}"#
                    .to_owned(),
            ))
            .await
            .unwrap();
            ws.send(Message::Text(r#"{"type":"update","data":[{}]}"#.to_owned()))
                .await
                .unwrap();
            next_text(&mut ws).await
        });

        let (handle, mut events) = LiveUpdateChannel::spawn(config(format!("ws://{addr}")));
        assert_eq!(events.recv().await, Some(LiveEvent::Connected));
        assert!(handle.is_connected());

        let Some(LiveEvent::NewSignal(point)) = events.recv().await else {
            panic!("expected new_signal");
        };
        assert_eq!(point.operator, "TIGO");
        assert_eq!(events.recv().await, Some(LiveEvent::Update));

        let filters = FilterSet::new().with(
            signal_map_signal_models::FilterCategory::Company,
            ["ENTEL"],
        );
        assert!(handle.request_refresh(&filters));

        let request = server.await.unwrap();
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&request).unwrap(),
            serde_json::json!({ "action": "refresh", "filters": { "empresas": ["ENTEL"] } })
        );
        handle.shutdown();
    }

    #[tokio::test]
    async fn reconnects_after_drop_then_gives_up() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            for _ in 0..2 {
                let (stream, _) = listener.accept().await.unwrap();
                let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                ws.close(None).await.ok();
            }
            // Listener dropped here: later connects are refused.
        });

        let (handle, mut events) = LiveUpdateChannel::spawn(config(format!("ws://{addr}")));

        assert_eq!(events.recv().await, Some(LiveEvent::Connected));
        assert_eq!(events.recv().await, Some(LiveEvent::Disconnected));
        // Second connection succeeds and resets the attempt counter.
        assert_eq!(events.recv().await, Some(LiveEvent::Connected));
        assert_eq!(events.recv().await, Some(LiveEvent::Disconnected));

        server.await.unwrap();
        assert_eq!(events.recv().await, Some(LiveEvent::GaveUp));
        assert_eq!(events.recv().await, None);
        assert!(!handle.is_connected());
    }

    #[tokio::test]
    async fn send_while_offline_is_rejected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (handle, mut events) = LiveUpdateChannel::spawn(LiveConfig {
            url: format!("ws://{addr}"),
            max_reconnect_attempts: 0,
            reconnect_delay_ms: 1,
        });

        assert_eq!(events.recv().await, Some(LiveEvent::GaveUp));
        assert!(!handle.send(ClientMessage::Pong));
    }
}
