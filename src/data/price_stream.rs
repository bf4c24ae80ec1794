//! Live kline feed: one persistent combined-stream connection per shard.
//!
//! Symbols are partitioned so no connection exceeds the exchange's stream
//! limit. Each shard owns the `IngestionRouter` for its symbols and applies
//! messages one at a time, so per-symbol state has a single writer.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

use crate::config::{DF, WsConfig};
use crate::data::FeedError;
use crate::domain::PairInterval;
use crate::engine::IngestionRouter;
use crate::utils::now_timestamp_ms;

// ─── Transport seam ─────────────────────────────────────────────────────────

/// Frames the shard cares about. Binary and raw frames are dropped by the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum WireMessage {
    Text(String),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

#[async_trait]
pub trait FeedConnection: Send {
    /// None once the stream has ended.
    async fn recv(&mut self) -> Option<Result<WireMessage, FeedError>>;
    async fn send(&mut self, message: WireMessage) -> Result<(), FeedError>;
    async fn close(&mut self);
}

#[async_trait]
pub trait FeedTransport: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn FeedConnection>, FeedError>;
}

pub struct TungsteniteTransport;

struct TungsteniteConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl FeedTransport for TungsteniteTransport {
    async fn connect(&self, url: &str) -> Result<Box<dyn FeedConnection>, FeedError> {
        let (stream, _) = connect_async(url).await?;
        Ok(Box::new(TungsteniteConnection { stream }))
    }
}

#[async_trait]
impl FeedConnection for TungsteniteConnection {
    async fn recv(&mut self) -> Option<Result<WireMessage, FeedError>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(e.into())),
            };
            let wire = match message {
                Message::Text(text) => WireMessage::Text(text.as_str().to_owned()),
                Message::Ping(payload) => WireMessage::Ping(payload.to_vec()),
                Message::Pong(payload) => WireMessage::Pong(payload.to_vec()),
                Message::Close(_) => WireMessage::Close,
                Message::Binary(_) | Message::Frame(_) => continue,
            };
            return Some(Ok(wire));
        }
    }

    async fn send(&mut self, message: WireMessage) -> Result<(), FeedError> {
        let frame = match message {
            WireMessage::Text(text) => Message::Text(text.into()),
            WireMessage::Ping(payload) => Message::Ping(payload.into()),
            WireMessage::Pong(payload) => Message::Pong(payload.into()),
            WireMessage::Close => Message::Close(None),
        };
        self.stream.send(frame).await?;
        Ok(())
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            log::debug!("WebSocket close failed: {}", e);
        }
    }
}

// ─── Subscription layout ────────────────────────────────────────────────────

/// Splits `pairs` into groups of at most `max_per_connection` streams.
pub fn partition_symbols(pairs: &[PairInterval], max_per_connection: usize) -> Vec<Vec<PairInterval>> {
    pairs
        .chunks(max_per_connection.max(1))
        .map(<[PairInterval]>::to_vec)
        .collect()
}

pub fn build_combined_stream_url(base_url: &str, pairs: &[PairInterval]) -> String {
    let streams: Vec<String> = pairs.iter().map(PairInterval::stream_name).collect();
    format!("{}{}", base_url, streams.join("/"))
}

// ─── Heartbeat ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    SendPing,
    ForceReconnect,
}

/// Counts pings that went unanswered. Any pong resets the count.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    outstanding: u32,
    max_missed: u32,
}

impl HeartbeatMonitor {
    pub fn new(max_missed: u32) -> Self {
        Self {
            outstanding: 0,
            max_missed: max_missed.max(1),
        }
    }

    pub fn on_tick(&mut self) -> HeartbeatAction {
        if self.outstanding >= self.max_missed {
            HeartbeatAction::ForceReconnect
        } else {
            self.outstanding += 1;
            HeartbeatAction::SendPing
        }
    }

    pub fn on_ack(&mut self) {
        self.outstanding = 0;
    }

    pub fn missed(&self) -> u32 {
        self.outstanding
    }
}

// ─── Status board ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConnectionStatus {
    Connected,
    Connecting,
    Disconnected,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShardStatus {
    pub status: ConnectionStatus,
    pub symbols: usize,
    pub reconnects: u64,
    pub last_heartbeat_ack_ms: Option<i64>,
}

/// Shared snapshot of every shard's connection. Shards write their own entry only.
#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    inner: Arc<Mutex<HashMap<usize, ShardStatus>>>,
}

impl StatusBoard {
    fn update(&self, shard_id: usize, f: impl FnOnce(&mut ShardStatus)) {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = map.entry(shard_id).or_insert(ShardStatus {
            status: ConnectionStatus::Disconnected,
            symbols: 0,
            reconnects: 0,
            last_heartbeat_ack_ms: None,
        });
        f(entry);
    }

    pub fn snapshot(&self) -> HashMap<usize, ShardStatus> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Percentage of shards currently connected.
    pub fn connection_health(&self) -> f64 {
        let map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if map.is_empty() {
            return 0.0;
        }
        let connected = map
            .values()
            .filter(|s| s.status == ConnectionStatus::Connected)
            .count();
        (connected as f64 / map.len() as f64) * 100.0
    }
}

// ─── Shard ──────────────────────────────────────────────────────────────────

#[derive(Debug)]
enum SessionEnd {
    Shutdown,
    Closed,
    HeartbeatLost,
    Failed(FeedError),
}

pub struct ConnectionShard {
    id: usize,
    url: String,
    router: IngestionRouter,
    transport: Arc<dyn FeedTransport>,
    ws: WsConfig,
    board: StatusBoard,
    shutdown: watch::Receiver<bool>,
}

impl ConnectionShard {
    pub fn new(
        id: usize,
        url: String,
        router: IngestionRouter,
        transport: Arc<dyn FeedTransport>,
        ws: WsConfig,
        board: StatusBoard,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let symbols = router.symbols().count();
        board.update(id, |s| s.symbols = symbols);
        Self {
            id,
            url,
            router,
            transport,
            ws,
            board,
            shutdown,
        }
    }

    fn stopping(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Connects, streams and reconnects after a fixed delay until shutdown.
    /// Hands the router back so its counters can be reported.
    pub async fn run(mut self) -> IngestionRouter {
        let delay = Duration::from_secs(self.ws.reconnect_delay_sec);
        let connect_timeout = Duration::from_secs(self.ws.connect_timeout_sec.max(1));

        while !self.stopping() {
            self.board
                .update(self.id, |s| s.status = ConnectionStatus::Connecting);
            if DF.log_price_stream_updates {
                log::info!("Shard {}: connecting to {}", self.id, self.url);
            }

            // Bounded, and abandoned as soon as shutdown is requested
            let attempt = tokio::select! {
                attempt = tokio::time::timeout(connect_timeout, self.transport.connect(&self.url)) => attempt,
                _ = self.shutdown.changed() => break,
            };

            match attempt {
                Ok(Ok(connection)) => {
                    self.board
                        .update(self.id, |s| s.status = ConnectionStatus::Connected);
                    log::info!("Shard {}: connected", self.id);

                    match self.stream(connection).await {
                        SessionEnd::Shutdown => break,
                        SessionEnd::Closed => log::warn!("Shard {}: stream closed", self.id),
                        SessionEnd::HeartbeatLost => log::warn!(
                            "Shard {}: {} heartbeats unanswered, forcing reconnect",
                            self.id,
                            self.ws.max_missed_acks
                        ),
                        SessionEnd::Failed(e) => log::error!("Shard {}: {}", self.id, e),
                    }
                }
                Ok(Err(e)) => log::error!("Shard {}: connect failed: {}", self.id, e),
                Err(_) => log::error!(
                    "Shard {}: connect timed out after {:?}",
                    self.id,
                    connect_timeout
                ),
            }

            self.board.update(self.id, |s| {
                s.status = ConnectionStatus::Disconnected;
                s.reconnects += 1;
            });

            // Fixed delay, cut short by shutdown
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = self.shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        self.board
            .update(self.id, |s| s.status = ConnectionStatus::Disconnected);
        log::info!("Shard {}: stopped ({:?})", self.id, self.router.stats());
        self.router
    }

    async fn stream(&mut self, mut connection: Box<dyn FeedConnection>) -> SessionEnd {
        let mut heartbeat = HeartbeatMonitor::new(self.ws.max_missed_acks);
        let mut ping = tokio::time::interval(Duration::from_secs(self.ws.heartbeat_interval_sec.max(1)));
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ping.tick().await; // arm

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.changed() => {
                    if let Err(e) = connection.send(WireMessage::Close).await {
                        log::debug!("Shard {}: close frame not sent: {}", self.id, e);
                    }
                    connection.close().await;
                    return SessionEnd::Shutdown;
                }
                _ = ping.tick() => match heartbeat.on_tick() {
                    HeartbeatAction::SendPing => {
                        if let Err(e) = connection.send(WireMessage::Ping(Vec::new())).await {
                            return SessionEnd::Failed(e);
                        }
                    }
                    HeartbeatAction::ForceReconnect => {
                        connection.close().await;
                        return SessionEnd::HeartbeatLost;
                    }
                },
                message = connection.recv() => match message {
                    Some(Ok(WireMessage::Text(text))) => self.dispatch(&text),
                    Some(Ok(WireMessage::Ping(payload))) => {
                        if let Err(e) = connection.send(WireMessage::Pong(payload)).await {
                            return SessionEnd::Failed(e);
                        }
                    }
                    Some(Ok(WireMessage::Pong(_))) => {
                        heartbeat.on_ack();
                        self.board
                            .update(self.id, |s| s.last_heartbeat_ack_ms = Some(now_timestamp_ms()));
                    }
                    Some(Ok(WireMessage::Close)) | None => return SessionEnd::Closed,
                    Some(Err(e)) => return SessionEnd::Failed(e),
                },
            }
        }
    }

    /// A panic while handling one message is logged and counted; the shard keeps going.
    fn dispatch(&mut self, text: &str) {
        let router = &mut self.router;
        match catch_unwind(AssertUnwindSafe(|| router.handle_text(text))) {
            Ok(events) => {
                if DF.log_price_stream_updates && !events.is_empty() {
                    log::info!("Shard {}: {} alerts emitted", self.id, events.len());
                }
            }
            Err(payload) => {
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                log::error!("Shard {}: handler panicked: {}", self.id, reason);
                self.router.record_panic();
            }
        }
    }
}
