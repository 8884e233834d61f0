// ===============================
// src/feed.rs
// ===============================
//
// Per-venue WebSocket connection: connect + subscription handshake, message
// loop, heartbeat task, reconnect with exponential backoff. One connection
// per venue; venues never block each other. Transport loss is never fatal --
// the connection re-enters the backoff protocol until shutdown.
//
use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::domain::{now_ns, Quote};
use crate::metrics::{WS_CONNECTED, WS_RECONNECTS};
use crate::normalize;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState { Disconnected, Connecting, Connected, Reconnecting }

/// Wire protocol spoken by a venue feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedKind {
    /// Binance-style: subscription is encoded in the stream path, frames are
    /// two-sided bookTicker payloads.
    BookTicker,
    /// Hyperliquid-style: explicit subscribe frame, allMids mid-only frames.
    AllMids,
}

#[derive(Debug, Clone)]
pub struct FeedCfg {
    pub venue: String,
    pub kind: FeedKind,
    pub ws_url: String,
    pub symbols: Vec<String>,
    /// 0 disables the keep-alive task.
    pub heartbeat_secs: u64,
    pub reconnect_base_secs: u64,
    pub reconnect_cap_secs: u64,
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("bad websocket url: {0}")]
    BadUrl(#[from] url::ParseError),
    #[error("websocket transport: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Backoff schedule: base * 2^attempt, capped. For base 1 / cap 60 this is
/// 1, 2, 4, 8, 16, 32, 60, 60, ...
pub fn backoff_delay(base_secs: u64, cap_secs: u64, attempt: u32) -> u64 {
    let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    base_secs.saturating_mul(factor).min(cap_secs)
}

pub struct FeedConnection {
    cfg: FeedCfg,
    state: ConnectionState,
    sink: Option<Arc<Mutex<WsSink>>>,
    stream: Option<WsSource>,
    heartbeat: Option<JoinHandle<()>>,
}

impl FeedConnection {
    pub fn new(cfg: FeedCfg) -> Self {
        Self { cfg, state: ConnectionState::Disconnected, sink: None, stream: None, heartbeat: None }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn venue(&self) -> &str {
        &self.cfg.venue
    }

    /// Stream endpoint for the venue. bookTicker venues carry the whole
    /// subscription in the path; allMids venues subscribe after connecting.
    fn endpoint(&self) -> String {
        match self.cfg.kind {
            FeedKind::BookTicker => {
                let streams: Vec<String> = self
                    .cfg
                    .symbols
                    .iter()
                    .map(|s| format!("{}usdt@bookTicker", s.to_lowercase()))
                    .collect();
                format!("{}/{}", self.cfg.ws_url.trim_end_matches('/'), streams.join("/"))
            }
            FeedKind::AllMids => self.cfg.ws_url.clone(),
        }
    }

    fn subscribe_frame(&self) -> Option<String> {
        match self.cfg.kind {
            FeedKind::BookTicker => None,
            FeedKind::AllMids => {
                Some(r#"{"method":"subscribe","subscription":{"type":"allMids"}}"#.to_string())
            }
        }
    }

    /// Single connect attempt: Disconnected/Reconnecting -> Connecting ->
    /// Connected (heartbeat started), or back to Disconnected on failure.
    /// Does not retry -- that is the supervisor's call.
    pub async fn connect(&mut self) -> Result<(), FeedError> {
        self.state = ConnectionState::Connecting;
        match self.open().await {
            Ok(()) => {
                self.state = ConnectionState::Connected;
                WS_CONNECTED.with_label_values(&[&self.cfg.venue]).set(1);
                self.spawn_heartbeat();
                info!(venue = %self.cfg.venue, url = %self.cfg.ws_url, "feed connected");
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                self.sink = None;
                self.stream = None;
                Err(e)
            }
        }
    }

    async fn open(&mut self) -> Result<(), FeedError> {
        let url = Url::parse(&self.endpoint())?;
        let (ws, _resp) = connect_async(url).await?;
        let (mut sink, stream) = ws.split();
        if let Some(frame) = self.subscribe_frame() {
            sink.send(Message::Text(frame)).await?;
            debug!(venue = %self.cfg.venue, "subscription handshake sent");
        }
        self.sink = Some(Arc::new(Mutex::new(sink)));
        self.stream = Some(stream);
        Ok(())
    }

    fn spawn_heartbeat(&mut self) {
        if self.cfg.heartbeat_secs == 0 {
            return;
        }
        let Some(sink) = self.sink.clone() else { return };
        let venue = self.cfg.venue.clone();
        let secs = self.cfg.heartbeat_secs;
        self.heartbeat = Some(tokio::spawn(async move {
            loop {
                sleep(Duration::from_secs(secs)).await;
                let mut s = sink.lock().await;
                if let Err(e) = s.send(Message::Text(r#"{"method":"ping"}"#.to_string())).await {
                    // The message loop owns close detection; just stop pinging.
                    debug!(%venue, ?e, "heartbeat send failed, task ending");
                    break;
                }
                debug!(%venue, "heartbeat ping sent");
            }
        }));
    }

    /// Safe from any state: cancels heartbeat, closes the transport.
    pub async fn disconnect(&mut self) {
        if let Some(hb) = self.heartbeat.take() {
            hb.abort();
        }
        if let Some(sink) = self.sink.take() {
            let _ = sink.lock().await.send(Message::Close(None)).await;
        }
        self.stream = None;
        self.state = ConnectionState::Disconnected;
        WS_CONNECTED.with_label_values(&[&self.cfg.venue]).set(0);
        info!(venue = %self.cfg.venue, "feed disconnected");
    }

    fn normalize(&self, txt: &str) -> Vec<Quote> {
        let now = now_ns();
        match self.cfg.kind {
            FeedKind::BookTicker => {
                normalize::book_ticker(&self.cfg.venue, txt, &self.cfg.symbols, now)
                    .into_iter()
                    .collect()
            }
            FeedKind::AllMids => normalize::all_mids(&self.cfg.venue, txt, &self.cfg.symbols, now),
        }
    }

    // Connection lost: keep-alive is moot, transport handles are dead.
    fn on_connection_lost(&mut self) {
        if let Some(hb) = self.heartbeat.take() {
            hb.abort();
        }
        self.sink = None;
        self.state = ConnectionState::Reconnecting;
        WS_CONNECTED.with_label_values(&[&self.cfg.venue]).set(0);
    }

    /// Backoff loop; returns false when shutdown interrupted it. Only ever
    /// one in flight: the run loop is the sole caller.
    async fn reconnect(&mut self, shutdown: &mut watch::Receiver<bool>) -> bool {
        self.state = ConnectionState::Reconnecting;
        let mut attempt: u32 = 0;
        loop {
            let delay = backoff_delay(self.cfg.reconnect_base_secs, self.cfg.reconnect_cap_secs, attempt);
            info!(venue = %self.cfg.venue, delay_secs = delay, "reconnecting after backoff");
            tokio::select! {
                _ = shutdown.changed() => return false,
                _ = sleep(Duration::from_secs(delay)) => {}
            }
            match self.connect().await {
                Ok(()) => {
                    WS_RECONNECTS.with_label_values(&[&self.cfg.venue]).inc();
                    return true;
                }
                Err(e) => {
                    error!(venue = %self.cfg.venue, ?e, "reconnect attempt failed");
                    self.state = ConnectionState::Reconnecting;
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }

    /// Message loop + reconnect supervision until shutdown.
    pub async fn run(mut self, quote_tx: mpsc::Sender<Quote>, mut shutdown: watch::Receiver<bool>) {
        'outer: loop {
            if self.state != ConnectionState::Connected {
                if !self.reconnect(&mut shutdown).await {
                    break;
                }
            }
            let Some(mut stream) = self.stream.take() else {
                self.on_connection_lost();
                continue;
            };

            loop {
                tokio::select! {
                    _ = shutdown.changed() => break 'outer,
                    frame = stream.next() => match frame {
                        Some(Ok(Message::Text(txt))) => {
                            // A bad frame is dropped, never a reason to drop
                            // the connection.
                            for q in self.normalize(&txt) {
                                if quote_tx.send(q).await.is_err() {
                                    warn!(venue = %self.cfg.venue, "quote channel closed");
                                    break 'outer;
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            warn!(venue = %self.cfg.venue, "feed closed by peer");
                            break;
                        }
                        Some(Ok(_)) => {} // ping/pong/binary -- ignore
                        Some(Err(e)) => {
                            error!(venue = %self.cfg.venue, ?e, "websocket read error");
                            break;
                        }
                    }
                }
            }
            self.on_connection_lost();
        }
        self.disconnect().await;
    }
}

/// Supervisor task for one venue: initial connect (no auto-retry inside
/// `connect`; failure here just logs and falls through to the reconnect
/// protocol), then the message loop.
pub fn spawn(
    cfg: FeedCfg,
    quote_tx: mpsc::Sender<Quote>,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut conn = FeedConnection::new(cfg);
        if let Err(e) = conn.connect().await {
            error!(venue = %conn.venue(), ?e, "initial connect failed, entering reconnect");
        }
        conn.run(quote_tx, shutdown).await;
    })
}
