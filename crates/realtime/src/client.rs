use crate::channel::{ChannelBuilder, HandlerRegistry, Subscription};
use crate::error::RealtimeError;
use crate::message::{ChannelEvent, Payload, RealtimeMessage};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, trace, warn};
use rand::Rng;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// 接続状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// RealtimeClient設定オプション
#[derive(Debug, Clone)]
pub struct RealtimeClientOptions {
    pub auto_reconnect: bool,
    /// `None` retries forever.
    pub max_reconnect_attempts: Option<u32>,
    /// Milliseconds before the first reconnect attempt.
    pub reconnect_interval: u64,
    pub reconnect_backoff_factor: f64,
    pub max_reconnect_interval: u64,
    pub heartbeat_interval: u64,
}

impl Default for RealtimeClientOptions {
    fn default() -> Self {
        Self {
            auto_reconnect: true,
            max_reconnect_attempts: Some(5),
            reconnect_interval: 1000,     // 1 second
            reconnect_backoff_factor: 1.5,
            max_reconnect_interval: 30000, // 30 seconds
            heartbeat_interval: 30000,     // 30 seconds
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// State shared between the client handle and its socket tasks.
#[derive(Clone)]
struct SocketContext {
    url: String,
    options: RealtimeClientOptions,
    socket: Arc<RwLock<Option<mpsc::UnboundedSender<Message>>>>,
    state: Arc<RwLock<ConnectionState>>,
    state_change: broadcast::Sender<ConnectionState>,
    registry: Arc<HandlerRegistry>,
    is_manually_closed: Arc<AtomicBool>,
    access_token: Arc<tokio::sync::RwLock<Option<String>>>,
    reconnect_attempts: Arc<AtomicU32>,
}

/// Realtimeクライアント本体
///
/// Cloning is cheap and every clone drives the same connection.
#[derive(Clone)]
pub struct RealtimeClient {
    ctx: SocketContext,
    memberships: Arc<Mutex<HashMap<String, usize>>>,
    supervisor: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl RealtimeClient {
    /// デフォルトオプションで新しいクライアントを作成
    pub fn new(url: &str) -> Self {
        Self::new_with_options(url, RealtimeClientOptions::default())
    }

    /// カスタムオプションで新しいクライアントを作成
    pub fn new_with_options(url: &str, options: RealtimeClientOptions) -> Self {
        let (state_change_tx, _) = broadcast::channel(16);
        Self {
            ctx: SocketContext {
                url: url.to_string(),
                options,
                socket: Arc::new(RwLock::new(None)),
                state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
                state_change: state_change_tx,
                registry: Arc::new(HandlerRegistry::default()),
                is_manually_closed: Arc::new(AtomicBool::new(false)),
                access_token: Arc::new(tokio::sync::RwLock::new(None)),
                reconnect_attempts: Arc::new(AtomicU32::new(0)),
            },
            memberships: Arc::new(Mutex::new(HashMap::new())),
            supervisor: Arc::new(Mutex::new(None)),
        }
    }

    pub fn url(&self) -> &str {
        &self.ctx.url
    }

    pub fn options(&self) -> &RealtimeClientOptions {
        &self.ctx.options
    }

    /// Sets the token sent with the next connection attempt.
    pub async fn set_auth(&self, token: Option<String>) {
        info!("Setting auth token (is_some: {})", token.is_some());
        *self.ctx.access_token.write().await = token;
    }

    pub async fn access_token(&self) -> Option<String> {
        self.ctx.access_token.read().await.clone()
    }

    /// 接続状態変更の通知を受け取るためのレシーバーを取得
    pub fn on_state_change(&self) -> broadcast::Receiver<ConnectionState> {
        self.ctx.state_change.subscribe()
    }

    /// Registers a scoped handler that sees every connection state transition.
    pub fn on_connection_state<F>(&self, callback: F) -> Subscription
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        Subscription::state(&self.ctx.registry, Box::new(callback))
    }

    /// 現在の接続状態を取得
    pub fn connection_state(&self) -> ConnectionState {
        *read(&self.ctx.state)
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    /// Reconnect attempts made since the last successful connection.
    pub fn reconnect_attempts(&self) -> u32 {
        self.ctx.reconnect_attempts.load(Ordering::SeqCst)
    }

    /// 特定のオークションに対するチャンネルビルダーを作成
    pub fn channel(&self, auction_id: &str) -> ChannelBuilder {
        debug!("Creating channel builder for auction: {}", auction_id);
        ChannelBuilder::new(self, auction_id)
    }

    pub(crate) fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.ctx.registry
    }

    /// Opens the connection and keeps it alive in a background task.
    ///
    /// Any previous connection is closed first. Returns once the first
    /// handshake has succeeded; later drops are handled by the background
    /// task according to the reconnect options.
    pub async fn connect(&self) -> Result<(), RealtimeError> {
        info!("connect() called");
        self.shutdown();
        self.ctx.is_manually_closed.store(false, Ordering::SeqCst);

        self.ctx.set_state(ConnectionState::Connecting);
        let stream = match self.ctx.open().await {
            Ok(stream) => stream,
            Err(e) => {
                error!("WebSocket connection failed: {}", e);
                self.ctx.set_state(ConnectionState::Disconnected);
                return Err(e);
            }
        };

        let ctx = self.ctx.clone();
        let handle = tokio::spawn(async move { ctx.supervise(stream).await });
        *lock(&self.supervisor) = Some(handle);
        debug!("connect() returning, socket tasks running in background");
        Ok(())
    }

    /// 切断処理
    ///
    /// Closes the connection without reconnecting. Registered handlers and
    /// channel memberships are kept so a later `connect` picks them up.
    pub async fn disconnect(&self) -> Result<(), RealtimeError> {
        info!("disconnect() called");
        self.shutdown();
        Ok(())
    }

    fn shutdown(&self) {
        self.ctx.is_manually_closed.store(true, Ordering::SeqCst);
        if let Some(socket_tx) = write(&self.ctx.socket).take() {
            // Best effort close frame; the writer may already be gone.
            let _ = socket_tx.send(Message::Close(None));
            debug!("Socket sender dropped");
        }
        if let Some(handle) = lock(&self.supervisor).take() {
            handle.abort();
        }
        self.ctx.set_state(ConnectionState::Disconnected);
    }

    /// Sends one frame to the server.
    pub fn emit(
        &self,
        event: ChannelEvent,
        payload: serde_json::Value,
    ) -> Result<(), RealtimeError> {
        self.ctx.send(RealtimeMessage::new(event, payload))
    }

    /// Records interest in an auction channel and emits `join_auction`.
    ///
    /// The membership is recorded even when the emit fails because the
    /// socket is down; [`RealtimeClient::rejoin`] re-sends it later.
    pub fn join(&self, auction_id: &str) -> Result<(), RealtimeError> {
        *lock(&self.memberships)
            .entry(auction_id.to_string())
            .or_insert(0) += 1;
        self.emit(ChannelEvent::JoinAuction, json!({ "auctionId": auction_id }))
    }

    /// Re-emits `join_auction` for a channel that is still joined locally.
    pub fn rejoin(&self, auction_id: &str) -> Result<(), RealtimeError> {
        if !lock(&self.memberships).contains_key(auction_id) {
            return Err(RealtimeError::ChannelError(format!(
                "auction {} was never joined",
                auction_id
            )));
        }
        self.emit(ChannelEvent::JoinAuction, json!({ "auctionId": auction_id }))
    }

    /// Drops one membership and emits `leave_auction` once nobody needs the channel.
    pub fn leave(&self, auction_id: &str) -> Result<(), RealtimeError> {
        {
            let mut memberships = lock(&self.memberships);
            match memberships.get_mut(auction_id) {
                Some(count) if *count > 1 => {
                    *count -= 1;
                    return Ok(());
                }
                Some(_) => {
                    memberships.remove(auction_id);
                }
                None => return Ok(()),
            }
        }
        match self.emit(ChannelEvent::LeaveAuction, json!({ "auctionId": auction_id })) {
            // Nothing to leave on a closed socket.
            Err(RealtimeError::NotConnected) => Ok(()),
            other => other,
        }
    }

    pub fn joined_auctions(&self) -> Vec<String> {
        lock(&self.memberships).keys().cloned().collect()
    }
}

impl SocketContext {
    fn set_state(&self, state: ConnectionState) {
        {
            let mut current = write(&self.state);
            if *current == state {
                trace!("Client state already {:?}, not changing.", state);
                return;
            }
            if state != ConnectionState::Disconnected && self.is_manually_closed.load(Ordering::SeqCst) {
                debug!("Ignoring {:?} after manual close", state);
                return;
            }
            info!("Client state changing from {:?} to {:?}", *current, state);
            *current = state;
        }
        // No receivers is fine.
        let _ = self.state_change.send(state);
        self.registry.dispatch_state(state);
    }

    async fn socket_url(&self) -> Result<Url, RealtimeError> {
        let mut url = Url::parse(&self.url)?;
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            s => {
                return Err(RealtimeError::ConnectionError(format!(
                    "Unsupported URL scheme: {}",
                    s
                )))
            }
        };
        url.set_scheme(scheme).map_err(|_| {
            RealtimeError::ConnectionError(format!("Cannot use scheme {} for {}", scheme, self.url))
        })?;
        if let Some(token) = self.access_token.read().await.as_ref() {
            url.query_pairs_mut().append_pair("token", token);
        }
        Ok(url)
    }

    async fn open(&self) -> Result<WsStream, RealtimeError> {
        let url = self.socket_url().await?;
        debug!("Attempting to connect to WebSocket at {}", url.host_str().unwrap_or_default());
        let (stream, response) = connect_async(url.as_str()).await?;
        info!("WebSocket connection successful (status {})", response.status());
        Ok(stream)
    }

    fn send(&self, message: RealtimeMessage) -> Result<(), RealtimeError> {
        let text = serde_json::to_string(&message)?;
        trace!("Client sending frame: {}", text);
        match read(&self.socket).as_ref() {
            Some(socket_tx) => socket_tx.send(Message::Text(text)).map_err(|e| {
                RealtimeError::ConnectionError(format!("Failed to queue frame: {}", e))
            }),
            None => {
                warn!("Cannot send {}, socket unavailable", message.event);
                Err(RealtimeError::NotConnected)
            }
        }
    }

    /// Runs sockets back to back until a manual close or until reconnecting gives up.
    async fn supervise(self, first: WsStream) {
        let mut next = Some(first);
        while let Some(stream) = next.take() {
            self.reconnect_attempts.store(0, Ordering::SeqCst);
            self.run_socket(stream).await;

            if self.is_manually_closed.load(Ordering::SeqCst) {
                break;
            }
            if !self.options.auto_reconnect {
                self.set_state(ConnectionState::Disconnected);
                break;
            }
            next = self.reconnect().await;
            if next.is_none() {
                self.set_state(ConnectionState::Disconnected);
            }
        }
        debug!("Supervisor finished");
    }

    async fn reconnect(&self) -> Option<WsStream> {
        self.set_state(ConnectionState::Reconnecting);
        let mut interval = self.options.reconnect_interval;
        loop {
            if self.is_manually_closed.load(Ordering::SeqCst) {
                debug!("Manual disconnect requested, stopping reconnect attempts.");
                return None;
            }
            let attempt = self.reconnect_attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(max_attempts) = self.options.max_reconnect_attempts {
                if attempt > max_attempts {
                    warn!("Max reconnect attempts ({}) reached.", max_attempts);
                    return None;
                }
            }

            let jitter = rand::thread_rng().gen_range(0..=interval / 10);
            sleep(Duration::from_millis(interval + jitter)).await;

            info!("Attempting to reconnect... (Attempt #{})", attempt);
            match self.open().await {
                Ok(stream) => return Some(stream),
                Err(e) => {
                    warn!("Reconnect attempt #{} failed: {}", attempt, e);
                    interval = (interval as f64 * self.options.reconnect_backoff_factor) as u64;
                    interval = interval.min(self.options.max_reconnect_interval);
                }
            }
        }
    }

    /// Pumps one socket until it closes.
    async fn run_socket(&self, stream: WsStream) {
        let (mut sink, mut source) = stream.split();
        let (socket_tx, mut socket_rx) = mpsc::unbounded_channel::<Message>();

        // The sender must be in place before Connected is announced so
        // lifecycle handlers can emit straight away.
        *write(&self.socket) = Some(socket_tx.clone());
        self.set_state(ConnectionState::Connected);

        let writer = tokio::spawn(async move {
            while let Some(message) = socket_rx.recv().await {
                if let Err(e) = sink.send(message).await {
                    error!("Writer task: WebSocket send error: {}", e);
                    break;
                }
            }
            debug!("Writer task finished");
        });

        let period = Duration::from_millis(self.options.heartbeat_interval);
        let mut heartbeat = interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                biased;

                frame = source.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.route(&text),
                    Some(Ok(Message::Close(frame))) => {
                        debug!("Reader received Close frame: {:?}", frame);
                        break;
                    }
                    Some(Ok(other)) => trace!("Reader ignoring non-text frame: {:?}", other),
                    Some(Err(e)) => {
                        error!("Reader: WebSocket read error: {}", e);
                        break;
                    }
                    None => {
                        debug!("Reader: WebSocket stream closed by remote.");
                        break;
                    }
                },

                _ = heartbeat.tick() => {
                    let ping = RealtimeMessage::new(ChannelEvent::Ping, json!({}));
                    let sent = serde_json::to_string(&ping)
                        .map(|text| socket_tx.send(Message::Text(text)).is_ok())
                        .unwrap_or(false);
                    if !sent {
                        error!("Failed to send heartbeat, assuming connection lost.");
                        break;
                    }
                }
            }
        }

        {
            let mut socket = write(&self.socket);
            if socket.as_ref().is_some_and(|current| current.same_channel(&socket_tx)) {
                *socket = None;
            }
        }
        writer.abort();
    }

    fn route(&self, text: &str) {
        trace!("Reader received frame: {}", text);
        let message = match serde_json::from_str::<RealtimeMessage>(text) {
            Ok(message) => message,
            Err(e) => {
                error!("Failed to parse incoming frame: {}. Raw: {}", e, text);
                return;
            }
        };

        match message.channel_event() {
            Some(event) if event.is_auction_event() => {
                let Some(auction_id) = message.auction_id() else {
                    warn!("Dropping {} without auctionId", message.event);
                    return;
                };
                let payload = Payload {
                    event,
                    auction_id,
                    data: message.payload,
                };
                let handled = self.registry.dispatch(&payload);
                trace!("{} delivered to {} handlers", event, handled);
            }
            _ => debug!("Unhandled event '{}'", message.event),
        }
    }
}
