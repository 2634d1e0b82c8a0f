//! WebSocket を使った PushChannel 実装
//!
//! ## 責務
//!
//! - ハブへの接続を 1 本だけ保持し、その状態を `watch` チャネルで公開
//! - イベントハンドラの登録・解除とディスパッチ
//! - invoke フレームと completion フレームの対応付け（タイムアウト付き）
//! - 切断時の自動再接続（再接続ごとにトークンを取り直す）
//!
//! ## タスク構成
//!
//! 接続ごとに writer タスク（mpsc → WebSocket sink）を 1 つ、セッション全体で
//! supervisor タスク（フレーム読み取り → 再接続）を 1 つ生成します。
//! ハンドラは supervisor タスク上で 1 つずつ順番に実行されます。
//! supervisor は `Weak<Inner>` しか保持しないため、最後のハンドルが破棄されると
//! タスクも終了します。

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, PoisonError, Weak,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use futures_util::{
    FutureExt, SinkExt, StreamExt,
    future::{BoxFuture, Shared},
    stream::SplitStream,
};
use serde_json::Value;
use tokio::{
    net::TcpStream,
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        Message as WsMessage,
        client::IntoClientRequest,
        http::{HeaderValue, header::AUTHORIZATION},
    },
};
use uuid::Uuid;

use crate::{
    config::SyncConfig,
    domain::{
        ConnectError, ConnectionState, EventHandler, HandlerId, HubMethod, InvokeError,
        PushChannel, PushEvent, PushEventKind, TokenProvider,
    },
    infrastructure::dto::push::{HubFrame, decode_event, decode_frame},
    lock::lock,
};

use super::policy::ReconnectPolicy;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsReader = SplitStream<WsStream>;
type SharedConnect = Shared<BoxFuture<'static, Result<(), ConnectError>>>;
type PendingReply = oneshot::Sender<Result<(), InvokeError>>;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    pub hub_url: String,
    pub invoke_timeout: Duration,
    pub connect_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl From<&SyncConfig> for ChannelConfig {
    fn from(config: &SyncConfig) -> Self {
        Self {
            hub_url: config.hub_url.clone(),
            invoke_timeout: config.invoke_timeout,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reconnect: ReconnectPolicy::from(config),
        }
    }
}

/// セッション全体で共有するプッシュチャネルのハンドル
///
/// clone は安価で、すべての clone が同じ接続を操作する。
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

struct Inner {
    config: ChannelConfig,
    token_provider: Arc<dyn TokenProvider>,
    state: watch::Sender<ConnectionState>,
    handlers: Mutex<HashMap<PushEventKind, Vec<(HandlerId, EventHandler)>>>,
    next_handler_id: AtomicU64,
    pending: Mutex<HashMap<String, PendingReply>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<WsMessage>>>,
    in_flight: Mutex<Option<SharedConnect>>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    requested: AtomicBool,
    disposed: AtomicBool,
}

impl ConnectionManager {
    pub fn new(config: ChannelConfig, token_provider: Arc<dyn TokenProvider>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                config,
                token_provider,
                state,
                handlers: Mutex::new(HashMap::new()),
                next_handler_id: AtomicU64::new(1),
                pending: Mutex::new(HashMap::new()),
                outbound: Mutex::new(None),
                in_flight: Mutex::new(None),
                supervisor: Mutex::new(None),
                requested: AtomicBool::new(false),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.inner.config
    }

    /// 接続を開く
    ///
    /// 接続済みならすぐに戻る。同時に呼ばれた場合は 1 回のハンドシェイクを共有する。
    /// supervisor が再接続中なら、2 本目のソケットを開かずにその結果を待つ。
    pub async fn connect(&self) -> Result<(), ConnectError> {
        if self.inner.is_disposed() {
            return Err(ConnectError::Disposed);
        }
        self.inner.requested.store(true, Ordering::SeqCst);
        match self.state() {
            ConnectionState::Connected => return Ok(()),
            ConnectionState::Reconnecting => return self.wait_for_reconnect().await,
            ConnectionState::Disconnected | ConnectionState::Connecting => {}
        }

        let attempt = {
            let mut slot = lock(&self.inner.in_flight);
            match slot.as_ref() {
                Some(attempt) => attempt.clone(),
                None => {
                    let attempt = Inner::establish(Arc::clone(&self.inner)).boxed().shared();
                    *slot = Some(attempt.clone());
                    attempt
                }
            }
        };

        let result = attempt.clone().await;

        let mut slot = lock(&self.inner.in_flight);
        if slot.as_ref().is_some_and(|current| current.ptr_eq(&attempt)) {
            *slot = None;
        }
        result
    }

    /// ソケットを閉じ、バックグラウンド処理を止めてハンドラをすべて外す
    ///
    /// 以後は再接続できない。
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.shutdown();
        tracing::info!("Push channel disposed");
    }

    async fn wait_for_reconnect(&self) -> Result<(), ConnectError> {
        let mut rx = self.inner.state.subscribe();
        let settled = rx
            .wait_for(|state| *state != ConnectionState::Reconnecting)
            .await
            .map(|state| *state);
        match settled {
            Ok(ConnectionState::Connected) => Ok(()),
            _ => Err(ConnectError::Handshake(
                "reconnection attempts exhausted".to_string(),
            )),
        }
    }
}

impl Inner {
    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn set_state(&self, next: ConnectionState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            tracing::info!("Push channel {}", next.as_str());
        }
    }

    async fn establish(inner: Arc<Inner>) -> Result<(), ConnectError> {
        inner.set_state(ConnectionState::Connecting);

        let stream = match inner.open_socket().await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!("Push channel connect failed: {}", e);
                inner.set_state(ConnectionState::Disconnected);
                return Err(e);
            }
        };
        if inner.is_disposed() {
            return Err(ConnectError::Disposed);
        }

        let reader = inner.attach(stream);
        let supervisor = tokio::spawn(supervise(Arc::downgrade(&inner), reader));
        if let Some(previous) = lock(&inner.supervisor).replace(supervisor) {
            previous.abort();
        }

        if inner.is_disposed() {
            inner.shutdown();
            return Err(ConnectError::Disposed);
        }
        Ok(())
    }

    async fn open_socket(&self) -> Result<WsStream, ConnectError> {
        let url = &self.config.hub_url;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| ConnectError::InvalidUrl(format!("{}: {}", url, e)))?;

        // Fetched per attempt so reconnects pick up a refreshed session
        if let Some(token) = self.token_provider.token() {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| ConnectError::InvalidToken)?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let handshake = tokio::time::timeout(self.config.connect_timeout, connect_async(request))
            .await
            .map_err(|_| {
                ConnectError::Handshake(format!(
                    "timed out after {:?}",
                    self.config.connect_timeout
                ))
            })?;
        let (stream, response) = handshake.map_err(|e| ConnectError::Handshake(e.to_string()))?;
        tracing::debug!("Hub handshake completed ({})", response.status());
        Ok(stream)
    }

    /// 新しいソケットの writer タスクを起動し `Connected` を公開する
    fn attach(&self, stream: WsStream) -> WsReader {
        let (mut sink, reader) = stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();

        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let closing = matches!(message, WsMessage::Close(_));
                if let Err(e) = sink.send(message).await {
                    tracing::warn!("Failed to write to hub: {}", e);
                    break;
                }
                if closing {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        *lock(&self.outbound) = Some(tx);
        self.set_state(ConnectionState::Connected);
        reader
    }

    /// 現在のソケットを捨て、応答待ちの invoke をすべて失敗させる
    fn detach(&self) {
        lock(&self.outbound).take();
        let pending: Vec<PendingReply> = lock(&self.pending).drain().map(|(_, r)| r).collect();
        for reply in pending {
            let _ = reply.send(Err(InvokeError::ConnectionLost));
        }
    }

    fn shutdown(&self) {
        if let Some(supervisor) = lock(&self.supervisor).take() {
            supervisor.abort();
        }
        if let Some(outbound) = lock(&self.outbound).as_ref() {
            let _ = outbound.send(WsMessage::Close(None));
        }
        self.detach();
        lock(&self.handlers).clear();
        lock(&self.in_flight).take();
        self.set_state(ConnectionState::Disconnected);
    }

    fn handle_text(&self, text: &str) {
        let frame = match decode_frame(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Dropping hub frame: {}", e);
                return;
            }
        };

        match frame {
            HubFrame::Event { event, payload } => match decode_event(&event, payload) {
                Ok(Some(push)) => self.dispatch(&push),
                Ok(None) => tracing::debug!("Ignoring hub event '{}'", event),
                Err(e) => tracing::warn!("Dropping '{}' event: {}", event, e),
            },
            HubFrame::Completion {
                invocation_id,
                error,
            } => {
                let reply = lock(&self.pending).remove(&invocation_id);
                let Some(reply) = reply else {
                    tracing::debug!("Completion for unknown invocation {}", invocation_id);
                    return;
                };
                let result = match error {
                    Some(message) => Err(InvokeError::Remote(message)),
                    None => Ok(()),
                };
                let _ = reply.send(result);
            }
            HubFrame::Invoke { method, .. } => {
                tracing::debug!("Ignoring server-side invoke of '{}'", method);
            }
        }
    }

    fn dispatch(&self, event: &PushEvent) {
        let handlers: Vec<EventHandler> = lock(&self.handlers)
            .get(&event.kind())
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();
        tracing::debug!(
            "Dispatching {} to {} handler(s)",
            event.kind().event_name(),
            handlers.len()
        );
        for handler in handlers {
            handler(event);
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let supervisor = self
            .supervisor
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(supervisor) = supervisor {
            supervisor.abort();
        }
    }
}

async fn supervise(inner: Weak<Inner>, mut reader: WsReader) {
    loop {
        read_frames(&inner, &mut reader).await;

        let Some(strong) = inner.upgrade() else {
            return;
        };
        strong.detach();
        if strong.is_disposed() {
            return;
        }
        tracing::warn!("Push channel connection lost");
        strong.set_state(ConnectionState::Reconnecting);
        drop(strong);

        match reconnect(&inner).await {
            Some(next) => reader = next,
            None => {
                if let Some(strong) = inner.upgrade() {
                    strong.set_state(ConnectionState::Disconnected);
                }
                return;
            }
        }
    }
}

async fn read_frames(inner: &Weak<Inner>, reader: &mut WsReader) {
    while let Some(message) = reader.next().await {
        let Some(strong) = inner.upgrade() else {
            return;
        };
        match message {
            Ok(WsMessage::Text(text)) => strong.handle_text(&text),
            Ok(WsMessage::Close(frame)) => {
                tracing::info!("Hub closed the connection: {:?}", frame);
                return;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("Hub read error: {}", e);
                return;
            }
        }
    }
}

async fn reconnect(inner: &Weak<Inner>) -> Option<WsReader> {
    let mut attempt = 0;
    loop {
        let policy = inner.upgrade()?.config.reconnect;
        if !policy.should_attempt(attempt) {
            tracing::error!(
                "Failed to reconnect after {} attempts",
                policy.max_attempts
            );
            return None;
        }

        let delay = policy.delay_before(attempt);
        if !delay.is_zero() {
            tracing::info!(
                "Reconnecting in {:?}... (attempt {}/{})",
                delay,
                attempt + 1,
                policy.max_attempts
            );
            tokio::time::sleep(delay).await;
        }

        let strong = inner.upgrade()?;
        if strong.is_disposed() {
            return None;
        }
        match strong.open_socket().await {
            Ok(stream) => {
                if strong.is_disposed() {
                    return None;
                }
                tracing::info!(
                    "Reconnected to hub (attempt {}/{})",
                    attempt + 1,
                    policy.max_attempts
                );
                return Some(strong.attach(stream));
            }
            Err(e) => tracing::warn!(
                "Reconnect attempt {}/{} failed: {}",
                attempt + 1,
                policy.max_attempts,
                e
            ),
        }
        attempt += 1;
    }
}

#[async_trait]
impl PushChannel for ConnectionManager {
    fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    fn on(&self, kind: PushEventKind, handler: EventHandler) -> HandlerId {
        let id = HandlerId::new(self.inner.next_handler_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.inner.handlers)
            .entry(kind)
            .or_default()
            .push((id, handler));
        id
    }

    fn off(&self, kind: PushEventKind, id: HandlerId) {
        if let Some(list) = lock(&self.inner.handlers).get_mut(&kind) {
            list.retain(|(handler_id, _)| *handler_id != id);
        }
    }

    fn request_reconnect(&self) {
        let inner = &self.inner;
        if inner.is_disposed()
            || !inner.requested.load(Ordering::SeqCst)
            || self.state() != ConnectionState::Disconnected
        {
            return;
        }
        tracing::debug!("Push channel down, retrying connect in the background");
        let manager = self.clone();
        tokio::spawn(async move {
            if let Err(e) = manager.connect().await {
                tracing::debug!("Background connect failed: {}", e);
            }
        });
    }

    async fn invoke(&self, method: HubMethod, arguments: Vec<Value>) -> Result<(), InvokeError> {
        if !self.is_connected() {
            return Err(InvokeError::NotConnected);
        }

        let invocation_id = Uuid::new_v4().to_string();
        let frame = HubFrame::Invoke {
            invocation_id: invocation_id.clone(),
            method: method.as_str().to_string(),
            arguments,
        };
        let json = serde_json::to_string(&frame).map_err(|e| InvokeError::Send(e.to_string()))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        lock(&self.inner.pending).insert(invocation_id.clone(), reply_tx);

        let sent = match lock(&self.inner.outbound).as_ref() {
            Some(outbound) => outbound
                .send(WsMessage::Text(json.into()))
                .map_err(|e| InvokeError::Send(e.to_string())),
            None => Err(InvokeError::NotConnected),
        };
        if let Err(e) = sent {
            lock(&self.inner.pending).remove(&invocation_id);
            return Err(e);
        }
        tracing::debug!("Invoked {} ({})", method.as_str(), invocation_id);

        let timeout = self.inner.config.invoke_timeout;
        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(InvokeError::ConnectionLost),
            Err(_) => {
                lock(&self.inner.pending).remove(&invocation_id);
                Err(InvokeError::Timeout(timeout))
            }
        }
    }
}
