//! 利用側のビュー
//!
//! ## 責務
//!
//! - 各 UI 面 (患者ウィジェット、秘書の受信箱、ヘッダーバッジ) の状態を保持する
//! - プッシュイベント、ポーリング、再接続をサービス層の部品に振り分ける
//! - 非同期処理の結果は世代と生存フラグを確認してから反映する
//!
//! ビューは `Arc<Inner>` を包むハンドルです。チャネルへの登録や spawn したタスクは
//! `Weak<Inner>` しか持たないので、最後のハンドルを破棄すれば `unmount` を
//! 呼ばなくてもビューは片付きます。

pub mod badge;
pub mod open_state;
pub mod panel;
pub mod patient;
pub mod secretary;

pub use badge::HeaderBadgeView;
pub use open_state::OpenState;
pub use panel::{Panel, PanelPhase};
pub use patient::PatientChatView;
pub use secretary::SecretaryInboxView;

use std::{
    fmt,
    future::Future,
    sync::{Arc, Weak},
    time::Duration,
};

use tokio::{sync::watch, task::JoinHandle};

use crate::{
    config::SyncConfig,
    domain::{
        ChatApi, ConnectionState, HandlerId, Notice, Notifier, PushChannel, PushEvent,
        PushEventKind,
    },
    service::{Liveness, PollingFallback},
};

/// 各ビューが組み立てに使う依存先
#[derive(Clone)]
pub struct ViewContext {
    pub api: Arc<dyn ChatApi>,
    pub channel: Arc<dyn PushChannel>,
    pub notifier: Arc<dyn Notifier>,
    pub poll_interval: Duration,
}

impl ViewContext {
    pub fn new(
        api: Arc<dyn ChatApi>,
        channel: Arc<dyn PushChannel>,
        notifier: Arc<dyn Notifier>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            api,
            channel,
            notifier,
            poll_interval: config.poll_interval,
        }
    }
}

/// ビューの表示状態が変わるたびに増える単調カウンター
#[derive(Debug)]
pub(crate) struct Revision(watch::Sender<u64>);

impl Revision {
    pub fn new() -> Self {
        Self(watch::Sender::new(0))
    }

    pub fn bump(&self) {
        self.0.send_modify(|revision| *revision += 1);
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.0.subscribe()
    }
}

/// 再取得のあとに既読通知を送る条件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Receipt {
    /// ポーリングや手動更新: 開いている間は毎回送る
    Always,
    /// 送信直後: まだ見ていない相手のメッセージがあるときだけ
    IfUnseen,
}

/// マウント中のビューがチャネルとランタイムに登録したもの一式
#[derive(Default)]
pub(crate) struct Attachments {
    handlers: Vec<(PushEventKind, HandlerId)>,
    poller: Option<PollingFallback>,
    tasks: Vec<JoinHandle<()>>,
}

impl Attachments {
    pub fn is_attached(&self) -> bool {
        !self.handlers.is_empty() || self.poller.is_some() || !self.tasks.is_empty()
    }

    pub fn handler(&mut self, kind: PushEventKind, id: HandlerId) {
        self.handlers.push((kind, id));
    }

    pub fn poller(&mut self, poller: PollingFallback) {
        self.poller = Some(poller);
    }

    pub fn task(&mut self, task: JoinHandle<()>) {
        self.tasks.push(task);
    }

    pub fn detach(&mut self, channel: &dyn PushChannel) {
        for (kind, id) in self.handlers.drain(..) {
            channel.off(kind, id);
        }
        if let Some(mut poller) = self.poller.take() {
            poller.stop();
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

/// `kind` に `handle` を登録し、ビューが存在する間だけ転送する
pub(crate) fn register<T, F>(
    channel: &dyn PushChannel,
    kind: PushEventKind,
    target: Weak<T>,
    handle: F,
) -> HandlerId
where
    T: Send + Sync + 'static,
    F: Fn(&Arc<T>, &PushEvent) + Send + Sync + 'static,
{
    channel.on(
        kind,
        Arc::new(move |event: &PushEvent| {
            if let Some(target) = target.upgrade() {
                handle(&target, event);
            }
        }),
    )
}

/// ビューのポーリングフォールバックを開始
pub(crate) fn start_poller<T, F, Fut>(
    ctx: &ViewContext,
    target: Weak<T>,
    refresh: F,
) -> PollingFallback
where
    T: Send + Sync + 'static,
    F: Fn(Arc<T>, Liveness) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    PollingFallback::start(ctx.poll_interval, ctx.channel.watch_state(), move |live| {
        let pending = target.upgrade().map(|target| refresh(target, live));
        async move {
            if let Some(pending) = pending {
                pending.await;
            }
        }
    })
}

/// チャネルが `Connected` になるたびに `catch_up` を実行する
pub(crate) fn on_reconnect<T, F, Fut>(
    mut state: watch::Receiver<ConnectionState>,
    target: Weak<T>,
    catch_up: F,
) -> JoinHandle<()>
where
    T: Send + Sync + 'static,
    F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut was_connected = state.borrow_and_update().is_connected();
    tokio::spawn(async move {
        while state.changed().await.is_ok() {
            let connected = state.borrow_and_update().is_connected();
            if connected && !was_connected {
                let Some(target) = target.upgrade() else {
                    break;
                };
                tracing::debug!("Push channel connected, catching up");
                catch_up(target).await;
            }
            was_connected = connected;
        }
    })
}

/// 取得失敗をログに残し、ユーザーに通知する
pub(crate) fn report(notifier: &dyn Notifier, context: &str, error: &impl fmt::Display) {
    tracing::warn!("{}: {}", context, error);
    notifier.notice(Notice::error(format!("{context}: {error}")));
}
