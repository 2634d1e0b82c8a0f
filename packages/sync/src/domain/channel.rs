//! Push channel trait 定義
//!
//! ビューやサブスクリプション管理が必要とするプッシュチャネルのインターフェース。
//! 具体的な実装（WebSocket）は Infrastructure 層の `ConnectionManager` が提供します。
//!
//! 接続状態を書き換えるのは実装側だけで、利用側は状態の参照と
//! ハンドラの登録/解除、ベストエフォートの invoke のみを行います。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::watch;

use super::{
    entity::{ConnectionState, Message, UnreadSummary},
    error::InvokeError,
};

/// 受信するプッシュイベント名
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PushEventKind {
    /// `conversation:unread`
    Unread,
    /// `conversation:message`
    Message,
}

impl PushEventKind {
    pub const fn event_name(self) -> &'static str {
        match self {
            Self::Unread => "conversation:unread",
            Self::Message => "conversation:message",
        }
    }

    pub fn from_event_name(name: &str) -> Option<Self> {
        match name {
            "conversation:unread" => Some(Self::Unread),
            "conversation:message" => Some(Self::Message),
            _ => None,
        }
    }
}

/// デコード済みのプッシュイベント
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    Unread(UnreadSummary),
    Message(Message),
}

impl PushEvent {
    pub fn kind(&self) -> PushEventKind {
        match self {
            Self::Unread(_) => PushEventKind::Unread,
            Self::Message(_) => PushEventKind::Message,
        }
    }
}

/// 送信するハブメソッド
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HubMethod {
    JoinConversation,
    LeaveConversation,
}

impl HubMethod {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::JoinConversation => "JoinConversation",
            Self::LeaveConversation => "LeaveConversation",
        }
    }
}

/// プッシュイベントのリスナー。ハンドラは受信タスク上で 1 つずつ実行されるので、
/// ブロックしてはいけません。
pub type EventHandler = Arc<dyn Fn(&PushEvent) + Send + Sync>;

/// `on` が返すトークン。`off` での解除に使う
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

impl HandlerId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }
}

/// プッシュチャネル trait
///
/// UseCase 相当のコンポーネント（ビュー、GroupSubscriptionManager）はこの trait に依存し、
/// WebSocket 実装には依存しない。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PushChannel: Send + Sync {
    /// 現在の接続状態
    fn state(&self) -> ConnectionState;

    /// `Connected` のときだけ true
    fn is_connected(&self) -> bool;

    /// 接続状態の変化を購読する
    fn watch_state(&self) -> watch::Receiver<ConnectionState>;

    /// イベントハンドラを登録
    fn on(&self, kind: PushEventKind, handler: EventHandler) -> HandlerId;

    /// イベントハンドラを解除
    fn off(&self, kind: PushEventKind, id: HandlerId);

    /// 接続を一度要求されたチャネルが `Disconnected` のままなら、裏で接続し直す
    ///
    /// 待たずに戻る。接続を要求されたことのないチャネルでは何もしない。
    fn request_reconnect(&self);

    /// ハブのメソッドを呼び出す（ベストエフォート）
    async fn invoke(&self, method: HubMethod, arguments: Vec<Value>) -> Result<(), InvokeError>;
}
