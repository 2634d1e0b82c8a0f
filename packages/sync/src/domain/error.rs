//! 同期コアのエラー型
//!
//! どれもアプリケーションにとって致命的ではありません。接続やグループのエラーは
//! ポーリングに縮退し、取得エラーでは最後に分かっている状態を保ちます。

use std::time::Duration;

use thiserror::Error;

/// ワイヤ上の不正な値
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueObjectError {
    #[error("Unknown conversation status '{0}'")]
    UnknownStatus(String),

    #[error("Unknown inbox tab '{0}'")]
    UnknownTab(String),
}

/// プッシュチャネルの接続エラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    /// ハブの URL から WebSocket リクエストを作れなかった
    #[error("Invalid hub URL '{0}'")]
    InvalidUrl(String),

    /// トークンを Authorization ヘッダーに設定できなかった
    #[error("Bearer token contains invalid header characters")]
    InvalidToken,

    /// TCP / TLS / WebSocket のハンドシェイクに失敗した
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// `dispose()` の後に `connect()` が呼ばれた
    #[error("Connection manager has been disposed")]
    Disposed,
}

/// ハブメソッド呼び出しのエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvokeError {
    #[error("Push channel is not connected")]
    NotConnected,

    #[error("Failed to send invocation: {0}")]
    Send(String),

    #[error("Invocation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Hub rejected invocation: {0}")]
    Remote(String),

    #[error("Connection lost before the hub answered")]
    ConnectionLost,
}

/// REST リクエストのエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// バックエンドからの 401 / 403
    #[error("Authentication error: {0}")]
    Unauthorized(String),

    /// それ以外の失敗ステータス
    #[error("Request failed ({status}): {body}")]
    Status { status: u16, body: String },

    /// ネットワークレベルの失敗
    #[error("Transport error: {0}")]
    Transport(String),

    /// レスポンスボディが期待した形ではなかった
    #[error("Malformed response: {0}")]
    Decode(String),
}

/// メッセージを送信できなかった理由
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("Message text is empty")]
    EmptyText,

    #[error("No conversation is open")]
    NoConversation,

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// 送信失敗。入力欄に戻すためのテキストを持つ
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{error}")]
pub struct SendFailure {
    pub restored_text: String,
    pub error: SendError,
}
