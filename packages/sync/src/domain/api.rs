//! Chat API trait 定義
//!
//! バックエンドの REST 操作を request/response 関数として表現します。
//! 具体的な実装（reqwest）は Infrastructure 層が提供します（依存性の逆転）。

use async_trait::async_trait;

use super::{
    entity::{Availability, Conversation, Message, StartedConversation, UnreadSummary},
    error::ApiError,
    value_object::{ConversationId, InboxTab},
};

/// チャット API trait
///
/// 全ての操作は Bearer トークン付きで呼び出される前提。
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// 現在のユーザーの会話を開始（既存の未クローズ会話があればそれを返す）
    async fn start_conversation(&self) -> Result<StartedConversation, ApiError>;

    /// 会話のメッセージ一覧（サーバー側で時系列順）
    async fn list_messages(&self, id: ConversationId) -> Result<Vec<Message>, ApiError>;

    /// メッセージ送信
    async fn send_message(&self, id: ConversationId, text: &str) -> Result<Message, ApiError>;

    /// 既読化（read receipt）
    async fn mark_read(&self, id: ConversationId) -> Result<(), ApiError>;

    /// 現在のユーザーの未読サマリー
    async fn unread_summary(&self) -> Result<UnreadSummary, ApiError>;

    /// スタッフ受信箱（タブでフィルタ）
    async fn staff_inbox(&self, tab: InboxTab) -> Result<Vec<Conversation>, ApiError>;

    /// スタッフの対応可否を設定
    async fn set_availability(&self, available: bool) -> Result<Availability, ApiError>;
}
