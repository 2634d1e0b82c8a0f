//! コンポーネント間でやり取りするエンティティと集約

use chrono::{DateTime, Utc};

use super::value_object::{ConversationId, ConversationStatus, MessageId, SenderRole};

/// チャットメッセージ。作成後は不変で、1 つの会話に属する
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_role: SenderRole,
    pub sender_user_id: Option<i64>,
    pub text: String,
    pub sent_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

/// スタッフの受信箱に並ぶ会話
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub id: ConversationId,
    pub patient_id: Option<i64>,
    /// 相手の表示名（スタッフから見た場合は患者）
    pub counterpart_name: String,
    pub status: ConversationStatus,
    pub assigned_staff_id: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub last_message_at: Option<DateTime<Utc>>,
    /// 操作中のスタッフにとっての未読数
    pub unread_count: u32,
}

/// ロールごとの未読集計
///
/// 患者は `unread_messages` のみ、スタッフは `unread_conversations` も受け取る。
/// 件数は符号なしなので負にはならない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UnreadSummary {
    pub unread_messages: u32,
    pub unread_conversations: Option<u32>,
}

impl UnreadSummary {
    pub const fn single(unread_messages: u32) -> Self {
        Self {
            unread_messages,
            unread_conversations: None,
        }
    }

    pub const fn staff(unread_messages: u32, unread_conversations: u32) -> Self {
        Self {
            unread_messages,
            unread_conversations: Some(unread_conversations),
        }
    }
}

/// 現在の患者が会話を開始 / 再開した結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedConversation {
    pub conversation_id: ConversationId,
    pub status: ConversationStatus,
    pub has_secretary: bool,
    /// 会話の上に表示する案内（秘書が不在のときなど）
    pub info_message: Option<String>,
}

/// 切り替え後のスタッフの対応可否
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Availability {
    pub secretary_id: Option<i64>,
    pub is_available: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

/// プッシュチャネルの接続状態
///
/// `Disconnected → Connecting → Connected`、`Connected → Reconnecting →
/// Connected` と遷移し、回復できない失敗ではどの状態からも `Disconnected` になる。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    /// `Connected` のときだけ true。遷移中の状態ではポーリングが動く
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        }
    }
}
