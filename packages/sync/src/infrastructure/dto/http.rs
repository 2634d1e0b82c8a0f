//! HTTP API の DTO
//!
//! フィールド名はバックエンドの camelCase JSON に合わせます。デコードは必ず
//! [`super::normalize::decode`] を通るので、PascalCase や snake_case のボディも
//! 同じ構造体に入ります。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::normalize::{lenient_utc, lenient_utc_opt};

/// 一覧取得 / 送信の応答と `conversation:message` で運ばれるメッセージ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDto {
    pub id: i64,
    pub conversation_id: i64,
    #[serde(default)]
    pub sender_user_id: Option<i64>,
    pub sender_role: String,
    pub text: String,
    #[serde(with = "lenient_utc")]
    pub sent_at: DateTime<Utc>,
    #[serde(default, with = "lenient_utc_opt")]
    pub read_at: Option<DateTime<Utc>>,
}

/// スタッフ受信箱のエントリ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDto {
    pub id: i64,
    #[serde(default)]
    pub patient_id: Option<i64>,
    #[serde(default)]
    pub patient_name: Option<String>,
    #[serde(default)]
    pub assigned_secretary_id: Option<i64>,
    pub status: String,
    #[serde(default, with = "lenient_utc_opt")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, with = "lenient_utc_opt")]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default, with = "lenient_utc_opt")]
    pub last_message_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub unread_count: i64,
}

/// `GET /chat/unread` のボディおよび `conversation:unread` のペイロード
///
/// ワイヤ上の件数は符号付きで、変換時に 0 で下限を切る。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadSummaryDto {
    #[serde(default)]
    pub unread_messages: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unread_conversations: Option<i64>,
}

/// `POST /chat/start` のレスポンス
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartChatResponseDto {
    pub conversation_id: i64,
    pub status: String,
    #[serde(default)]
    pub has_secretary: bool,
    #[serde(default)]
    pub info_message: Option<String>,
}

/// `POST /chat/conversations/{id}/messages` のボディ
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequestDto {
    pub text: String,
}

/// `POST /chat/secretary/availability` のレスポンス
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityDto {
    #[serde(default)]
    pub secretary_id: Option<i64>,
    pub is_available: bool,
    #[serde(default, with = "lenient_utc_opt")]
    pub updated_at: Option<DateTime<Utc>>,
}
