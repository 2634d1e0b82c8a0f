//! プッシュチャネルのフレーム
//!
//! WebSocket のテキストフレームは 1 つにつき `type` でタグ付けされた JSON オブジェクト 1 つです:
//!
//! ```text
//! {"type":"event","event":"conversation:message","payload":{...}}
//! {"type":"invoke","invocationId":"...","method":"JoinConversation","arguments":[42]}
//! {"type":"completion","invocationId":"...","error":null}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::{PushEvent, PushEventKind};

use super::{
    http::{MessageDto, UnreadSummaryDto},
    normalize::{decode, decode_str},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum HubFrame {
    /// サーバー → クライアントのイベント
    Event { event: String, payload: Value },

    /// クライアント → サーバーのメソッド呼び出し
    Invoke {
        invocation_id: String,
        method: String,
        #[serde(default)]
        arguments: Vec<Value>,
    },

    /// `Invoke` に対するサーバー → クライアントの応答
    Completion {
        invocation_id: String,
        #[serde(default)]
        error: Option<String>,
    },
}

impl HubFrame {
    /// 型付きペイロードからイベントフレームを作る
    pub fn event<T: Serialize>(kind: PushEventKind, payload: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::Event {
            event: kind.event_name().to_string(),
            payload: serde_json::to_value(payload)?,
        })
    }
}

/// プッシュフレームのデコードエラー
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Malformed frame: {0}")]
    Json(#[from] serde_json::Error),
}

/// テキストフレームを 1 つデコードする
pub fn decode_frame(text: &str) -> Result<HubFrame, FrameError> {
    Ok(decode_str(text)?)
}

/// イベントのペイロードを型付きの [`PushEvent`] にデコードする
///
/// このクライアントが扱わないイベント名には `Ok(None)` を返す。
pub fn decode_event(event: &str, payload: Value) -> Result<Option<PushEvent>, FrameError> {
    let Some(kind) = PushEventKind::from_event_name(event) else {
        return Ok(None);
    };
    let decoded = match kind {
        PushEventKind::Unread => PushEvent::Unread(decode::<UnreadSummaryDto>(payload)?.into()),
        PushEventKind::Message => PushEvent::Message(decode::<MessageDto>(payload)?.into()),
    };
    Ok(Some(decoded))
}
