//! ワイヤ境界での正規化デコード
//!
//! ペイロードのキーは、バックエンドのどのシリアライザが出したかによって
//! camelCase、PascalCase、snake_case のいずれかになります。serde に渡す前に
//! ここで一度だけすべてのキーを camelCase に書き換え、これより内側では
//! 生のキーを見ません。

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// キーを 1 つ camelCase に書き換える
///
/// `ConversationId` も `conversation_id` も `conversationId` になり、
/// `ID` のような略語は `id` になる。
pub fn canonical_key(key: &str) -> String {
    let mut output = String::with_capacity(key.len());
    for (index, part) in key.split('_').filter(|p| !p.is_empty()).enumerate() {
        let part = if part.chars().all(|c| !c.is_ascii_lowercase()) {
            part.to_ascii_lowercase()
        } else {
            part.to_string()
        };
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            if index == 0 {
                output.push(first.to_ascii_lowercase());
            } else {
                output.push(first.to_ascii_uppercase());
            }
            output.extend(chars);
        }
    }
    output
}

/// オブジェクトのキーを再帰的にすべて camelCase に書き換える
pub fn normalize_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (canonical_key(&key), normalize_keys(value)))
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_keys).collect()),
        other => other,
    }
}

/// キーを正規化してから任意のワイヤ値を DTO にデコードする
pub fn decode<T: DeserializeOwned>(value: Value) -> Result<T, serde_json::Error> {
    serde_json::from_value(normalize_keys(value))
}

/// キーを正規化してから JSON テキストを DTO にデコードする
pub fn decode_str<T: DeserializeOwned>(text: &str) -> Result<T, serde_json::Error> {
    decode(serde_json::from_str::<Value>(text)?)
}

/// タイムゾーン表記のないタイムスタンプ向けの serde ヘルパー
pub mod lenient_utc {
    use super::*;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        clinic_chat_shared::time::parse_utc_lenient(&raw)
            .ok_or_else(|| D::Error::custom(format!("invalid timestamp '{raw}'")))
    }
}

/// [`lenient_utc`] の Option 版。`#[serde(default)]` と併用する
pub mod lenient_utc_opt {
    use super::*;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(timestamp) => serializer.serialize_str(&timestamp.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(None),
            Some(raw) if raw.trim().is_empty() => Ok(None),
            Some(raw) => clinic_chat_shared::time::parse_utc_lenient(&raw)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("invalid timestamp '{raw}'"))),
        }
    }
}
