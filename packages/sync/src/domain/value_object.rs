//! 値オブジェクト
//!
//! すべてのコンポーネントで共有する ID と閉じた語彙。
//! ワイヤ上の文字列はここで大文字小文字を区別せずに解釈するので、
//! これより内側で生の文字列を比較することはありません。

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use super::error::ValueObjectError;

/// サーバーが採番する会話 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(i64);

impl ConversationId {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// サーバーが採番するメッセージ ID。会話内の重複排除はこのキーだけで行う
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(i64);

impl MessageId {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> i64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// メッセージ送信者のロール
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SenderRole {
    Patient,
    Secretary,
    Doctor,
    Admin,
    /// バックエンドが今後追加するロール。小文字にしてそのまま保持する
    Other(String),
}

impl SenderRole {
    /// ワイヤ上のロールを解釈する。失敗せず、未知のロールは `Other` になる
    pub fn parse(raw: &str) -> Self {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "patient" => Self::Patient,
            "secretary" => Self::Secretary,
            "doctor" => Self::Doctor,
            "admin" => Self::Admin,
            _ => Self::Other(normalized),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Patient => "patient",
            Self::Secretary => "secretary",
            Self::Doctor => "doctor",
            Self::Admin => "admin",
            Self::Other(role) => role.as_str(),
        }
    }

    /// 受信箱から患者に返信するスタッフのロールか
    pub fn is_staff(&self) -> bool {
        matches!(self, Self::Secretary | Self::Doctor | Self::Admin)
    }
}

impl fmt::Display for SenderRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 会話のライフサイクル状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConversationStatus {
    Open,
    Waiting,
    Closed,
}

impl ConversationStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Waiting => "waiting",
            Self::Closed => "closed",
        }
    }
}

impl FromStr for ConversationStatus {
    type Err = ValueObjectError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "waiting" => Ok(Self::Waiting),
            "closed" => Ok(Self::Closed),
            _ => Err(ValueObjectError::UnknownStatus(raw.to_string())),
        }
    }
}

impl fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// スタッフ受信箱のフィルタタブ
///
/// `Open` は自分に割り当てられた終了していない会話と、未割り当ての待機中の会話を並べる。
/// そのため `ConversationStatus::Open` の集合とは一致しない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InboxTab {
    #[default]
    Open,
    Waiting,
    Closed,
}

impl InboxTab {
    pub const ALL: [InboxTab; 3] = [InboxTab::Open, InboxTab::Waiting, InboxTab::Closed];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Waiting => "waiting",
            Self::Closed => "closed",
        }
    }
}

impl FromStr for InboxTab {
    type Err = ValueObjectError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "waiting" => Ok(Self::Waiting),
            "closed" => Ok(Self::Closed),
            _ => Err(ValueObjectError::UnknownTab(raw.to_string())),
        }
    }
}

impl fmt::Display for InboxTab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
