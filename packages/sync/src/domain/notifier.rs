//! ユーザーに見せる通知と一時的なお知らせ

use std::fmt;

/// 通知を出した UI 面
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertSource {
    PatientWidget,
    SecretaryInbox,
    HeaderBadge,
}

impl fmt::Display for AlertSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PatientWidget => "patient widget",
            Self::SecretaryInbox => "secretary inbox",
            Self::HeaderBadge => "header badge",
        })
    }
}

/// 対応するパネルが閉じている間に新しい未読メッセージが届いた
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alert {
    pub source: AlertSource,
    pub previous: u32,
    pub current: u32,
}

impl Alert {
    pub fn delta(&self) -> u32 {
        self.current.saturating_sub(self.previous)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// 一時的に表示して消せる通知（トースト）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// 通知とお知らせの出力先。表示方法はフロントエンドが決める
pub trait Notifier: Send + Sync {
    fn alert(&self, alert: Alert);

    fn notice(&self, notice: Notice);
}
