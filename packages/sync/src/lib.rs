//! クリニックチャットの会話同期コア
//!
//! 患者ウィジェット、秘書の受信箱、ヘッダーバッジの間で会話の内容と未読数を
//! 一貫した状態に保ちます。リアルタイムの更新はプッシュチャネルで届き、
//! チャネルが切れている間はポーリングが代わりを務めます。

// layers
pub mod domain;
pub mod infrastructure;
pub mod service;
pub mod view;

pub mod config;

mod lock;

#[cfg(test)]
mod testing;

pub use config::SyncConfig;
pub use view::{HeaderBadgeView, OpenState, PatientChatView, SecretaryInboxView, ViewContext};
