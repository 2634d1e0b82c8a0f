//! Service 層
//!
//! 同期コアの各コンポーネント。ネットワークを直接扱うのは
//! `GroupSubscriptionManager` だけで、それも `PushChannel` トレイト越しです。

pub mod notify;
pub mod polling;
pub mod store;
pub mod subscription;
pub mod unread;

pub use notify::NotificationDispatcher;
pub use polling::{Liveness, PollingFallback};
pub use store::{ConversationStore, MergeOutcome};
pub use subscription::GroupSubscriptionManager;
pub use unread::{SingleCounter, StaffUnread, UnreadChange};
