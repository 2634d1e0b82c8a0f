//! プッシュハブ上の会話ごとのグループ参加
//!
//! ## 責務
//!
//! - 開いているパネルの会話 ID だけをグループに参加させる
//! - 参加済みの ID を記録し、閉じるときに必ず 1 回だけ退出させる
//! - 冗長な join / leave を発行しない
//!
//! join / leave の失敗はログに残して握りつぶします。購読はあくまで
//! リアルタイム性のための最適化で、取りこぼしはポーリングで回復します。

use std::{collections::BTreeSet, sync::Arc};

use serde_json::json;

use crate::domain::{ConversationId, HubMethod, PushChannel};

pub struct GroupSubscriptionManager {
    channel: Arc<dyn PushChannel>,
    joined: BTreeSet<ConversationId>,
}

impl GroupSubscriptionManager {
    pub fn new(channel: Arc<dyn PushChannel>) -> Self {
        Self {
            channel,
            joined: BTreeSet::new(),
        }
    }

    pub fn is_joined(&self, id: ConversationId) -> bool {
        self.joined.contains(&id)
    }

    pub fn joined(&self) -> Vec<ConversationId> {
        self.joined.iter().copied().collect()
    }

    /// `id` のグループに参加する
    ///
    /// join を発行したら `true` を返す。チャネルが切断中のときや
    /// `id` に参加済みのときは何も発行しない。
    pub async fn join(&mut self, id: ConversationId) -> bool {
        if self.joined.contains(&id) {
            tracing::debug!("Conversation {} already joined, skipping", id);
            return false;
        }
        if !self.channel.is_connected() {
            tracing::debug!("Push channel not connected, deferring join of {}", id);
            return false;
        }

        self.joined.insert(id);
        self.issue(HubMethod::JoinConversation, id).await;
        true
    }

    /// `id` のグループから退出する
    ///
    /// `id` に参加していたら `true` を返す。leave 自体は接続中のときだけ送る。
    /// 切れた接続のグループはハブ側が忘れる。
    pub async fn leave(&mut self, id: ConversationId) -> bool {
        if !self.joined.remove(&id) {
            tracing::debug!("Conversation {} not joined, skipping leave", id);
            return false;
        }
        if self.channel.is_connected() {
            self.issue(HubMethod::LeaveConversation, id).await;
        }
        true
    }

    /// 参加中の集合を `desired` に揃える
    pub async fn sync(&mut self, desired: Option<ConversationId>) {
        self.leave_except(desired).await;
        if let Some(id) = desired {
            self.join(id).await;
        }
    }

    /// `keep` 以外の参加中のグループからすべて退出する
    pub async fn leave_except(&mut self, keep: Option<ConversationId>) {
        let stale: Vec<ConversationId> = self
            .joined
            .iter()
            .copied()
            .filter(|id| Some(*id) != keep)
            .collect();
        for id in stale {
            self.leave(id).await;
        }
    }

    pub async fn leave_all(&mut self) {
        self.leave_except(None).await;
    }

    /// 新しい接続でチャネルが復帰した後に join を発行し直す
    pub async fn rejoin_all(&mut self) {
        if !self.channel.is_connected() {
            return;
        }
        let joined: Vec<ConversationId> = self.joined.iter().copied().collect();
        for id in joined {
            tracing::debug!("Rejoining conversation {}", id);
            self.issue(HubMethod::JoinConversation, id).await;
        }
    }

    async fn issue(&self, method: HubMethod, id: ConversationId) {
        match self.channel.invoke(method, vec![json!(id.value())]).await {
            Ok(()) => tracing::debug!("{} {} acknowledged", method.as_str(), id),
            Err(e) => tracing::warn!("{} {} failed: {}", method.as_str(), id, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{InvokeError, channel::MockPushChannel};
    use mockall::predicate::eq;
    use serde_json::Value;

    fn connected_channel() -> MockPushChannel {
        let mut channel = MockPushChannel::new();
        channel.expect_is_connected().return_const(true);
        channel
    }

    fn expect_call(channel: &mut MockPushChannel, method: HubMethod, id: i64, times: usize) {
        channel
            .expect_invoke()
            .with(eq(method), eq(vec![Value::from(id)]))
            .times(times)
            .returning(|_, _| Ok(()));
    }

    #[tokio::test]
    async fn test_join_issues_once() {
        // テスト項目: 同じ会話への 2 回目の join は発行されない
        // given (前提条件):
        let mut channel = connected_channel();
        expect_call(&mut channel, HubMethod::JoinConversation, 42, 1);
        let mut manager = GroupSubscriptionManager::new(Arc::new(channel));

        // when (操作):
        let first = manager.join(ConversationId::new(42)).await;
        let second = manager.join(ConversationId::new(42)).await;

        // then (期待する結果):
        assert!(first);
        assert!(!second);
        assert!(manager.is_joined(ConversationId::new(42)));
    }

    #[tokio::test]
    async fn test_join_skipped_when_disconnected() {
        // テスト項目: 未接続時の join は発行されず、記録もされない
        // given (前提条件):
        let mut channel = MockPushChannel::new();
        channel.expect_is_connected().return_const(false);
        channel.expect_invoke().never();
        let mut manager = GroupSubscriptionManager::new(Arc::new(channel));

        // when (操作):
        let issued = manager.join(ConversationId::new(42)).await;

        // then (期待する結果):
        assert!(!issued);
        assert!(!manager.is_joined(ConversationId::new(42)));
    }

    #[tokio::test]
    async fn test_leave_without_join_is_skipped() {
        // テスト項目: join していない会話の leave は発行されない
        // given (前提条件):
        let mut channel = connected_channel();
        channel.expect_invoke().never();
        let mut manager = GroupSubscriptionManager::new(Arc::new(channel));

        // when (操作):
        let issued = manager.leave(ConversationId::new(7)).await;

        // then (期待する結果):
        assert!(!issued);
    }

    #[tokio::test]
    async fn test_join_failure_is_swallowed_and_paired_with_leave() {
        // テスト項目: join の失敗は握りつぶされ、閉じるときに leave が 1 回発行される
        // given (前提条件):
        let mut channel = connected_channel();
        channel
            .expect_invoke()
            .with(eq(HubMethod::JoinConversation), eq(vec![Value::from(42)]))
            .times(1)
            .returning(|_, _| Err(InvokeError::Remote("denied".to_string())));
        expect_call(&mut channel, HubMethod::LeaveConversation, 42, 1);
        let mut manager = GroupSubscriptionManager::new(Arc::new(channel));

        // when (操作):
        manager.join(ConversationId::new(42)).await;
        let left = manager.leave(ConversationId::new(42)).await;

        // then (期待する結果):
        assert!(left);
        assert!(manager.joined().is_empty());
    }

    #[tokio::test]
    async fn test_rapid_open_close_cycles_pair_every_join() {
        // テスト項目: 開閉を繰り返しても join と leave は同じ回数だけ発行される
        // given (前提条件):
        let mut channel = connected_channel();
        expect_call(&mut channel, HubMethod::JoinConversation, 42, 3);
        expect_call(&mut channel, HubMethod::LeaveConversation, 42, 3);
        let mut manager = GroupSubscriptionManager::new(Arc::new(channel));

        // when (操作):
        for _ in 0..3 {
            manager.join(ConversationId::new(42)).await;
            manager.leave(ConversationId::new(42)).await;
        }

        // then (期待する結果):
        assert!(manager.joined().is_empty());
    }

    #[tokio::test]
    async fn test_sync_switches_groups() {
        // テスト項目: sync は古い会話から退出し、新しい会話に参加する
        // given (前提条件):
        let mut channel = connected_channel();
        expect_call(&mut channel, HubMethod::JoinConversation, 1, 1);
        expect_call(&mut channel, HubMethod::LeaveConversation, 1, 1);
        expect_call(&mut channel, HubMethod::JoinConversation, 2, 1);
        let mut manager = GroupSubscriptionManager::new(Arc::new(channel));
        manager.join(ConversationId::new(1)).await;

        // when (操作):
        manager.sync(Some(ConversationId::new(2))).await;

        // then (期待する結果):
        assert_eq!(manager.joined(), vec![ConversationId::new(2)]);
    }

    #[tokio::test]
    async fn test_rejoin_all_reissues_recorded_joins() {
        // テスト項目: 再接続後の rejoin_all は記録済みの会話に再度 join する
        // given (前提条件):
        let mut channel = connected_channel();
        expect_call(&mut channel, HubMethod::JoinConversation, 42, 2);
        let mut manager = GroupSubscriptionManager::new(Arc::new(channel));
        manager.join(ConversationId::new(42)).await;

        // when (操作):
        manager.rejoin_all().await;

        // then (期待する結果):
        assert_eq!(manager.joined(), vec![ConversationId::new(42)]);
    }
}
