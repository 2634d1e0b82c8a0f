//! 秘書の受信箱
//!
//! タブ付きの会話一覧と、エントリごとの未読数、内容を表示する選択中の会話
//! (高々 1 つ) を持ちます。エントリの選択が受信箱にとっての「パネルを開く」です。

use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use crate::{
    domain::{
        AlertSource, ApiError, Availability, Conversation, ConversationId, InboxTab, Message,
        Notice, PushEvent, PushEventKind, SendError, SendFailure, UnreadSummary,
    },
    lock::lock,
    service::{
        ConversationStore, GroupSubscriptionManager, Liveness, MergeOutcome,
        NotificationDispatcher, StaffUnread,
    },
};

use super::{
    Attachments, Panel, PanelPhase, Receipt, Revision, ViewContext, on_reconnect, register,
    report, start_poller,
};

#[derive(Clone)]
pub struct SecretaryInboxView {
    inner: Arc<Inner>,
}

struct Inner {
    ctx: ViewContext,
    state: Mutex<State>,
    subscriptions: tokio::sync::Mutex<GroupSubscriptionManager>,
    attachments: Mutex<Attachments>,
    live: Liveness,
    revision: Revision,
}

struct State {
    tab: InboxTab,
    inbox_generation: u64,
    primed: bool,
    unread: StaffUnread,
    store: ConversationStore,
    dispatcher: NotificationDispatcher,
    panel: Panel,
    available: Option<bool>,
}

impl SecretaryInboxView {
    pub fn new(ctx: ViewContext) -> Self {
        let state = State {
            tab: InboxTab::default(),
            inbox_generation: 0,
            primed: false,
            unread: StaffUnread::new(),
            store: ConversationStore::new(),
            dispatcher: NotificationDispatcher::new(
                AlertSource::SecretaryInbox,
                ctx.notifier.clone(),
            ),
            panel: Panel::default(),
            available: None,
        };
        let subscriptions = GroupSubscriptionManager::new(ctx.channel.clone());
        Self {
            inner: Arc::new(Inner {
                ctx,
                state: Mutex::new(state),
                subscriptions: tokio::sync::Mutex::new(subscriptions),
                attachments: Mutex::new(Attachments::default()),
                live: Liveness::new(),
                revision: Revision::new(),
            }),
        }
    }

    /// チャネルに接続し、未読サマリーと受信箱の最初のページを読み込む
    ///
    /// まだ何も選択されていなければ先頭のエントリを選択する。
    pub async fn mount(&self) {
        let inner = &self.inner;
        if !inner.live.is_live() {
            tracing::warn!("Secretary inbox already unmounted, ignoring mount");
            return;
        }
        {
            let mut attachments = lock(&inner.attachments);
            if attachments.is_attached() {
                return;
            }
            let channel = &*inner.ctx.channel;
            let weak = Arc::downgrade(inner);
            for kind in [PushEventKind::Unread, PushEventKind::Message] {
                let id = register(channel, kind, weak.clone(), |inner, event| {
                    inner.on_event(event)
                });
                attachments.handler(kind, id);
            }
            attachments.poller(start_poller(
                &inner.ctx,
                weak.clone(),
                |inner, live| async move { inner.refresh_with(&live).await },
            ));
            attachments.task(on_reconnect(
                channel.watch_state(),
                weak,
                |inner| async move { inner.catch_up().await },
            ));
        }
        tracing::info!("Secretary inbox mounted");

        let live = inner.live.clone();
        inner.load_summary(&live).await;
        inner.load_inbox(true, &live).await;
    }

    /// タブを切り替える。選択は閉じられ、新しいタブが読み込まれる
    pub async fn set_tab(&self, tab: InboxTab) {
        {
            let mut state = lock(&self.inner.state);
            state.tab = tab;
            state.inbox_generation += 1;
        }
        self.inner.close_selection().await;
        let live = self.inner.live.clone();
        self.inner.load_inbox(true, &live).await;
    }

    /// `id` を開く。会話の内容が表示されたら `true` を返す
    pub async fn select(&self, id: ConversationId) -> bool {
        self.inner.select(id).await
    }

    pub async fn close_selection(&self) -> bool {
        self.inner.close_selection().await
    }

    pub async fn send(&self, text: &str) -> Result<Message, SendFailure> {
        self.inner.send(text).await
    }

    pub async fn set_availability(&self, available: bool) -> Result<Availability, ApiError> {
        let inner = &self.inner;
        match inner.ctx.api.set_availability(available).await {
            Ok(availability) => {
                lock(&inner.state).available = Some(availability.is_available);
                let message = if availability.is_available {
                    "You are now available"
                } else {
                    "You are now away"
                };
                inner.ctx.notifier.notice(Notice::info(message));
                inner.revision.bump();
                Ok(availability)
            }
            Err(e) => {
                report(&*inner.ctx.notifier, "Could not update availability", &e);
                Err(e)
            }
        }
    }

    /// サマリー、受信箱、選択中の会話を今すぐ更新する
    pub async fn refresh(&self) {
        let live = self.inner.live.clone();
        self.inner.refresh_with(&live).await;
    }

    pub async fn unmount(&self) {
        let inner = &self.inner;
        inner.live.kill();
        lock(&inner.attachments).detach(&*inner.ctx.channel);
        {
            let mut state = lock(&inner.state);
            state.panel.reset();
            state.unread.clear_selection();
        }
        inner.subscriptions.lock().await.leave_all().await;
        inner.revision.bump();
        tracing::info!("Secretary inbox unmounted");
    }

    pub fn tab(&self) -> InboxTab {
        lock(&self.inner.state).tab
    }

    pub fn inbox(&self) -> Vec<Conversation> {
        lock(&self.inner.state).unread.inbox().to_vec()
    }

    pub fn entry(&self, id: ConversationId) -> Option<Conversation> {
        lock(&self.inner.state).unread.entry(id).cloned()
    }

    pub fn selected(&self) -> Option<ConversationId> {
        lock(&self.inner.state).unread.selected()
    }

    pub fn phase(&self) -> PanelPhase {
        lock(&self.inner.state).panel.phase()
    }

    pub fn summary(&self) -> UnreadSummary {
        lock(&self.inner.state).unread.summary()
    }

    /// 選択中以外のエントリの未読メッセージ数
    pub fn unseen(&self) -> u32 {
        lock(&self.inner.state).unread.unseen_total()
    }

    pub fn available(&self) -> Option<bool> {
        lock(&self.inner.state).available
    }

    /// 選択中の会話の内容
    pub fn messages(&self) -> Vec<Message> {
        let state = lock(&self.inner.state);
        state
            .unread
            .selected()
            .map(|id| state.store.messages(id).to_vec())
            .unwrap_or_default()
    }

    pub fn subscribe_revisions(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }
}

impl Inner {
    fn is_live(&self, live: &Liveness) -> bool {
        self.live.is_live() && live.is_live()
    }

    fn is_current(&self, generation: u64) -> bool {
        self.live.is_live() && lock(&self.state).panel.is_current(generation)
    }

    fn open_selection(&self) -> Option<(ConversationId, u64)> {
        let state = lock(&self.state);
        if state.panel.phase() != PanelPhase::Open {
            return None;
        }
        state
            .unread
            .selected()
            .map(|id| (id, state.panel.generation()))
    }

    async fn load_summary(&self, live: &Liveness) {
        match self.ctx.api.unread_summary().await {
            Ok(summary) if self.is_live(live) => {
                lock(&self.state).unread.apply_summary(summary);
                self.revision.bump();
            }
            Ok(_) => {}
            Err(e) => report(&*self.ctx.notifier, "Could not load unread summary", &e),
        }
    }

    /// 現在のタブを取得する。表示されなくなったタブの結果は捨てる
    async fn load_inbox(&self, auto_select: bool, live: &Liveness) {
        let (tab, generation) = {
            let state = lock(&self.state);
            (state.tab, state.inbox_generation)
        };
        let entries = match self.ctx.api.staff_inbox(tab).await {
            Ok(entries) => entries,
            Err(e) => {
                report(&*self.ctx.notifier, "Could not load inbox", &e);
                return;
            }
        };
        let first = {
            let mut state = lock(&self.state);
            if !self.is_live(live) || state.inbox_generation != generation {
                tracing::debug!("Dropping stale {} inbox page", tab);
                return;
            }
            state.unread.replace_inbox(entries);
            let unseen = state.unread.unseen_total();
            if state.primed {
                state.dispatcher.observe(unseen, false);
            } else {
                state.dispatcher.prime(unseen);
                state.primed = true;
            }
            if auto_select && state.unread.selected().is_none() {
                state.unread.inbox().first().map(|c| c.id)
            } else {
                None
            }
        };
        self.revision.bump();
        if let Some(id) = first {
            self.select(id).await;
        }
    }

    async fn select(&self, id: ConversationId) -> bool {
        if !self.live.is_live() {
            return false;
        }
        self.ctx.channel.request_reconnect();
        let generation = {
            let mut state = lock(&self.state);
            if state.unread.selected() == Some(id) && state.panel.is_active() {
                return false;
            }
            let generation = state.panel.begin_open();
            if let Some(previous) = state.unread.selected().filter(|p| *p != id) {
                state.store.evict(previous);
            }
            if !state.unread.select(id) {
                tracing::debug!("Selected conversation {} is not in the current page", id);
            }
            let unseen = state.unread.unseen_total();
            state.dispatcher.observe(unseen, false);
            generation
        };
        self.revision.bump();

        self.reconcile_groups(None).await;
        if !self.is_current(generation) {
            return false;
        }

        let messages = match self.ctx.api.list_messages(id).await {
            Ok(messages) => messages,
            Err(e) => {
                {
                    let mut state = lock(&self.state);
                    if state.panel.abort(generation) {
                        state.unread.clear_selection();
                    }
                }
                report(&*self.ctx.notifier, "Could not load messages", &e);
                self.revision.bump();
                self.reconcile_groups(None).await;
                return false;
            }
        };
        {
            let mut state = lock(&self.state);
            if !self.live.is_live() || !state.panel.is_current(generation) {
                return false;
            }
            state.store.replace(id, messages);
        }
        self.revision.bump();

        self.reconcile_groups(Some(generation)).await;
        if !self.is_current(generation) {
            return false;
        }
        self.send_receipt(id).await;

        let opened = lock(&self.state).panel.finish(generation);
        if opened {
            tracing::info!("Conversation {} selected", id);
            self.revision.bump();
        }
        opened
    }

    async fn close_selection(&self) -> bool {
        let (generation, id) = {
            let mut state = lock(&self.state);
            if !state.panel.is_active() {
                state.unread.clear_selection();
                return false;
            }
            let generation = state.panel.begin_close();
            (generation, state.unread.clear_selection())
        };
        self.revision.bump();

        self.reconcile_groups(None).await;

        {
            let mut state = lock(&self.state);
            if state.panel.finish(generation) {
                if let Some(id) = id {
                    state.store.evict(id);
                }
            }
        }
        self.revision.bump();
        true
    }

    /// 購読中のグループを選択中の会話とパネルの状態に合わせる
    ///
    /// 選択中の会話以外からは必ず退出する。join するのはパネルが `Open` のとき、
    /// または `opening` の世代がまだ最新のときだけ。
    async fn reconcile_groups(&self, opening: Option<u64>) {
        let mut subscriptions = self.subscriptions.lock().await;
        let (keep, join) = {
            let state = lock(&self.state);
            let keep = state
                .unread
                .selected()
                .filter(|_| self.live.is_live() && state.panel.is_active());
            let join = state.panel.phase() == PanelPhase::Open
                || opening.is_some_and(|generation| state.panel.is_current(generation));
            (keep, join)
        };
        subscriptions.leave_except(keep).await;
        if let Some(id) = keep.filter(|_| join) {
            subscriptions.join(id).await;
        }
    }

    async fn send(&self, text: &str) -> Result<Message, SendFailure> {
        let failure = |error| SendFailure {
            restored_text: text.to_string(),
            error,
        };
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(failure(SendError::EmptyText));
        }
        let Some((id, generation)) = self.open_selection() else {
            return Err(failure(SendError::NoConversation));
        };

        match self.ctx.api.send_message(id, trimmed).await {
            Ok(message) => {
                lock(&self.state).store.merge_append(message.clone());
                self.revision.bump();
                let live = self.live.clone();
                self.reload(id, generation, &live, Receipt::IfUnseen).await;
                self.load_inbox(false, &live).await;
                Ok(message)
            }
            Err(e) => {
                report(&*self.ctx.notifier, "Could not send message", &e);
                Err(failure(SendError::Api(e)))
            }
        }
    }

    fn on_event(self: &Arc<Self>, event: &PushEvent) {
        match event {
            PushEvent::Unread(summary) => self.on_summary(*summary),
            PushEvent::Message(message) => self.on_message(message.clone()),
        }
    }

    fn on_summary(self: &Arc<Self>, summary: UnreadSummary) {
        let changed = {
            let mut state = lock(&self.state);
            if !self.live.is_live() {
                return;
            }
            let before = state.unread.summary();
            state.unread.apply_summary(summary);
            before != summary
        };
        self.revision.bump();
        if changed {
            self.spawn_inbox_reload();
        }
    }

    fn on_message(self: &Arc<Self>, message: Message) {
        let id = message.conversation_id;
        let from_patient = !message.sender_role.is_staff();
        let (listed, outcome, receipt) = {
            let mut state = lock(&self.state);
            if !self.live.is_live() {
                return;
            }
            let listed = state.unread.touch(&message);
            let outcome = state.store.merge_append(message);
            let receipt = outcome == MergeOutcome::Appended
                && from_patient
                && state.unread.selected() == Some(id)
                && state.panel.is_active();
            (listed, outcome, receipt)
        };
        self.revision.bump();
        if receipt {
            let inner = self.clone();
            tokio::spawn(async move { inner.send_receipt(id).await });
        }
        if !listed || outcome == MergeOutcome::NotLoaded {
            self.spawn_inbox_reload();
        }
    }

    fn spawn_inbox_reload(self: &Arc<Self>) {
        let inner = self.clone();
        tokio::spawn(async move {
            let live = inner.live.clone();
            inner.load_inbox(false, &live).await;
        });
    }

    async fn send_receipt(&self, id: ConversationId) {
        if let Err(e) = self.ctx.api.mark_read(id).await {
            tracing::warn!("Read receipt for {} failed: {}", id, e);
        }
    }

    async fn refresh_with(&self, live: &Liveness) {
        self.load_summary(live).await;
        self.load_inbox(false, live).await;
        if let Some((id, generation)) = self.open_selection() {
            self.reload(id, generation, live, Receipt::Always).await;
        }
    }

    /// 選択中の会話を再取得し、`receipt` に従って既読通知を送る
    async fn reload(
        &self,
        id: ConversationId,
        generation: u64,
        live: &Liveness,
        receipt: Receipt,
    ) {
        let messages = match self.ctx.api.list_messages(id).await {
            Ok(messages) => messages,
            Err(e) => {
                report(&*self.ctx.notifier, "Could not load messages", &e);
                return;
            }
        };
        let receipt = {
            let mut state = lock(&self.state);
            if !self.is_live(live) || !state.panel.is_current(generation) {
                return;
            }
            let unseen = messages
                .iter()
                .any(|m| !m.sender_role.is_staff() && !state.store.contains(id, m.id));
            state.store.replace(id, messages);
            receipt == Receipt::Always || unseen
        };
        self.revision.bump();
        if receipt {
            self.send_receipt(id).await;
        }
    }

    async fn catch_up(&self) {
        self.subscriptions.lock().await.rejoin_all().await;
        self.reconcile_groups(None).await;
        let live = self.live.clone();
        self.refresh_with(&live).await;
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.live.kill();
        let attachments = self
            .attachments
            .get_mut()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        attachments.detach(&*self.ctx.channel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{ConnectionState, HubMethod, NoticeLevel, SenderRole},
        testing::{
            FakeApi, FakeChannel, RecordingNotifier, inbox_entry, message, wait_until, within,
        },
    };
    use std::time::Duration;
    use tokio::sync::Notify;

    struct Harness {
        api: Arc<FakeApi>,
        channel: Arc<FakeChannel>,
        notifier: Arc<RecordingNotifier>,
        view: SecretaryInboxView,
    }

    fn harness(state: ConnectionState) -> Harness {
        harness_with(state, Duration::from_secs(6))
    }

    fn harness_with(state: ConnectionState, poll_interval: Duration) -> Harness {
        let api = Arc::new(FakeApi::default());
        *api.sender_role.lock().unwrap() = SenderRole::Secretary;
        let channel = FakeChannel::new(state);
        let notifier = Arc::new(RecordingNotifier::default());
        let ctx = ViewContext {
            api: api.clone(),
            channel: channel.clone(),
            notifier: notifier.clone(),
            poll_interval,
        };
        Harness {
            api,
            channel,
            notifier,
            view: SecretaryInboxView::new(ctx),
        }
    }

    fn ids(entries: &[Conversation]) -> Vec<i64> {
        entries.iter().map(|c| c.id.value()).collect()
    }

    #[tokio::test]
    async fn test_mount_selects_first_entry() {
        // テスト項目: 初回の受信箱読み込みで先頭の会話が自動的に選択される
        // given (前提条件):
        let h = harness(ConnectionState::Connected);
        h.api
            .set_inbox(InboxTab::Open, vec![inbox_entry(41, 2), inbox_entry(42, 0)]);

        // when (操作):
        h.view.mount().await;

        // then (期待する結果):
        assert_eq!(h.view.selected(), Some(ConversationId::new(41)));
        assert_eq!(h.view.phase(), PanelPhase::Open);
        assert_eq!(h.view.entry(ConversationId::new(41)).unwrap().unread_count, 0);
        assert_eq!(h.api.count_calls("mark_read:41"), 1);
        assert_eq!(h.channel.invoked(HubMethod::JoinConversation), vec![41]);
    }

    #[tokio::test]
    async fn test_hello_in_other_conversation() {
        // テスト項目: 別の会話に患者から "Hello" が届くと先頭に移動し未読 1 になり、開くと 0 になって既読が送られる
        // given (前提条件):
        let h = harness(ConnectionState::Connected);
        h.api
            .set_inbox(InboxTab::Open, vec![inbox_entry(41, 0), inbox_entry(42, 0)]);
        h.view.mount().await;
        let hello = message(7, 42, SenderRole::Patient, "Hello");
        h.api.push_message(hello.clone());
        h.api
            .set_inbox(InboxTab::Open, vec![inbox_entry(42, 1), inbox_entry(41, 0)]);

        // when (操作):
        h.channel.emit(PushEvent::Message(hello));
        assert_eq!(ids(&h.view.inbox()), vec![42, 41]);
        wait_until(|| {
            h.view
                .entry(ConversationId::new(42))
                .is_some_and(|c| c.unread_count == 1)
        })
        .await;
        let selected = h.view.select(ConversationId::new(42)).await;

        // then (期待する結果):
        assert!(selected);
        assert_eq!(ids(&h.view.inbox())[0], 42);
        assert_eq!(h.view.entry(ConversationId::new(42)).unwrap().unread_count, 0);
        assert_eq!(h.api.count_calls("mark_read:42"), 1);
        assert_eq!(
            h.view.messages().iter().map(|m| m.text.as_str()).collect::<Vec<_>>(),
            vec!["Hello"]
        );
        assert_eq!(h.channel.invoked(HubMethod::LeaveConversation), vec![41]);
        assert_eq!(h.channel.invoked(HubMethod::JoinConversation), vec![41, 42]);
        assert_eq!(h.notifier.alert_count(), 1);
    }

    #[tokio::test]
    async fn test_message_in_selected_conversation_sends_receipt() {
        // テスト項目: 選択中の会話に患者からメッセージが届くと追加され既読が送られる
        // given (前提条件):
        let h = harness(ConnectionState::Connected);
        h.api.set_inbox(InboxTab::Open, vec![inbox_entry(41, 0)]);
        h.view.mount().await;

        // when (操作):
        h.channel
            .emit(PushEvent::Message(message(8, 41, SenderRole::Patient, "Thanks")));
        wait_until(|| h.api.count_calls("mark_read:41") == 2).await;

        // then (期待する結果):
        assert_eq!(h.view.messages().len(), 1);
        assert_eq!(h.view.unseen(), 0);
    }

    #[tokio::test]
    async fn test_set_tab_clears_selection_and_reloads() {
        // テスト項目: タブを切り替えると選択が解除され、新しいタブが読み込まれる
        // given (前提条件):
        let h = harness(ConnectionState::Connected);
        h.api.set_inbox(InboxTab::Open, vec![inbox_entry(41, 0)]);
        h.api.set_inbox(InboxTab::Closed, vec![inbox_entry(30, 0)]);
        h.view.mount().await;

        // when (操作):
        h.view.set_tab(InboxTab::Closed).await;

        // then (期待する結果):
        assert_eq!(h.view.tab(), InboxTab::Closed);
        assert_eq!(ids(&h.view.inbox()), vec![30]);
        assert_eq!(h.view.selected(), Some(ConversationId::new(30)));
        assert_eq!(h.channel.invoked(HubMethod::LeaveConversation), vec![41]);
        assert_eq!(h.channel.invoked(HubMethod::JoinConversation), vec![41, 30]);
    }

    #[tokio::test]
    async fn test_close_selection_leaves_group() {
        // テスト項目: 選択を閉じるとグループから退出し、会話の内容が破棄される
        // given (前提条件):
        let h = harness(ConnectionState::Connected);
        h.api.set_inbox(InboxTab::Open, vec![inbox_entry(41, 0)]);
        h.view.mount().await;

        // when (操作):
        let closed = h.view.close_selection().await;

        // then (期待する結果):
        assert!(closed);
        assert_eq!(h.view.selected(), None);
        assert_eq!(h.view.phase(), PanelPhase::Closed);
        assert!(h.view.messages().is_empty());
        assert_eq!(h.channel.invoked(HubMethod::LeaveConversation), vec![41]);
    }

    #[tokio::test]
    async fn test_unread_summary_push_reloads_inbox() {
        // テスト項目: 未読サマリーが変わると受信箱が再読み込みされる
        // given (前提条件):
        let h = harness(ConnectionState::Connected);
        h.view.mount().await;
        h.api.set_inbox(InboxTab::Open, vec![inbox_entry(50, 3)]);

        // when (操作):
        h.channel
            .emit(PushEvent::Unread(UnreadSummary::staff(3, 1)));
        wait_until(|| h.view.entry(ConversationId::new(50)).is_some()).await;

        // then (期待する結果):
        assert_eq!(h.view.summary(), UnreadSummary::staff(3, 1));
        assert_eq!(h.view.unseen(), 3);
        assert_eq!(h.view.selected(), None);
        assert_eq!(h.notifier.alert_count(), 1);
    }

    #[tokio::test]
    async fn test_set_availability_notice() {
        // テスト項目: 対応可否を切り替えると結果が記録され、案内が表示される
        // given (前提条件):
        let h = harness(ConnectionState::Connected);
        h.view.mount().await;

        // when (操作):
        let away = h.view.set_availability(false).await;

        // then (期待する結果):
        assert!(away.is_ok());
        assert_eq!(h.view.available(), Some(false));
        let notices = h.notifier.notices.lock().unwrap().clone();
        assert_eq!(notices, vec![Notice::info("You are now away")]);
        assert_eq!(notices[0].level, NoticeLevel::Info);
    }

    #[tokio::test]
    async fn test_send_reply_refreshes_inbox() {
        // テスト項目: 返信すると会話に 1 件追加され、受信箱が再読み込みされる
        // given (前提条件):
        let h = harness(ConnectionState::Connected);
        h.api.set_inbox(InboxTab::Open, vec![inbox_entry(41, 0)]);
        h.view.mount().await;

        // when (操作):
        let sent = h.view.send(" On my way ").await;

        // then (期待する結果):
        assert!(sent.is_ok());
        assert_eq!(h.view.messages().len(), 1);
        assert_eq!(h.api.count_calls("send:41:On my way"), 1);
        assert_eq!(h.api.count_calls("inbox:open"), 2);
        assert_eq!(h.api.count_calls("mark_read:41"), 1);
    }

    #[tokio::test]
    async fn test_failed_select_clears_selection() {
        // テスト項目: 会話の読み込みに失敗すると選択が解除され通知が出る
        // given (前提条件):
        let h = harness(ConnectionState::Connected);
        h.view.mount().await;
        h.api
            .set_inbox(InboxTab::Open, vec![inbox_entry(41, 0)]);
        *h.api.fail_list.lock().unwrap() = Some(ApiError::Unauthorized("expired".to_string()));

        // when (操作):
        let selected = h.view.select(ConversationId::new(41)).await;

        // then (期待する結果):
        assert!(!selected);
        assert_eq!(h.view.selected(), None);
        assert_eq!(h.view.phase(), PanelPhase::Closed);
        assert_eq!(h.notifier.notice_messages().len(), 1);
    }

    #[tokio::test]
    async fn test_unmount_leaves_selected_group() {
        // テスト項目: アンマウントすると選択中の会話のグループから退出しハンドラが外れる
        // given (前提条件):
        let h = harness(ConnectionState::Connected);
        h.api.set_inbox(InboxTab::Open, vec![inbox_entry(41, 0)]);
        h.view.mount().await;

        // when (操作):
        h.view.unmount().await;

        // then (期待する結果):
        assert_eq!(h.channel.handler_count(), 0);
        assert_eq!(h.channel.invoked(HubMethod::LeaveConversation), vec![41]);
        assert_eq!(h.view.selected(), None);
    }

    #[tokio::test]
    async fn test_close_racing_failed_reselect_still_leaves() {
        // テスト項目: join 待ちの間に選択を閉じ、選び直しが失敗しても、最終的にグループから退出している
        // given (前提条件):
        let h = harness(ConnectionState::Connected);
        h.view.mount().await;
        let join_gate = Arc::new(Notify::new());
        *h.channel.join_gate.lock().unwrap() = Some(join_gate.clone());
        let view = h.view.clone();
        let first = tokio::spawn(async move { view.select(ConversationId::new(41)).await });
        wait_until(|| h.channel.invoked(HubMethod::JoinConversation) == vec![41]).await;

        // when (操作):
        let view = h.view.clone();
        let closing = tokio::spawn(async move { view.close_selection().await });
        wait_until(|| h.view.phase() == PanelPhase::Closing).await;
        *h.api.fail_list.lock().unwrap() = Some(ApiError::Transport("down".to_string()));
        let view = h.view.clone();
        let reselect = tokio::spawn(async move { view.select(ConversationId::new(41)).await });
        wait_until(|| h.view.phase() == PanelPhase::Opening).await;
        join_gate.notify_one();

        // then (期待する結果):
        assert!(!within(first).await.unwrap());
        assert!(within(closing).await.unwrap());
        assert!(!within(reselect).await.unwrap());
        assert_eq!(h.view.phase(), PanelPhase::Closed);
        assert_eq!(h.view.selected(), None);
        assert_eq!(h.channel.invoked(HubMethod::JoinConversation), vec![41]);
        assert_eq!(h.channel.invoked(HubMethod::LeaveConversation), vec![41]);
        assert_eq!(h.api.count_calls("mark_read:41"), 0);
        assert!(h.view.inner.subscriptions.lock().await.joined().is_empty());
    }

    #[tokio::test]
    async fn test_poll_ticks_resend_receipt_for_selection() {
        // テスト項目: 選択中の会話の既読通知が失敗しても、ポーリングのたびに送り直される
        // given (前提条件):
        let h = harness_with(ConnectionState::Disconnected, Duration::from_millis(50));
        h.api.set_inbox(InboxTab::Open, vec![inbox_entry(41, 1)]);
        *h.api.fail_read.lock().unwrap() = Some(ApiError::Transport("down".to_string()));

        // when (操作):
        h.view.mount().await;
        assert_eq!(h.api.count_calls("mark_read:41"), 1);
        wait_until(|| h.api.count_calls("mark_read:41") >= 3).await;

        // then (期待する結果):
        assert_eq!(h.view.phase(), PanelPhase::Open);
        assert_eq!(h.view.selected(), Some(ConversationId::new(41)));
        assert_eq!(h.channel.reconnect_requests(), 1);
        assert!(h.channel.invoked(HubMethod::JoinConversation).is_empty());
    }
}
