//! 患者のチャットウィジェット
//!
//! 会話はセッションにつき 1 つで、最初に開いたときに開始します。
//! 閉じている間は未読カウンターを 1 つ、開いている間は会話の内容を表示します。

use std::sync::{Arc, Mutex, Weak};

use tokio::{
    sync::{OnceCell, watch},
    task::JoinHandle,
};

use crate::{
    domain::{
        AlertSource, ApiError, ConversationId, Message, Notice, PushEvent, PushEventKind,
        SendError, SendFailure, StartedConversation,
    },
    lock::lock,
    service::{
        ConversationStore, GroupSubscriptionManager, Liveness, MergeOutcome,
        NotificationDispatcher, SingleCounter,
    },
};

use super::{
    Attachments, OpenState, Panel, PanelPhase, Receipt, Revision, ViewContext, on_reconnect,
    register, report, start_poller,
};

#[derive(Clone)]
pub struct PatientChatView {
    inner: Arc<Inner>,
}

struct Inner {
    ctx: ViewContext,
    open_state: OpenState,
    conversation: OnceCell<StartedConversation>,
    state: Mutex<State>,
    subscriptions: tokio::sync::Mutex<GroupSubscriptionManager>,
    attachments: Mutex<Attachments>,
    live: Liveness,
    revision: Revision,
}

struct State {
    counter: SingleCounter,
    store: ConversationStore,
    dispatcher: NotificationDispatcher,
    panel: Panel,
}

impl PatientChatView {
    pub fn new(ctx: ViewContext, open_state: OpenState) -> Self {
        let state = State {
            counter: SingleCounter::new(),
            store: ConversationStore::new(),
            dispatcher: NotificationDispatcher::new(
                AlertSource::PatientWidget,
                ctx.notifier.clone(),
            ),
            panel: Panel::default(),
        };
        let subscriptions = GroupSubscriptionManager::new(ctx.channel.clone());
        Self {
            inner: Arc::new(Inner {
                ctx,
                open_state,
                conversation: OnceCell::new(),
                state: Mutex::new(state),
                subscriptions: tokio::sync::Mutex::new(subscriptions),
                attachments: Mutex::new(Attachments::default()),
                live: Liveness::new(),
                revision: Revision::new(),
            }),
        }
    }

    /// プッシュチャネルに接続してポーリングを開始し、未読数を読み込む
    pub async fn mount(&self) {
        let inner = &self.inner;
        if !inner.live.is_live() {
            tracing::warn!("Patient widget already unmounted, ignoring mount");
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
                weak.clone(),
                |inner| async move { inner.catch_up().await },
            ));
            if let OpenState::External(parent) = &inner.open_state {
                attachments.task(follow_parent(parent.clone(), weak));
            }
        }
        tracing::info!("Patient widget mounted");

        match inner.ctx.api.unread_summary().await {
            Ok(summary) => {
                let mut state = lock(&inner.state);
                if !inner.live.is_live() {
                    return;
                }
                let change = state.counter.apply(summary.unread_messages);
                state.dispatcher.prime(change.current);
            }
            Err(e) => report(&*inner.ctx.notifier, "Could not load unread messages", &e),
        }
        inner.revision.bump();
    }

    /// パネルを開く。`Open` に到達したら `true` を返す
    ///
    /// 開閉フラグを埋め込み先の親が所有している場合は無視する。
    pub async fn open_panel(&self) -> bool {
        if self.inner.open_state.is_external() {
            tracing::debug!("Open state is owned by the parent, ignoring open_panel");
            return false;
        }
        self.inner.open().await
    }

    pub async fn close_panel(&self) -> bool {
        if self.inner.open_state.is_external() {
            tracing::debug!("Open state is owned by the parent, ignoring close_panel");
            return false;
        }
        self.inner.close().await
    }

    /// 開いている会話に `text` を送信する
    ///
    /// 失敗した場合は入力欄に戻すための元のテキストが返る。
    pub async fn send(&self, text: &str) -> Result<Message, SendFailure> {
        self.inner.send(text).await
    }

    /// 未読数と開いている会話を今すぐ更新する
    pub async fn refresh(&self) {
        let live = self.inner.live.clone();
        self.inner.refresh_with(&live).await;
    }

    /// チャネルから外れてポーリングを止め、参加中のグループから退出する
    pub async fn unmount(&self) {
        let inner = &self.inner;
        inner.live.kill();
        lock(&inner.attachments).detach(&*inner.ctx.channel);
        {
            let mut state = lock(&inner.state);
            state.panel.reset();
            state.counter.close_panel();
        }
        inner.subscriptions.lock().await.leave_all().await;
        inner.revision.bump();
        tracing::info!("Patient widget unmounted");
    }

    pub fn unread(&self) -> u32 {
        lock(&self.inner.state).counter.displayed()
    }

    pub fn phase(&self) -> PanelPhase {
        lock(&self.inner.state).panel.phase()
    }

    pub fn conversation(&self) -> Option<StartedConversation> {
        self.inner.conversation.get().cloned()
    }

    /// セッションの会話の内容。閉じている間は空
    pub fn messages(&self) -> Vec<Message> {
        let Some(id) = self.inner.conversation_id() else {
            return Vec::new();
        };
        lock(&self.inner.state).store.messages(id).to_vec()
    }

    pub fn subscribe_revisions(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }
}

impl Inner {
    fn conversation_id(&self) -> Option<ConversationId> {
        self.conversation.get().map(|c| c.conversation_id)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.live.is_live() && lock(&self.state).panel.is_current(generation)
    }

    fn is_live(&self, live: &Liveness) -> bool {
        self.live.is_live() && live.is_live()
    }

    /// パネルが完全に開いていれば、その会話 ID
    fn open_conversation(&self) -> Option<(ConversationId, u64)> {
        let state = lock(&self.state);
        if state.panel.phase() != PanelPhase::Open {
            return None;
        }
        self.conversation_id()
            .map(|id| (id, state.panel.generation()))
    }

    async fn start_conversation(&self) -> Result<ConversationId, ApiError> {
        let started = self
            .conversation
            .get_or_try_init(|| async {
                let started = self.ctx.api.start_conversation().await?;
                tracing::info!(
                    "Started conversation {} ({})",
                    started.conversation_id,
                    started.status
                );
                if let Some(info) = &started.info_message {
                    self.ctx.notifier.notice(Notice::info(info.clone()));
                }
                Ok::<_, ApiError>(started)
            })
            .await?;
        Ok(started.conversation_id)
    }

    async fn open(&self) -> bool {
        if !self.live.is_live() {
            return false;
        }
        self.ctx.channel.request_reconnect();
        let generation = {
            let mut state = lock(&self.state);
            if state.panel.is_active() {
                return false;
            }
            let generation = state.panel.begin_open();
            let change = state.counter.open_panel();
            state.dispatcher.observe(change.current, true);
            generation
        };
        self.revision.bump();

        let id = match self.start_conversation().await {
            Ok(id) => id,
            Err(e) => {
                self.fail_open(generation, "Could not start conversation", &e).await;
                return false;
            }
        };
        let messages = match self.ctx.api.list_messages(id).await {
            Ok(messages) => messages,
            Err(e) => {
                self.fail_open(generation, "Could not load messages", &e).await;
                return false;
            }
        };
        {
            let mut state = lock(&self.state);
            if !self.live.is_live() || !state.panel.is_current(generation) {
                tracing::debug!("Panel changed while loading conversation {}", id);
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
            tracing::info!("Conversation {} open", id);
            self.revision.bump();
        }
        opened
    }

    async fn fail_open(&self, generation: u64, context: &str, error: &ApiError) {
        {
            let mut state = lock(&self.state);
            if state.panel.abort(generation) {
                state.counter.close_panel();
            }
        }
        report(&*self.ctx.notifier, context, error);
        self.revision.bump();
        self.reconcile_groups(None).await;
    }

    /// 購読中のグループをパネルの現在の状態に合わせる
    ///
    /// 開いている (または開きかけの) 会話以外からは必ず退出する。join するのは
    /// パネルが `Open` のとき、または `opening` の世代がまだ最新のときだけ。
    async fn reconcile_groups(&self, opening: Option<u64>) {
        let mut subscriptions = self.subscriptions.lock().await;
        let (keep, join) = {
            let state = lock(&self.state);
            let keep = self
                .conversation_id()
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

    async fn close(&self) -> bool {
        let generation = {
            let mut state = lock(&self.state);
            if !state.panel.is_active() {
                return false;
            }
            state.counter.close_panel();
            state.panel.begin_close()
        };
        self.revision.bump();

        self.reconcile_groups(None).await;

        {
            let mut state = lock(&self.state);
            if state.panel.finish(generation) {
                if let Some(id) = self.conversation_id() {
                    state.store.evict(id);
                }
            }
        }
        self.revision.bump();
        true
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
        let Some((id, generation)) = self.open_conversation() else {
            return Err(failure(SendError::NoConversation));
        };

        match self.ctx.api.send_message(id, trimmed).await {
            Ok(message) => {
                {
                    let mut state = lock(&self.state);
                    if self.live.is_live() {
                        state.store.merge_append(message.clone());
                    }
                }
                self.revision.bump();
                self.reload(id, generation, &self.live, Receipt::IfUnseen).await;
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
            PushEvent::Unread(summary) => self.apply_unread(summary.unread_messages),
            PushEvent::Message(message) => self.on_message(message.clone()),
        }
    }

    fn apply_unread(&self, reported: u32) {
        {
            let mut state = lock(&self.state);
            let change = state.counter.apply(reported);
            let panel_open = state.panel.is_active();
            state.dispatcher.observe(change.current, panel_open);
        }
        self.revision.bump();
    }

    fn on_message(self: &Arc<Self>, message: Message) {
        let id = message.conversation_id;
        let staff = message.sender_role.is_staff();
        let (outcome, receipt) = {
            let mut state = lock(&self.state);
            if !self.live.is_live() {
                return;
            }
            let outcome = state.store.merge_append(message);
            let receipt = outcome == MergeOutcome::Appended && staff && state.panel.is_active();
            (outcome, receipt)
        };
        if outcome == MergeOutcome::Appended {
            self.revision.bump();
        }
        if receipt {
            let inner = self.clone();
            tokio::spawn(async move { inner.send_receipt(id).await });
        }
    }

    async fn send_receipt(&self, id: ConversationId) {
        if let Err(e) = self.ctx.api.mark_read(id).await {
            tracing::warn!("Read receipt for {} failed: {}", id, e);
        }
    }

    async fn refresh_with(&self, live: &Liveness) {
        match self.ctx.api.unread_summary().await {
            Ok(summary) if self.is_live(live) => self.apply_unread(summary.unread_messages),
            Ok(_) => return,
            Err(e) => report(&*self.ctx.notifier, "Could not load unread messages", &e),
        }
        if let Some((id, generation)) = self.open_conversation() {
            self.reload(id, generation, live, Receipt::Always).await;
        }
    }

    /// 開いている会話を再取得し、`receipt` に従って既読通知を送る
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
            let unseen_staff = messages
                .iter()
                .any(|m| m.sender_role.is_staff() && !state.store.contains(id, m.id));
            state.store.replace(id, messages);
            receipt == Receipt::Always || unseen_staff
        };
        self.revision.bump();
        if receipt {
            self.send_receipt(id).await;
        }
    }

    /// (再)接続後: グループを復元し、取りこぼしを取得する
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

/// 親の開閉フラグをパネルに反映する
fn follow_parent(mut parent: watch::Receiver<bool>, target: Weak<Inner>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let open = *parent.borrow_and_update();
            let Some(inner) = target.upgrade() else {
                break;
            };
            if open {
                inner.open().await;
            } else {
                inner.close().await;
            }
            drop(inner);
            if parent.changed().await.is_err() {
                break;
            }
        }
    })
}
