//! ヘッダーの未読バッジ
//!
//! ロールの未読サマリーを表示します。バッジ自身はパネルを持たず、埋め込みの
//! チャットランチャーと並んでいるときはランチャーの開閉フラグで通知を抑止します。

use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use crate::{
    domain::{AlertSource, PushEvent, PushEventKind, UnreadSummary},
    lock::lock,
    service::{Liveness, NotificationDispatcher},
};

use super::{
    Attachments, OpenState, Revision, ViewContext, on_reconnect, register, report, start_poller,
};

#[derive(Clone)]
pub struct HeaderBadgeView {
    inner: Arc<Inner>,
}

struct Inner {
    ctx: ViewContext,
    launcher: OpenState,
    state: Mutex<State>,
    attachments: Mutex<Attachments>,
    live: Liveness,
    revision: Revision,
}

struct State {
    summary: UnreadSummary,
    dispatcher: NotificationDispatcher,
}

impl HeaderBadgeView {
    pub fn new(ctx: ViewContext, launcher: OpenState) -> Self {
        let dispatcher =
            NotificationDispatcher::new(AlertSource::HeaderBadge, ctx.notifier.clone());
        Self {
            inner: Arc::new(Inner {
                ctx,
                launcher,
                state: Mutex::new(State {
                    summary: UnreadSummary::default(),
                    dispatcher,
                }),
                attachments: Mutex::new(Attachments::default()),
                live: Liveness::new(),
                revision: Revision::new(),
            }),
        }
    }

    pub async fn mount(&self) {
        let inner = &self.inner;
        if !inner.live.is_live() {
            return;
        }
        {
            let mut attachments = lock(&inner.attachments);
            if attachments.is_attached() {
                return;
            }
            let channel = &*inner.ctx.channel;
            let weak = Arc::downgrade(inner);
            let id = register(channel, PushEventKind::Unread, weak.clone(), |inner, event| {
                if let PushEvent::Unread(summary) = event {
                    inner.apply(*summary);
                }
            });
            attachments.handler(PushEventKind::Unread, id);
            attachments.poller(start_poller(
                &inner.ctx,
                weak.clone(),
                |inner, live| async move { inner.refresh_with(&live).await },
            ));
            attachments.task(on_reconnect(
                channel.watch_state(),
                weak,
                |inner| async move {
                    let live = inner.live.clone();
                    inner.refresh_with(&live).await
                },
            ));
        }

        match inner.ctx.api.unread_summary().await {
            Ok(summary) => {
                let mut state = lock(&inner.state);
                if !inner.live.is_live() {
                    tracing::debug!("Header badge unmounted while loading, dropping summary");
                    return;
                }
                state.summary = summary;
                state.dispatcher.prime(summary.unread_messages);
            }
            Err(e) => report(&*inner.ctx.notifier, "Could not load unread summary", &e),
        }
        inner.revision.bump();
    }

    pub async fn refresh(&self) {
        let live = self.inner.live.clone();
        self.inner.refresh_with(&live).await;
    }

    pub fn unmount(&self) {
        let inner = &self.inner;
        inner.live.kill();
        lock(&inner.attachments).detach(&*inner.ctx.channel);
    }

    pub fn summary(&self) -> UnreadSummary {
        lock(&self.inner.state).summary
    }

    /// バッジの表示文字列。`3`、会話数も数えるロールでは `3 (2)`
    pub fn display(&self) -> String {
        let summary = self.summary();
        match summary.unread_conversations {
            Some(conversations) => format!("{} ({})", summary.unread_messages, conversations),
            None => summary.unread_messages.to_string(),
        }
    }

    pub fn subscribe_revisions(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }
}

impl Inner {
    fn apply(&self, summary: UnreadSummary) {
        {
            let mut state = lock(&self.state);
            if !self.live.is_live() {
                return;
            }
            state.summary = summary;
            let launcher_open = self.launcher.parent_open();
            state.dispatcher.observe(summary.unread_messages, launcher_open);
        }
        self.revision.bump();
    }

    async fn refresh_with(&self, live: &Liveness) {
        match self.ctx.api.unread_summary().await {
            Ok(summary) if live.is_live() => self.apply(summary),
            Ok(_) => {}
            Err(e) => report(&*self.ctx.notifier, "Could not load unread summary", &e),
        }
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
