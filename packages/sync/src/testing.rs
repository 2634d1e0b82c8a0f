//! ビューとサービスのテスト用の手書き fake
//!
//! 呼び出し回数を厳密に検証したい箇所では `MockPushChannel` (mockall) を使います。
//! ビューのテストにはハンドラを保持してイベントを発火できるチャネルが必要なので、
//! [`FakeChannel`] を使います。

use std::{
    collections::HashMap,
    future::Future,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::Value;
use tokio::sync::{Notify, watch};

use crate::domain::{
    Alert, ApiError, Availability, ChatApi, ConnectionState, Conversation, ConversationId,
    ConversationStatus, EventHandler, HandlerId, HubMethod, InboxTab, InvokeError, Message,
    MessageId, Notice, Notifier, PushChannel, PushEvent, PushEventKind, SenderRole,
    StartedConversation, UnreadSummary,
};

// ========================================
// Notifier
// ========================================

#[derive(Default)]
pub(crate) struct RecordingNotifier {
    pub alerts: Mutex<Vec<Alert>>,
    pub notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn alert_count(&self) -> usize {
        self.alerts.lock().unwrap().len()
    }

    pub fn notice_messages(&self) -> Vec<String> {
        self.notices
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.message.clone())
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn alert(&self, alert: Alert) {
        self.alerts.lock().unwrap().push(alert);
    }

    fn notice(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}

// ========================================
// PushChannel
// ========================================

pub(crate) struct FakeChannel {
    state: watch::Sender<ConnectionState>,
    handlers: Mutex<Vec<(PushEventKind, HandlerId, EventHandler)>>,
    next_id: AtomicU64,
    invocations: Mutex<Vec<(HubMethod, Vec<Value>)>>,
    /// 次の JoinConversation を notify されるまで止める
    pub join_gate: Mutex<Option<Arc<Notify>>>,
    /// `request_reconnect` で切断中のチャネルを `Connected` にする
    pub reconnects: AtomicBool,
    reconnect_requests: AtomicUsize,
}

impl FakeChannel {
    pub fn new(state: ConnectionState) -> Arc<Self> {
        let (state, _) = watch::channel(state);
        Arc::new(Self {
            state,
            handlers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            invocations: Mutex::new(Vec::new()),
            join_gate: Mutex::new(None),
            reconnects: AtomicBool::new(false),
            reconnect_requests: AtomicUsize::new(0),
        })
    }

    pub fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    pub fn emit(&self, event: PushEvent) {
        let handlers: Vec<EventHandler> = self
            .handlers
            .lock()
            .unwrap()
            .iter()
            .filter(|(kind, _, _)| *kind == event.kind())
            .map(|(_, _, handler)| handler.clone())
            .collect();
        for handler in handlers {
            handler(&event);
        }
    }

    pub fn reconnect_requests(&self) -> usize {
        self.reconnect_requests.load(Ordering::SeqCst)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.lock().unwrap().len()
    }

    /// `method` に渡された会話 ID（呼び出し順）
    pub fn invoked(&self, method: HubMethod) -> Vec<i64> {
        self.invocations
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| *m == method)
            .filter_map(|(_, args)| args.first().and_then(Value::as_i64))
            .collect()
    }
}

#[async_trait]
impl PushChannel for FakeChannel {
    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    fn on(&self, kind: PushEventKind, handler: EventHandler) -> HandlerId {
        let id = HandlerId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.handlers.lock().unwrap().push((kind, id, handler));
        id
    }

    fn off(&self, kind: PushEventKind, id: HandlerId) {
        self.handlers
            .lock()
            .unwrap()
            .retain(|(k, h, _)| !(*k == kind && *h == id));
    }

    fn request_reconnect(&self) {
        self.reconnect_requests.fetch_add(1, Ordering::SeqCst);
        if self.reconnects.load(Ordering::SeqCst)
            && self.state() == ConnectionState::Disconnected
        {
            self.set_state(ConnectionState::Connected);
        }
    }

    async fn invoke(&self, method: HubMethod, arguments: Vec<Value>) -> Result<(), InvokeError> {
        if !self.is_connected() {
            return Err(InvokeError::NotConnected);
        }
        self.invocations.lock().unwrap().push((method, arguments));
        if method == HubMethod::JoinConversation {
            let gate = self.join_gate.lock().unwrap().take();
            if let Some(gate) = gate {
                gate.notified().await;
            }
        }
        Ok(())
    }
}

// ========================================
// ChatApi
// ========================================

pub(crate) struct FakeApi {
    pub started: Mutex<StartedConversation>,
    pub start_gate: Mutex<Option<Arc<Notify>>>,
    pub transcripts: Mutex<HashMap<ConversationId, Vec<Message>>>,
    pub unread: Mutex<UnreadSummary>,
    pub inbox: Mutex<HashMap<InboxTab, Vec<Conversation>>>,
    pub sender_role: Mutex<SenderRole>,
    pub fail_send: Mutex<Option<ApiError>>,
    pub fail_list: Mutex<Option<ApiError>>,
    pub fail_read: Mutex<Option<ApiError>>,
    pub unread_gate: Mutex<Option<Arc<Notify>>>,
    calls: Mutex<Vec<String>>,
    start_calls: AtomicUsize,
    next_message_id: AtomicI64,
}

impl Default for FakeApi {
    fn default() -> Self {
        Self {
            started: Mutex::new(StartedConversation {
                conversation_id: ConversationId::new(42),
                status: ConversationStatus::Open,
                has_secretary: true,
                info_message: None,
            }),
            start_gate: Mutex::new(None),
            transcripts: Mutex::new(HashMap::new()),
            unread: Mutex::new(UnreadSummary::default()),
            inbox: Mutex::new(HashMap::new()),
            sender_role: Mutex::new(SenderRole::Patient),
            fail_send: Mutex::new(None),
            fail_list: Mutex::new(None),
            fail_read: Mutex::new(None),
            unread_gate: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            start_calls: AtomicUsize::new(0),
            next_message_id: AtomicI64::new(1000),
        }
    }
}

impl FakeApi {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count_calls(&self, call: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == call).count()
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn set_unread(&self, summary: UnreadSummary) {
        *self.unread.lock().unwrap() = summary;
    }

    pub fn set_inbox(&self, tab: InboxTab, entries: Vec<Conversation>) {
        self.inbox.lock().unwrap().insert(tab, entries);
    }

    pub fn push_message(&self, message: Message) {
        self.transcripts
            .lock()
            .unwrap()
            .entry(message.conversation_id)
            .or_default()
            .push(message);
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ChatApi for FakeApi {
    async fn start_conversation(&self) -> Result<StartedConversation, ApiError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        self.record("start".to_string());
        let gate = self.start_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(self.started.lock().unwrap().clone())
    }

    async fn list_messages(&self, id: ConversationId) -> Result<Vec<Message>, ApiError> {
        self.record(format!("list:{}", id));
        if let Some(error) = self.fail_list.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(self
            .transcripts
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap_or_default())
    }

    async fn send_message(&self, id: ConversationId, text: &str) -> Result<Message, ApiError> {
        self.record(format!("send:{}:{}", id, text));
        if let Some(error) = self.fail_send.lock().unwrap().clone() {
            return Err(error);
        }
        let message_id = self.next_message_id.fetch_add(1, Ordering::SeqCst);
        let role = self.sender_role.lock().unwrap().clone();
        let message = message(message_id, id.value(), role, text);
        self.push_message(message.clone());
        Ok(message)
    }

    async fn mark_read(&self, id: ConversationId) -> Result<(), ApiError> {
        self.record(format!("mark_read:{}", id));
        match self.fail_read.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn unread_summary(&self) -> Result<UnreadSummary, ApiError> {
        self.record("unread".to_string());
        let gate = self.unread_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(*self.unread.lock().unwrap())
    }

    async fn staff_inbox(&self, tab: InboxTab) -> Result<Vec<Conversation>, ApiError> {
        self.record(format!("inbox:{}", tab));
        Ok(self
            .inbox
            .lock()
            .unwrap()
            .get(&tab)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_availability(&self, available: bool) -> Result<Availability, ApiError> {
        self.record(format!("availability:{}", available));
        Ok(Availability {
            secretary_id: Some(5),
            is_available: available,
            updated_at: None,
        })
    }
}

// ========================================
// Fixtures
// ========================================

pub(crate) fn message(id: i64, conversation: i64, role: SenderRole, text: &str) -> Message {
    Message {
        id: MessageId::new(id),
        conversation_id: ConversationId::new(conversation),
        sender_role: role,
        sender_user_id: None,
        text: text.to_string(),
        sent_at: Utc.timestamp_opt(1_700_000_000 + id, 0).unwrap(),
        read_at: None,
    }
}

pub(crate) fn inbox_entry(id: i64, unread: u32) -> Conversation {
    Conversation {
        id: ConversationId::new(id),
        patient_id: Some(id * 10),
        counterpart_name: format!("patient-{}", id),
        status: ConversationStatus::Open,
        assigned_staff_id: Some(5),
        created_at: None,
        closed_at: None,
        last_message_at: Some(Utc.timestamp_opt(1_700_000_000 - id, 0).unwrap()),
        unread_count: unread,
    }
}

/// `condition` が成り立つまで待つ。5 秒を過ぎたらテストを失敗させる
pub(crate) async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 5s"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// `future` を待つ。5 秒を過ぎたらテストを失敗させる
pub(crate) async fn within<T>(future: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("future completed within 5s")
}
