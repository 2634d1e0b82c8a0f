//! End-to-end tests: the sync views against a running stub server.

use std::{
    future::Future,
    sync::{Arc, Mutex},
    time::Duration,
};

use clinic_chat_stub_server::{RunningServer, StubServer, auth::Caller};
use clinic_chat_sync::{
    OpenState, PatientChatView, SecretaryInboxView, SyncConfig, ViewContext,
    domain::{
        Alert, ChatApi, ConversationId, Message, Notice, Notifier, PushChannel, TokenProvider,
    },
    infrastructure::{
        api::HttpChatApi,
        push_channel::{ChannelConfig, ConnectionManager},
        token::StaticToken,
    },
    view::PanelPhase,
};

#[derive(Default)]
struct RecordingNotifier {
    alerts: Mutex<Vec<Alert>>,
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    fn alert_count(&self) -> usize {
        self.alerts.lock().unwrap().len()
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

/// One signed-in user: REST client, push channel and notifier
struct Session {
    api: Arc<HttpChatApi>,
    channel: ConnectionManager,
    notifier: Arc<RecordingNotifier>,
    config: SyncConfig,
}

impl Session {
    fn new(server: &RunningServer, token: &str, poll_interval: Duration) -> Self {
        Self::at(&server.api_url(), token, poll_interval)
    }

    fn at(api_url: &str, token: &str, poll_interval: Duration) -> Self {
        let mut config = SyncConfig::for_api_url(api_url).unwrap();
        config.poll_interval = poll_interval;
        config.reconnect_interval = Duration::from_millis(100);
        let token: Arc<dyn TokenProvider> = Arc::new(StaticToken::new(token));
        Self {
            api: Arc::new(HttpChatApi::new(config.api_url.clone(), token.clone())),
            channel: ConnectionManager::new(ChannelConfig::from(&config), token),
            notifier: Arc::new(RecordingNotifier::default()),
            config,
        }
    }

    fn context(&self) -> ViewContext {
        ViewContext::new(
            self.api.clone(),
            Arc::new(self.channel.clone()),
            self.notifier.clone(),
            &self.config,
        )
    }
}

async fn start_server() -> RunningServer {
    StubServer::seeded().spawn("127.0.0.1:0").await.unwrap()
}

/// Poll an async condition until it holds, failing after five seconds
async fn eventually<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition().await {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 5s"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

fn texts(messages: &[Message]) -> Vec<String> {
    messages.iter().map(|m| m.text.clone()).collect()
}

/// Read receipts the server recorded for `caller` in `conversation`
async fn receipt_count(server: &RunningServer, caller: Caller, conversation: i64) -> usize {
    server
        .state()
        .clinic
        .lock()
        .await
        .receipts()
        .iter()
        .filter(|(c, id)| *c == caller && *id == conversation)
        .count()
}

#[tokio::test]
async fn test_hello_reaches_secretary_inbox_and_reply_reaches_patient() {
    // テスト項目: 患者の "Hello" が秘書の受信箱に届き、開くと既読になり、返信が患者に届く
    // given (前提条件):
    let server = start_server().await;
    let secretary = Session::new(&server, "secretary:5", Duration::from_secs(60));
    let patient = Session::new(&server, "patient:1", Duration::from_secs(60));
    secretary.channel.connect().await.unwrap();
    patient.channel.connect().await.unwrap();

    let inbox = SecretaryInboxView::new(secretary.context());
    inbox.mount().await;
    assert_eq!(inbox.selected(), Some(ConversationId::new(41)));
    let widget = PatientChatView::new(patient.context(), OpenState::Internal);
    widget.mount().await;
    assert!(widget.open_panel().await);
    assert_eq!(widget.phase(), PanelPhase::Open);

    // when (操作):
    widget.send("Hello").await.unwrap();
    eventually(|| {
        let entry = inbox.entry(ConversationId::new(42));
        async move { entry.is_some_and(|c| c.unread_count == 1) }
    })
    .await;
    let selected = inbox.select(ConversationId::new(42)).await;

    // then (期待する結果):
    assert!(selected);
    assert_eq!(inbox.inbox()[0].id, ConversationId::new(42));
    assert_eq!(texts(&inbox.messages()), vec!["Hello"]);
    eventually(|| async { receipt_count(&server, Caller::secretary(5), 42).await == 1 }).await;
    assert!(secretary.notifier.alert_count() >= 1);
    assert_eq!(server.state().hub.group_size(41).await, 0);
    assert_eq!(server.state().hub.group_size(42).await, 2);

    // when (操作):
    inbox.send("Hi, how can we help?").await.unwrap();

    // then (期待する結果):
    eventually(|| {
        let messages = widget.messages();
        async move { texts(&messages) == vec!["Hello", "Hi, how can we help?"] }
    })
    .await;
    eventually(|| async { receipt_count(&server, Caller::patient(1), 42).await >= 2 }).await;
    assert_eq!(widget.unread(), 0);

    widget.unmount().await;
    inbox.unmount().await;
    patient.channel.dispose();
    secretary.channel.dispose();
}

#[tokio::test]
async fn test_polling_only_session_still_syncs() {
    // テスト項目: プッシュチャネルに接続しなくてもポーリングで新しいメッセージが届く
    // given (前提条件):
    let server = start_server().await;
    let patient = Session::new(&server, "patient:1", Duration::from_millis(100));
    let secretary = Session::new(&server, "secretary:5", Duration::from_secs(60));
    let widget = PatientChatView::new(patient.context(), OpenState::Internal);
    widget.mount().await;
    assert!(widget.open_panel().await);

    // when (操作):
    secretary
        .api
        .send_message(ConversationId::new(42), "Your results are ready")
        .await
        .unwrap();

    // then (期待する結果):
    eventually(|| {
        let messages = widget.messages();
        async move { texts(&messages) == vec!["Your results are ready"] }
    })
    .await;
    eventually(|| async { receipt_count(&server, Caller::patient(1), 42).await >= 2 }).await;
    assert!(!patient.channel.is_connected());
    assert_eq!(server.state().hub.connection_count().await, 0);

    widget.unmount().await;
}

#[tokio::test]
async fn test_reconnect_rejoins_open_conversation() {
    // テスト項目: サーバーが接続を切断しても再接続後に会話グループへ再参加し、プッシュが届く
    // given (前提条件):
    let server = start_server().await;
    let patient = Session::new(&server, "patient:1", Duration::from_secs(60));
    let secretary = Session::new(&server, "secretary:5", Duration::from_secs(60));
    patient.channel.connect().await.unwrap();
    let widget = PatientChatView::new(patient.context(), OpenState::Internal);
    widget.mount().await;
    assert!(widget.open_panel().await);
    let hub = &server.state().hub;
    assert_eq!(hub.group_size(42).await, 1);
    let opened = hub.connections_opened();

    // when (操作):
    assert_eq!(hub.drop_all().await, 1);
    eventually(|| async {
        hub.connections_opened() > opened
            && hub.connection_count().await == 1
            && hub.group_size(42).await == 1
    })
    .await;
    secretary
        .api
        .send_message(ConversationId::new(42), "Back online")
        .await
        .unwrap();

    // then (期待する結果):
    eventually(|| {
        let messages = widget.messages();
        async move { texts(&messages) == vec!["Back online"] }
    })
    .await;
    assert!(patient.channel.is_connected());

    widget.unmount().await;
    patient.channel.dispose();
}

#[tokio::test]
async fn test_failing_group_calls_do_not_break_the_widget() {
    // テスト項目: ハブの join / leave が失敗しても、パネルは開閉でき、会話と既読は正しく保たれる
    // given (前提条件):
    let server = start_server().await;
    let hub = &server.state().hub;
    hub.set_fail_invocations(true);
    let patient = Session::new(&server, "patient:1", Duration::from_secs(60));
    let secretary = Session::new(&server, "secretary:5", Duration::from_secs(60));
    patient.channel.connect().await.unwrap();
    let widget = PatientChatView::new(patient.context(), OpenState::Internal);
    widget.mount().await;

    // when (操作):
    assert!(widget.open_panel().await);
    secretary
        .api
        .send_message(ConversationId::new(42), "Your results are ready")
        .await
        .unwrap();

    // then (期待する結果):
    assert_eq!(widget.phase(), PanelPhase::Open);
    assert_eq!(hub.group_size(42).await, 0);
    eventually(|| {
        let messages = widget.messages();
        async move { texts(&messages) == vec!["Your results are ready"] }
    })
    .await;
    eventually(|| async { receipt_count(&server, Caller::patient(1), 42).await >= 2 }).await;
    assert_eq!(widget.unread(), 0);

    // when (操作):
    assert!(widget.close_panel().await);
    secretary
        .api
        .send_message(ConversationId::new(42), "Please call us")
        .await
        .unwrap();
    eventually(|| async { patient.api.unread_summary().await.is_ok_and(|s| s.unread_messages == 1) })
        .await;
    assert!(widget.open_panel().await);

    // then (期待する結果):
    assert_eq!(
        texts(&widget.messages()),
        vec!["Your results are ready", "Please call us"]
    );
    assert!(patient.notifier.notices.lock().unwrap().is_empty());
    assert!(patient.channel.is_connected());

    widget.unmount().await;
    patient.channel.dispose();
}

#[tokio::test]
async fn test_open_reconnects_after_failed_initial_connect() {
    // テスト項目: 起動時にハブへ接続できなくても、サーバーが起動した後にパネルを開くとプッシュが復旧する
    // given (前提条件):
    let addr = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap();
    let patient = Session::at(&format!("http://{}/api", addr), "patient:1", Duration::from_secs(60));
    assert!(patient.channel.connect().await.is_err());
    let server = StubServer::seeded().spawn(&addr.to_string()).await.unwrap();
    let secretary = Session::new(&server, "secretary:5", Duration::from_secs(60));
    let widget = PatientChatView::new(patient.context(), OpenState::Internal);
    widget.mount().await;

    // when (操作):
    assert!(widget.open_panel().await);

    // then (期待する結果):
    let hub = &server.state().hub;
    eventually(|| async { patient.channel.is_connected() && hub.group_size(42).await == 1 }).await;
    secretary
        .api
        .send_message(ConversationId::new(42), "Welcome back")
        .await
        .unwrap();
    eventually(|| {
        let messages = widget.messages();
        async move { texts(&messages) == vec!["Welcome back"] }
    })
    .await;

    widget.unmount().await;
    patient.channel.dispose();
}
