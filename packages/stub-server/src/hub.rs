//! Push hub connection registry.
//!
//! ## 責務
//!
//! - 接続ごとの送信チャネルと参加中のグループを管理する
//! - 会話グループ、ユーザー単位への配信
//! - テスト用に全接続の強制切断と invoke の失敗注入を提供する
//!
//! Every connection is implicitly in its user's group; `conv:{id}` groups
//! are joined and left explicitly by the client. A closed connection's
//! groups are forgotten with it.

use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
};

use tokio::sync::{Mutex, mpsc, oneshot};

use crate::auth::Caller;

/// Outbound frames of one connection
pub type PusherChannel = mpsc::UnboundedSender<String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct Connection {
    caller: Caller,
    sender: PusherChannel,
    groups: HashSet<i64>,
    close: Option<oneshot::Sender<()>>,
}

#[derive(Default)]
pub struct Hub {
    connections: Mutex<HashMap<ConnectionId, Connection>>,
    next_id: AtomicU64,
    fail_invocations: AtomicBool,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. The receiver fires when the hub wants it closed.
    pub async fn register(
        &self,
        caller: Caller,
        sender: PusherChannel,
    ) -> (ConnectionId, oneshot::Receiver<()>) {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let (close_tx, close_rx) = oneshot::channel();
        self.connections.lock().await.insert(
            id,
            Connection {
                caller,
                sender,
                groups: HashSet::new(),
                close: Some(close_tx),
            },
        );
        tracing::debug!("Connection {} registered for {}", id, caller);
        (id, close_rx)
    }

    pub async fn unregister(&self, id: ConnectionId) {
        if let Some(connection) = self.connections.lock().await.remove(&id) {
            tracing::debug!(
                "Connection {} of {} unregistered ({} group(s) dropped)",
                id,
                connection.caller,
                connection.groups.len()
            );
        }
    }

    pub async fn join(&self, id: ConnectionId, conversation: i64) {
        if let Some(connection) = self.connections.lock().await.get_mut(&id) {
            connection.groups.insert(conversation);
            tracing::debug!("Connection {} joined conv:{}", id, conversation);
        }
    }

    pub async fn leave(&self, id: ConnectionId, conversation: i64) {
        if let Some(connection) = self.connections.lock().await.get_mut(&id) {
            connection.groups.remove(&conversation);
            tracing::debug!("Connection {} left conv:{}", id, conversation);
        }
    }

    /// Send to one connection
    pub async fn push_to(&self, id: ConnectionId, frame: &str) {
        if let Some(connection) = self.connections.lock().await.get(&id) {
            if let Err(e) = connection.sender.send(frame.to_string()) {
                tracing::warn!("Failed to push to connection {}: {}", id, e);
            }
        }
    }

    /// Send to the `conv:{conversation}` group plus every connection of `users`.
    ///
    /// A connection in both sets receives the frame once. Returns the number
    /// of connections reached.
    pub async fn fan_out(&self, conversation: Option<i64>, users: &[Caller], frame: &str) -> usize {
        let connections = self.connections.lock().await;
        let mut reached = 0;
        for (id, connection) in connections.iter() {
            let in_group = conversation.is_some_and(|c| connection.groups.contains(&c));
            if !in_group && !users.contains(&connection.caller) {
                continue;
            }
            // 一部の送信失敗は許容する
            match connection.sender.send(frame.to_string()) {
                Ok(()) => reached += 1,
                Err(e) => tracing::warn!("Failed to push to connection {}: {}", id, e),
            }
        }
        reached
    }

    /// Force-close every connection; returns how many were asked to close
    pub async fn drop_all(&self) -> usize {
        let mut connections = self.connections.lock().await;
        let mut closed = 0;
        for connection in connections.values_mut() {
            if let Some(close) = connection.close.take() {
                let _ = close.send(());
                closed += 1;
            }
        }
        tracing::info!("Dropping {} hub connection(s)", closed);
        closed
    }

    pub fn set_fail_invocations(&self, fail: bool) {
        self.fail_invocations.store(fail, Ordering::SeqCst);
    }

    pub fn fails_invocations(&self) -> bool {
        self.fail_invocations.load(Ordering::SeqCst)
    }

    /// Connections registered since start, closed ones included
    pub fn connections_opened(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst)
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.lock().await.len()
    }

    /// Connections currently in `conv:{conversation}`
    pub async fn group_size(&self, conversation: i64) -> usize {
        self.connections
            .lock()
            .await
            .values()
            .filter(|c| c.groups.contains(&conversation))
            .count()
    }
}
