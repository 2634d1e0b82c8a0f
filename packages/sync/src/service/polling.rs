//! プッシュチャネルが切れている間のタイマー駆動の更新

use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};

use crate::domain::ConnectionState;

/// 各更新処理に渡す生存フラグ。生きている間だけ結果を反映してよい
#[derive(Debug, Clone)]
pub struct Liveness(Arc<AtomicBool>);

impl Liveness {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_live(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn kill(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

/// ビュー 1 つ分のポーリングループ
///
/// `interval` ごとに動き、観測した接続状態が `Connected` でないときだけ更新する。
/// ハンドルを破棄すると止まる。
pub struct PollingFallback {
    live: Liveness,
    task: Option<JoinHandle<()>>,
}

impl PollingFallback {
    pub fn start<F, Fut>(
        interval: Duration,
        state: watch::Receiver<ConnectionState>,
        refresh: F,
    ) -> Self
    where
        F: Fn(Liveness) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let live = Liveness::new();
        let task_live = live.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !task_live.is_live() {
                    break;
                }
                let connected = state.borrow().is_connected();
                if connected {
                    tracing::trace!("Push channel connected, skipping poll");
                    continue;
                }
                tracing::debug!("Polling fallback refresh");
                refresh(task_live.clone()).await;
            }
        });

        Self {
            live,
            task: Some(task),
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn stop(&mut self) {
        self.live.kill();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for PollingFallback {
    fn drop(&mut self) {
        self.stop();
    }
}
