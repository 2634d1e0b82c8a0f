//! 未読数の変化をいつユーザーへの通知にするかを決める

use std::sync::Arc;

use crate::domain::{Alert, AlertSource, Notifier};

pub struct NotificationDispatcher {
    source: AlertSource,
    last_seen: u32,
    notifier: Arc<dyn Notifier>,
}

impl NotificationDispatcher {
    pub fn new(source: AlertSource, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            source,
            last_seen: 0,
            notifier,
        }
    }

    pub fn last_seen(&self) -> u32 {
        self.last_seen
    }

    /// 通知せずに基準値を設定する（マウント時の最初の取得など）
    pub fn prime(&mut self, current: u32) {
        self.last_seen = current;
    }

    /// 最新の未読数を渡す
    ///
    /// パネルが閉じている間に、最後に見た値より真に増えたときだけ通知する。
    /// 値はどちらの場合も記録するので、パネルを開閉しても過去の増加を
    /// もう一度通知することはない。
    pub fn observe(&mut self, current: u32, panel_open: bool) -> Option<Alert> {
        let previous = self.last_seen;
        self.last_seen = current;
        if panel_open || current <= previous {
            return None;
        }
        let alert = Alert {
            source: self.source,
            previous,
            current,
        };
        self.notifier.alert(alert);
        Some(alert)
    }
}
