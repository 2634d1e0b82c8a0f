//! プッシュチャネルの再接続ポリシー
//!
//! 純粋な関数だけで構成し、ソケットなしで再試行のスケジュールをテストできます。

use std::time::Duration;

use crate::config::SyncConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl ReconnectPolicy {
    pub const fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// もう一度再接続を試みるべきか判定
    ///
    /// # 引数
    ///
    /// * `current_attempt` - これから行う再接続の試行番号（0 始まり）
    ///
    /// # 戻り値
    ///
    /// 試行回数が残っていれば `true`、使い切ったら `false`
    pub fn should_attempt(&self, current_attempt: u32) -> bool {
        current_attempt < self.max_attempts
    }

    /// 指定した試行の前に待つ時間。最初の再試行はすぐに行う
    pub fn delay_before(&self, current_attempt: u32) -> Duration {
        if current_attempt == 0 {
            Duration::ZERO
        } else {
            self.interval
        }
    }
}

impl From<&SyncConfig> for ReconnectPolicy {
    fn from(config: &SyncConfig) -> Self {
        Self::new(config.max_reconnect_attempts, config.reconnect_interval)
    }
}
