//! Notifier that prints to the terminal.

use clinic_chat_sync::domain::{Alert, Notice, Notifier};

use super::{formatter::MessageFormatter, ui::redisplay_prompt};

pub struct TerminalNotifier {
    prompt: String,
}

impl TerminalNotifier {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
        }
    }
}

impl Notifier for TerminalNotifier {
    fn alert(&self, alert: Alert) {
        // 端末のベル
        print!("\x07{}", MessageFormatter::format_alert(&alert));
        redisplay_prompt(&self.prompt);
    }

    fn notice(&self, notice: Notice) {
        tracing::debug!("Notice: {}", notice.message);
        print!("{}", MessageFormatter::format_notice(&notice));
        redisplay_prompt(&self.prompt);
    }
}
