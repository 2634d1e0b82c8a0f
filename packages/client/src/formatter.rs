//! Message formatting utilities for client display.

use clinic_chat_shared::time::to_local_display;
use clinic_chat_sync::domain::{
    Alert, Conversation, ConversationId, InboxTab, Message, Notice, NoticeLevel, SenderRole,
    StartedConversation,
};

const RULE: &str = "------------------------------------------------------------";
const DOUBLE_RULE: &str = "============================================================";

/// Message formatter for client display
pub struct MessageFormatter;

impl MessageFormatter {
    /// Format a chat message, marking the ones sent by `me`
    pub fn format_message(message: &Message, me: &SenderRole) -> String {
        let from = if &message.sender_role == me {
            format!("{} (me)", message.sender_role)
        } else {
            message.sender_role.to_string()
        };
        format!(
            "\n{}\n@{}: {}\nsent at {}\n{}\n",
            RULE,
            from,
            message.text,
            to_local_display(message.sent_at),
            RULE
        )
    }

    /// Format the header shown when the patient panel opens
    pub fn format_opened(started: &StartedConversation) -> String {
        let mut output = format!(
            "\n{}\nConversation #{} ({})\n",
            DOUBLE_RULE, started.conversation_id, started.status
        );
        if let Some(info) = &started.info_message {
            output.push_str(info);
            output.push('\n');
        }
        output.push_str(DOUBLE_RULE);
        output.push('\n');
        output
    }

    /// Format the inbox listing with the selected entry marked
    pub fn format_inbox(
        tab: InboxTab,
        entries: &[Conversation],
        selected: Option<ConversationId>,
    ) -> String {
        let mut output = format!("\n{}\nInbox ({}):\n", DOUBLE_RULE, tab.as_str());

        if entries.is_empty() {
            output.push_str("(No conversations)\n");
        } else {
            for entry in entries {
                let marker = if Some(entry.id) == selected { ">" } else { " " };
                let unread = if entry.unread_count > 0 {
                    format!(" [{} unread]", entry.unread_count)
                } else {
                    String::new()
                };
                let last = entry
                    .last_message_at
                    .map(|t| format!(" - last message {}", to_local_display(t)))
                    .unwrap_or_default();
                output.push_str(&format!(
                    "{} #{} {} ({}){}{}\n",
                    marker, entry.id, entry.counterpart_name, entry.status, unread, last
                ));
            }
        }

        output.push_str(DOUBLE_RULE);
        output.push('\n');
        output
    }

    /// Format an unread alert
    pub fn format_alert(alert: &Alert) -> String {
        format!(
            "\n* {} new message(s) in the {} ({} unread)\n",
            alert.delta(),
            alert.source,
            alert.current
        )
    }

    /// Format a transient notice
    pub fn format_notice(notice: &Notice) -> String {
        match notice.level {
            NoticeLevel::Info => format!("\ni {}\n", notice.message),
            NoticeLevel::Error => format!("\n! {}\n", notice.message),
        }
    }

    /// Format the header badge
    pub fn format_badge(display: &str) -> String {
        format!("[unread: {}]\n", display)
    }

    /// Format the command list for a role
    pub fn format_help(staff: bool) -> String {
        let commands: &[(&str, &str)] = if staff {
            &[
                ("/inbox", "show the inbox"),
                ("/tab <open|waiting|closed>", "switch the inbox tab"),
                ("/select <id>", "open a conversation"),
                ("/close", "close the selected conversation"),
                ("/available <on|off>", "set your availability"),
                ("/refresh", "reload counts and the transcript"),
                ("/quit", "exit"),
            ]
        } else {
            &[
                ("/open", "open the chat"),
                ("/close", "close the chat"),
                ("/refresh", "reload counts and the transcript"),
                ("/quit", "exit"),
            ]
        };
        let mut output = String::from("\nCommands:\n");
        for (command, description) in commands {
            output.push_str(&format!("  {:<28} {}\n", command, description));
        }
        output.push_str("Any other line is sent as a message.\n");
        output
    }
}
