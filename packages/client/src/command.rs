//! Input line parsing.
//!
//! Lines starting with `/` are commands; anything else is sent as a chat
//! message to the open conversation.

use std::str::FromStr;

use clinic_chat_sync::domain::{ConversationId, InboxTab};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Open the patient chat panel
    Open,
    /// Close the patient panel or the selected inbox conversation
    Close,
    /// Switch the inbox tab
    Tab(InboxTab),
    /// Open a conversation from the inbox
    Select(ConversationId),
    /// Print the inbox
    Inbox,
    /// Toggle secretary availability
    Available(bool),
    /// Refetch unread counts and the open transcript
    Refresh,
    Help,
    Quit,
    Send(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Unknown command '/{0}'; type /help")]
    Unknown(String),

    #[error("/{command} needs {expected}")]
    MissingArgument {
        command: &'static str,
        expected: &'static str,
    },

    #[error("Invalid argument '{value}' for /{command}")]
    InvalidArgument {
        command: &'static str,
        value: String,
    },
}

/// Parse one trimmed input line
pub fn parse_command(line: &str) -> Result<Command, CommandError> {
    let line = line.trim();
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Command::Send(line.to_string()));
    };

    let mut words = rest.split_whitespace();
    let name = words.next().unwrap_or_default();
    let argument = words.next();

    match name.to_ascii_lowercase().as_str() {
        "open" => Ok(Command::Open),
        "close" => Ok(Command::Close),
        "inbox" | "list" => Ok(Command::Inbox),
        "refresh" => Ok(Command::Refresh),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        "tab" => {
            let value = required("tab", "open, waiting or closed", argument)?;
            InboxTab::from_str(value)
                .map(Command::Tab)
                .map_err(|_| invalid("tab", value))
        }
        "select" => {
            let value = required("select", "a conversation id", argument)?;
            value
                .parse::<i64>()
                .map(|id| Command::Select(ConversationId::new(id)))
                .map_err(|_| invalid("select", value))
        }
        "available" => {
            let value = required("available", "on or off", argument)?;
            match value.to_ascii_lowercase().as_str() {
                "on" | "yes" | "true" => Ok(Command::Available(true)),
                "off" | "no" | "false" => Ok(Command::Available(false)),
                _ => Err(invalid("available", value)),
            }
        }
        other => Err(CommandError::Unknown(other.to_string())),
    }
}

fn required<'a>(
    command: &'static str,
    expected: &'static str,
    argument: Option<&'a str>,
) -> Result<&'a str, CommandError> {
    argument.ok_or(CommandError::MissingArgument { command, expected })
}

fn invalid(command: &'static str, value: &str) -> CommandError {
    CommandError::InvalidArgument {
        command,
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_sent() {
        // テスト項目: スラッシュで始まらない行はメッセージ送信になる
        // given (前提条件):
        let line = "  Hello, is the clinic open today?  ";

        // when (操作):
        let result = parse_command(line);

        // then (期待する結果):
        assert_eq!(
            result,
            Ok(Command::Send("Hello, is the clinic open today?".to_string()))
        );
    }

    #[test]
    fn test_simple_commands() {
        // テスト項目: 引数のないコマンドが大文字小文字を問わず解釈される
        // given (前提条件):
        let cases = [
            ("/open", Command::Open),
            ("/CLOSE", Command::Close),
            ("/inbox", Command::Inbox),
            ("/refresh", Command::Refresh),
            ("/?", Command::Help),
            ("/exit", Command::Quit),
        ];

        for (line, expected) in cases {
            // when (操作):
            let result = parse_command(line);

            // then (期待する結果):
            assert_eq!(result, Ok(expected), "line: {}", line);
        }
    }

    #[test]
    fn test_tab_and_select_arguments() {
        // テスト項目: /tab と /select の引数が値オブジェクトに変換される
        // given (前提条件):
        let tab = "/tab Waiting";
        let select = "/select 42";

        // when (操作):
        let tab = parse_command(tab);
        let select = parse_command(select);

        // then (期待する結果):
        assert_eq!(tab, Ok(Command::Tab(InboxTab::Waiting)));
        assert_eq!(select, Ok(Command::Select(ConversationId::new(42))));
    }

    #[test]
    fn test_available_toggle() {
        // テスト項目: /available は on/off を受け付ける
        // given (前提条件):
        let on = "/available on";
        let off = "/available OFF";

        // when (操作):
        let on = parse_command(on);
        let off = parse_command(off);

        // then (期待する結果):
        assert_eq!(on, Ok(Command::Available(true)));
        assert_eq!(off, Ok(Command::Available(false)));
    }

    #[test]
    fn test_missing_and_invalid_arguments() {
        // テスト項目: 引数の欠落や不正な値はエラーになる
        // given (前提条件):
        let missing = "/select";
        let invalid_id = "/select forty-two";
        let invalid_tab = "/tab archived";

        // when (操作):
        let missing = parse_command(missing);
        let invalid_id = parse_command(invalid_id);
        let invalid_tab = parse_command(invalid_tab);

        // then (期待する結果):
        assert!(matches!(
            missing,
            Err(CommandError::MissingArgument {
                command: "select",
                ..
            })
        ));
        assert_eq!(
            invalid_id,
            Err(CommandError::InvalidArgument {
                command: "select",
                value: "forty-two".to_string()
            })
        );
        assert!(matches!(
            invalid_tab,
            Err(CommandError::InvalidArgument { command: "tab", .. })
        ));
    }

    #[test]
    fn test_unknown_command() {
        // テスト項目: 未知のコマンドはエラーメッセージに名前が含まれる
        // given (前提条件):
        let line = "/book tomorrow";

        // when (操作):
        let result = parse_command(line);

        // then (期待する結果):
        let error = result.unwrap_err();
        assert_eq!(error, CommandError::Unknown("book".to_string()));
        assert!(error.to_string().contains("/help"));
    }
}
