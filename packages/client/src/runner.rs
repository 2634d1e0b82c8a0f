//! Client execution logic.
//!
//! Wires the sync core to the terminal: one push channel and REST client
//! per session, the role's views mounted on top, a rustyline thread for
//! input, and a loop that prints whatever the views changed.

use std::{collections::HashSet, path::PathBuf, sync::Arc};

use clinic_chat_sync::{
    HeaderBadgeView, OpenState, PatientChatView, SecretaryInboxView, SyncConfig, ViewContext,
    domain::{Message, MessageId, SenderRole, TokenProvider},
    infrastructure::{
        api::HttpChatApi,
        push_channel::{ChannelConfig, ConnectionManager},
        token::{SessionFileToken, StaticToken},
    },
    view::PanelPhase,
};
use rustyline::{DefaultEditor, error::ReadlineError};
use tokio::sync::{mpsc, watch};

use super::{
    command::{Command, parse_command},
    error::ClientError,
    formatter::MessageFormatter,
    notifier::TerminalNotifier,
    ui::redisplay_prompt,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Role {
    Patient,
    Secretary,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Patient => "patient",
            Self::Secretary => "secretary",
        }
    }

    fn sender_role(&self) -> SenderRole {
        match self {
            Self::Patient => SenderRole::Patient,
            Self::Secretary => SenderRole::Secretary,
        }
    }
}

#[derive(Debug, Clone)]
pub enum TokenSource {
    Static(String),
    SessionFile(PathBuf),
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub role: Role,
    pub token: TokenSource,
    pub config: SyncConfig,
    /// Connect the push channel; when false the views only poll
    pub push: bool,
}

/// Run the terminal client until the user quits
pub async fn run_client(options: ClientOptions) -> Result<(), ClientError> {
    let token: Arc<dyn TokenProvider> = match options.token {
        TokenSource::Static(token) if token.trim().is_empty() => {
            return Err(ClientError::MissingToken);
        }
        TokenSource::Static(token) => Arc::new(StaticToken::new(token)),
        TokenSource::SessionFile(path) => Arc::new(SessionFileToken::new(path)),
    };
    let config = options.config;
    let api = Arc::new(HttpChatApi::new(config.api_url.clone(), token.clone()));
    let channel = ConnectionManager::new(ChannelConfig::from(&config), token);
    let prompt = format!("{}> ", options.role.as_str());
    let notifier = Arc::new(TerminalNotifier::new(prompt.clone()));
    let ctx = ViewContext::new(api, Arc::new(channel.clone()), notifier, &config);

    if options.push {
        match channel.connect().await {
            Ok(()) => tracing::info!("Connected to push hub {}", config.hub_url),
            Err(e) => tracing::warn!(
                "Push channel unavailable ({}); polling every {:?}",
                e,
                config.poll_interval
            ),
        }
    } else {
        tracing::info!("Push channel disabled; polling every {:?}", config.poll_interval);
    }

    let surface = Surface::mount(options.role, ctx).await;
    let mut printer = TranscriptPrinter::new(options.role.sender_role());
    println!(
        "\nSigned in as {}. Type /help for commands. Press Ctrl+C to exit.",
        options.role.as_str()
    );
    println!("{}", MessageFormatter::format_badge(&surface.badge().display()));
    surface.print_overview(&mut printer);

    let (mut view_revisions, mut badge_revisions) = surface.revisions();
    let mut input_rx = spawn_readline(prompt.clone())?;

    loop {
        tokio::select! {
            line = input_rx.recv() => {
                let Some(line) = line else { break };
                match parse_command(&line) {
                    Ok(Command::Quit) => break,
                    Ok(command) => surface.execute(command, &mut printer).await,
                    Err(e) => println!("{}", e),
                }
            }
            changed = view_revisions.changed() => {
                if changed.is_err() {
                    break;
                }
                if surface.print_new_messages(&mut printer) {
                    redisplay_prompt(&prompt);
                }
            }
            changed = badge_revisions.changed() => {
                if changed.is_err() {
                    break;
                }
                print!("\n{}", MessageFormatter::format_badge(&surface.badge().display()));
                redisplay_prompt(&prompt);
            }
        }
    }

    tracing::info!("Signing out");
    surface.unmount().await;
    channel.dispose();
    Ok(())
}

/// Spawn a blocking thread for rustyline (synchronous readline)
fn spawn_readline(prompt: String) -> Result<mpsc::UnboundedReceiver<String>, ClientError> {
    let mut rl = DefaultEditor::new().map_err(|e| ClientError::Readline(e.to_string()))?;
    let (input_tx, input_rx) = mpsc::unbounded_channel::<String>();

    std::thread::spawn(move || {
        loop {
            match rl.readline(&prompt) {
                Ok(line) => {
                    let line = line.trim();
                    if !line.is_empty() {
                        rl.add_history_entry(line).ok();
                        if input_tx.send(line.to_string()).is_err() {
                            break;
                        }
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    // Ctrl+C
                    tracing::info!("Interrupted");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    // Ctrl+D
                    tracing::info!("EOF");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {}", err);
                    break;
                }
            }
        }
    });

    Ok(input_rx)
}

/// Prints each message once across revisions
struct TranscriptPrinter {
    me: SenderRole,
    printed: HashSet<MessageId>,
}

impl TranscriptPrinter {
    fn new(me: SenderRole) -> Self {
        Self {
            me,
            printed: HashSet::new(),
        }
    }

    fn print_all(&mut self, messages: &[Message]) {
        if messages.is_empty() {
            println!("(No messages yet)");
        }
        for message in messages {
            self.printed.insert(message.id);
            print!("{}", MessageFormatter::format_message(message, &self.me));
        }
    }

    fn print_new(&mut self, messages: &[Message]) -> bool {
        let mut printed = false;
        for message in messages {
            if self.printed.insert(message.id) {
                print!("{}", MessageFormatter::format_message(message, &self.me));
                printed = true;
            }
        }
        printed
    }
}

enum Surface {
    Patient {
        widget: PatientChatView,
        badge: HeaderBadgeView,
        launcher: watch::Sender<bool>,
    },
    Secretary {
        inbox: SecretaryInboxView,
        badge: HeaderBadgeView,
        _launcher: watch::Sender<bool>,
    },
}

impl Surface {
    async fn mount(role: Role, ctx: ViewContext) -> Self {
        match role {
            Role::Patient => {
                let (launcher_state, launcher) = OpenState::external(false);
                let widget = PatientChatView::new(ctx.clone(), OpenState::Internal);
                let badge = HeaderBadgeView::new(ctx, launcher_state);
                widget.mount().await;
                badge.mount().await;
                Self::Patient {
                    widget,
                    badge,
                    launcher,
                }
            }
            Role::Secretary => {
                // 受信箱は常に表示されているのでバッジの通知は抑止する
                let (launcher_state, launcher) = OpenState::external(true);
                let inbox = SecretaryInboxView::new(ctx.clone());
                let badge = HeaderBadgeView::new(ctx, launcher_state);
                inbox.mount().await;
                badge.mount().await;
                Self::Secretary {
                    inbox,
                    badge,
                    _launcher: launcher,
                }
            }
        }
    }

    fn badge(&self) -> &HeaderBadgeView {
        match self {
            Self::Patient { badge, .. } | Self::Secretary { badge, .. } => badge,
        }
    }

    fn revisions(&self) -> (watch::Receiver<u64>, watch::Receiver<u64>) {
        match self {
            Self::Patient { widget, badge, .. } => {
                (widget.subscribe_revisions(), badge.subscribe_revisions())
            }
            Self::Secretary { inbox, badge, .. } => {
                (inbox.subscribe_revisions(), badge.subscribe_revisions())
            }
        }
    }

    fn print_overview(&self, printer: &mut TranscriptPrinter) {
        match self {
            Self::Patient { .. } => println!("Type /open to chat with the clinic."),
            Self::Secretary { inbox, .. } => {
                print!(
                    "{}",
                    MessageFormatter::format_inbox(inbox.tab(), &inbox.inbox(), inbox.selected())
                );
                if inbox.selected().is_some() {
                    printer.print_all(&inbox.messages());
                }
            }
        }
    }

    fn print_new_messages(&self, printer: &mut TranscriptPrinter) -> bool {
        match self {
            Self::Patient { widget, .. } if widget.phase() == PanelPhase::Open => {
                printer.print_new(&widget.messages())
            }
            Self::Patient { .. } => false,
            Self::Secretary { inbox, .. } => printer.print_new(&inbox.messages()),
        }
    }

    async fn execute(&self, command: Command, printer: &mut TranscriptPrinter) {
        match (self, command) {
            (_, Command::Help) => {
                print!(
                    "{}",
                    MessageFormatter::format_help(matches!(self, Self::Secretary { .. }))
                )
            }
            (_, Command::Send(text)) => self.send(&text).await,
            (_, Command::Quit) => {}

            (
                Self::Patient {
                    widget, launcher, ..
                },
                command,
            ) => match command {
                Command::Open => {
                    if widget.open_panel().await {
                        launcher.send_replace(true);
                        if let Some(started) = widget.conversation() {
                            print!("{}", MessageFormatter::format_opened(&started));
                        }
                        printer.print_all(&widget.messages());
                    }
                }
                Command::Close => {
                    if widget.close_panel().await {
                        launcher.send_replace(false);
                        println!("Chat closed.");
                    }
                }
                Command::Refresh => {
                    widget.refresh().await;
                    self.badge().refresh().await;
                }
                _ => println!("That command is only available to staff."),
            },

            (Self::Secretary { inbox, .. }, command) => match command {
                Command::Inbox => print!(
                    "{}",
                    MessageFormatter::format_inbox(inbox.tab(), &inbox.inbox(), inbox.selected())
                ),
                Command::Tab(tab) => {
                    inbox.set_tab(tab).await;
                    print!(
                        "{}",
                        MessageFormatter::format_inbox(tab, &inbox.inbox(), inbox.selected())
                    );
                }
                Command::Select(id) => {
                    if inbox.select(id).await {
                        println!("\nConversation #{}", id);
                        printer.print_all(&inbox.messages());
                    }
                }
                Command::Close => {
                    if inbox.close_selection().await {
                        println!("Conversation closed.");
                    }
                }
                Command::Available(available) => {
                    if let Err(e) = inbox.set_availability(available).await {
                        tracing::debug!("Availability not changed: {}", e);
                    }
                }
                Command::Refresh => {
                    inbox.refresh().await;
                    self.badge().refresh().await;
                }
                _ => println!("Use /select <id> to open a conversation."),
            },
        }
    }

    async fn send(&self, text: &str) {
        let result = match self {
            Self::Patient { widget, .. } => widget.send(text).await,
            Self::Secretary { inbox, .. } => inbox.send(text).await,
        };
        match result {
            Ok(message) => {
                tracing::debug!("Sent message {}", message.id);
            }
            Err(failure) if !failure.restored_text.is_empty() => {
                println!("Draft kept: {}", failure.restored_text);
            }
            Err(failure) => tracing::debug!("Nothing sent: {}", failure),
        }
    }

    async fn unmount(&self) {
        match self {
            Self::Patient { widget, badge, .. } => {
                widget.unmount().await;
                badge.unmount();
            }
            Self::Secretary { inbox, badge, .. } => {
                inbox.unmount().await;
                badge.unmount();
            }
        }
    }
}
