//! Terminal clinic chat client.
//!
//! Signs in as a patient or a secretary with a bearer token and drives the
//! patient widget or the secretary inbox from the terminal. Real-time
//! updates come over the push hub; polling takes over while it is down.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin clinic-chat-client -- --role patient --token patient:1
//! cargo run --bin clinic-chat-client -- -r secretary -t secretary:5
//! cargo run --bin clinic-chat-client -- -r patient --session-file ~/.clinic/session.json --no-push
//! ```

use std::{path::PathBuf, time::Duration};

use clap::Parser;
use clinic_chat_client::{ClientError, ClientOptions, Role, TokenSource, run_client};
use clinic_chat_shared::logger::setup_logger;
use clinic_chat_sync::SyncConfig;

#[derive(Parser, Debug)]
#[command(name = "clinic-chat-client")]
#[command(about = "Terminal clinic chat client with push and polling sync", long_about = None)]
struct Args {
    /// Which surface to open
    #[arg(short = 'r', long, value_enum, default_value = "patient")]
    role: Role,

    /// Bearer token for the session
    #[arg(short = 't', long, conflicts_with = "session_file")]
    token: Option<String>,

    /// JSON session file holding {"token": "..."}; re-read on every reconnect
    #[arg(short = 's', long)]
    session_file: Option<PathBuf>,

    /// REST base URL; overrides CLINIC_API_URL
    #[arg(short = 'u', long)]
    api_url: Option<String>,

    /// Polling interval in seconds; overrides CLINIC_POLL_INTERVAL_SECS
    #[arg(long)]
    poll_secs: Option<u64>,

    /// Never connect the push channel
    #[arg(long)]
    no_push: bool,
}

impl Args {
    fn into_options(self) -> Result<ClientOptions, ClientError> {
        let mut config = SyncConfig::from_env();
        if let Some(api_url) = &self.api_url {
            let derived = SyncConfig::for_api_url(api_url)?;
            config.api_url = derived.api_url;
            config.hub_url = derived.hub_url;
        }
        if let Some(secs) = self.poll_secs.filter(|secs| *secs > 0) {
            config.poll_interval = Duration::from_secs(secs);
        }

        let token = match (self.token, self.session_file) {
            (Some(token), _) => TokenSource::Static(token),
            (None, Some(path)) => TokenSource::SessionFile(path),
            (None, None) => return Err(ClientError::MissingToken),
        };

        Ok(ClientOptions {
            role: self.role,
            token,
            config,
            push: !self.no_push,
        })
    }
}

#[tokio::main]
async fn main() {
    setup_logger(env!("CARGO_BIN_NAME"), "info");

    let args = Args::parse();

    let result = match args.into_options() {
        Ok(options) => run_client(options).await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        tracing::error!("Client error: {}", e);
        std::process::exit(1);
    }
}
