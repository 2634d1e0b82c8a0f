//! Stub clinic chat backend.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin clinic-chat-stub-server
//! cargo run --bin clinic-chat-stub-server -- --host 0.0.0.0 --port 5024
//! ```
//!
//! Tokens are `patient:<id>` or `secretary:<id>`; the seeded data has
//! patient 1 in conversation 42 and secretary 5 on duty.

use clap::Parser;
use clinic_chat_shared::logger::setup_logger;
use clinic_chat_stub_server::StubServer;

#[derive(Parser, Debug)]
#[command(name = "clinic-chat-stub-server")]
#[command(about = "In-memory clinic chat backend with REST and push hub", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value = "5024")]
    port: u16,
}

#[tokio::main]
async fn main() {
    setup_logger(env!("CARGO_BIN_NAME"), "debug");

    let args = Args::parse();

    let server = StubServer::seeded();
    if let Err(e) = server.run(&args.host, args.port).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
