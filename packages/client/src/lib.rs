//! Terminal front end for the clinic chat.
//!
//! Hosts one surface per role on top of the synchronization core: the
//! patient widget with its header badge, or the secretary inbox.

mod command;
mod error;
mod formatter;
mod notifier;
mod runner;
mod ui;

pub use command::{Command, CommandError, parse_command};
pub use error::ClientError;
pub use runner::{ClientOptions, Role, TokenSource, run_client};
