//! Error types for the terminal client.

use clinic_chat_sync::config::ConfigError;
use thiserror::Error;

/// Client-specific errors
#[derive(Debug, Error)]
pub enum ClientError {
    /// API URL could not be turned into a config
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Neither a token nor a session file was given
    #[error("No session token given; pass --token or --session-file")]
    MissingToken,

    /// Line editor could not be started
    #[error("Readline error: {0}")]
    Readline(String),
}
