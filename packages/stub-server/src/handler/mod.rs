//! HTTP and WebSocket handlers.

pub mod http;
pub mod websocket;

pub use http::{
    health_check, list_messages, mark_read, secretary_inbox, send_message, set_availability,
    start_chat, unread_summary,
};
pub use websocket::hub_handler;
